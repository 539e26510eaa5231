//! Render a template from a directory into a file

// Internal imports (std, crate)
use std::path::{Path, PathBuf};

use crate::core::error::{Error, Result};
use crate::runtime::{OutputRecord, Value};
use crate::template::Render;

// External imports (alphabetized)
use indexmap::IndexMap;
use tracing::{debug, info, warn};

/// Request to render one template into one file
#[derive(Debug, Clone)]
pub struct RenderFileRequest {
    pub name: String,
    pub params: IndexMap<String, Value>,
    pub output: PathBuf,
}

impl RenderFileRequest {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::config("template name cannot be empty"));
        }
        if self.output.as_os_str().is_empty() {
            return Err(Error::config("output path cannot be empty"));
        }
        Ok(())
    }
}

/// Use case for rendering templates of one render into files
pub struct RenderFileUseCase {
    render: Render,
}

impl RenderFileUseCase {
    pub fn new(render: Render) -> Self {
        Self { render }
    }

    /// Render the template with the parameters it declares, write the body
    /// and return the full record
    pub fn execute(&self, request: &RenderFileRequest) -> Result<OutputRecord> {
        request.validate()?;
        let record = self.render(&request.name, &request.params)?;

        if let Some(parent) = request.output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&request.output, record.to_string())?;
        info!(
            template = %request.name,
            output = %request.output.display(),
            "rendered template"
        );
        Ok(record)
    }

    /// Render with the parameters the template declares; others are skipped
    pub fn render(&self, name: &str, params: &IndexMap<String, Value>) -> Result<OutputRecord> {
        let params = self.declared_params(name, params)?;
        self.render.render(name, &params)
    }

    /// Keep only the parameters named in the template's `$def with` line
    pub fn declared_params(
        &self,
        name: &str,
        params: &IndexMap<String, Value>,
    ) -> Result<IndexMap<String, Value>> {
        let template = self.render.template(name)?;
        let declared: Vec<&str> = template.params().iter().map(|p| p.name.as_str()).collect();
        let mut kept = IndexMap::new();
        for (key, value) in params {
            if declared.contains(&key.as_str()) {
                kept.insert(key.clone(), value.clone());
            } else {
                warn!(template = name, param = %key, "skipping undeclared parameter");
            }
        }
        debug!(template = name, kept = kept.len(), "filtered parameters");
        Ok(kept)
    }
}

/// Read template parameters from a mapping in a `.json` file, or YAML otherwise
pub fn load_params(path: &Path) -> Result<IndexMap<String, Value>> {
    let text = std::fs::read_to_string(path)?;
    let values: IndexMap<String, serde_json::Value> =
        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&text)?
        } else {
            serde_yaml::from_str(&text)?
        };
    debug!(path = %path.display(), count = values.len(), "loaded parameters");
    Ok(values.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
}

/// Render template `name` under `root` into `output`
pub fn render_to_file(
    root: &Path,
    name: &str,
    params: &IndexMap<String, Value>,
    output: &Path,
) -> Result<OutputRecord> {
    let request = RenderFileRequest {
        name: name.to_string(),
        params: params.clone(),
        output: output.to_path_buf(),
    };
    RenderFileUseCase::new(Render::new(root)).execute(&request)
}
