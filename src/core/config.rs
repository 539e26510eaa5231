//! Render configuration.
//!
//! Settings can come from a TOML file:
//!
//! ```toml
//! root = "templates"
//! cache = true
//! base = "layout"
//! escape = "html"
//! expose_as = "render"
//!
//! [globals]
//! site = "example.org"
//! ```
//!
//! The template root may also come from the `SIGIL_TEMPLATE_DIR` environment
//! variable, which a command-line argument overrides and which overrides the
//! file.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{Error, Result};
use crate::runtime::EscapeMode;

/// Environment variable naming the template root
pub const TEMPLATE_DIR_ENV: &str = "SIGIL_TEMPLATE_DIR";

/// Trait for reading template configuration, allowing dependency injection for testing
pub trait TemplateConfigReader {
    fn get_template_dir(&self) -> Option<String>;
}

/// Production implementation that reads from environment variables
pub struct EnvTemplateConfigReader;

impl TemplateConfigReader for EnvTemplateConfigReader {
    fn get_template_dir(&self) -> Option<String> {
        std::env::var(TEMPLATE_DIR_ENV).ok().filter(|dir| !dir.is_empty())
    }
}

/// Mock implementation for testing with controlled values
#[cfg(test)]
pub struct MockTemplateConfigReader(Option<String>);

#[cfg(test)]
impl MockTemplateConfigReader {
    pub fn new(template_dir: Option<String>) -> Self {
        Self(template_dir)
    }
}

#[cfg(test)]
impl TemplateConfigReader for MockTemplateConfigReader {
    fn get_template_dir(&self) -> Option<String> {
        self.0.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Template root directory
    pub root: Option<PathBuf>,
    /// Keep compiled templates for the lifetime of the render
    pub cache: bool,
    /// Layout template wrapped around every rendered template
    pub base: Option<String>,
    /// Escaping filter for every template; by default it follows the file
    /// extension
    pub escape: Option<EscapeMode>,
    /// Name under which templates can reach the render itself
    pub expose_as: Option<String>,
    /// Extra names visible to every template
    pub globals: IndexMap<String, serde_json::Value>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            root: None,
            cache: true,
            base: None,
            escape: None,
            expose_as: None,
            globals: IndexMap::new(),
        }
    }
}

impl RenderConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a TOML file. A relative `root` is taken relative to the file.
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading render config");
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&text)?;
        if let (Some(root), Some(dir)) = (&config.root, path.parent()) {
            if root.is_relative() {
                config.root = Some(dir.join(root));
            }
        }
        Ok(config)
    }

    /// Pick the template root: an explicit path first, then the
    /// environment, then the configuration file
    pub fn resolve_root(
        &self,
        explicit: Option<&Path>,
        reader: &dyn TemplateConfigReader,
    ) -> Result<PathBuf> {
        let root = explicit
            .map(Path::to_path_buf)
            .or_else(|| reader.get_template_dir().map(PathBuf::from))
            .or_else(|| self.root.clone())
            .ok_or_else(|| {
                Error::config(format!(
                    "no template root given; pass one or set {TEMPLATE_DIR_ENV}"
                ))
            })?;
        if !root.is_dir() {
            return Err(Error::config(format!(
                "template root {} is not a directory",
                root.display()
            )));
        }
        Ok(root)
    }
}
