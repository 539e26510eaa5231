//! sigil CLI entrypoint
//! Renders templates from a directory and checks template files for errors.
#![deny(unsafe_code)]

// Internal imports (std, crate)
use std::path::{Path, PathBuf};

use sigil_template::application::{RenderFileRequest, RenderFileUseCase, load_params};
use sigil_template::core::{EnvTemplateConfigReader, RenderConfig};
use sigil_template::{Render, Template, Value};

// External imports (alphabetized)
use anyhow::{Context, bail};
use clap::Parser;
use indexmap::IndexMap;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sigil")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Render a template from a template directory
    Render {
        /// Template name relative to the root, without extension (e.g. users/list)
        name: String,
        /// Template root directory (falls back to SIGIL_TEMPLATE_DIR, then the config file)
        #[arg(long)]
        root: Option<PathBuf>,
        /// Template parameter as KEY=VALUE; VALUE is read as JSON when it parses
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
        /// JSON or YAML file with a mapping of template parameters
        #[arg(long = "params", value_name = "FILE")]
        params_file: Option<PathBuf>,
        /// Write the output here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        /// Layout template wrapped around the output
        #[arg(long)]
        base: Option<String>,
        /// Compile every template on each lookup
        #[arg(long)]
        no_cache: bool,
        /// TOML configuration file
        #[arg(long, env = "SIGIL_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Compile template files and report errors
    Check {
        /// Template files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so rendered output on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Render {
            name,
            root,
            params,
            params_file,
            output,
            base,
            no_cache,
            config,
        } => {
            let mut config = match &config {
                Some(path) => RenderConfig::load(path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => RenderConfig::default(),
            };
            if base.is_some() {
                config.base = base;
            }
            if no_cache {
                config.cache = false;
            }
            let root = config.resolve_root(root.as_deref(), &EnvTemplateConfigReader)?;
            let params = collect_params(params_file.as_deref(), &params)?;
            run_render(&root, &config, &name, params, output)
        }
        Commands::Check { files } => run_check(&files),
    }
}

fn run_render(
    root: &Path,
    config: &RenderConfig,
    name: &str,
    params: IndexMap<String, Value>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    info!(root = %root.display(), template = name, "Rendering template");
    let use_case = RenderFileUseCase::new(Render::from_config(root, config));
    match output {
        Some(output) => {
            let request = RenderFileRequest {
                name: name.to_string(),
                params,
                output,
            };
            use_case
                .execute(&request)
                .with_context(|| format!("Failed to render template '{name}'"))?;
        }
        None => {
            let record = use_case
                .render(name, &params)
                .with_context(|| format!("Failed to render template '{name}'"))?;
            print!("{record}");
        }
    }
    Ok(())
}

fn run_check(files: &[PathBuf]) -> anyhow::Result<()> {
    let mut failures = 0;
    for file in files {
        let text = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        match Template::compile(&text, &file.display().to_string()) {
            Ok(template) => println!("ok: {} ({} params)", file.display(), template.params().len()),
            Err(e) => {
                error!(file = %file.display(), "{e}");
                println!("error: {e}");
                failures += 1;
            }
        }
    }
    if failures > 0 {
        bail!("{failures} of {} templates failed to compile", files.len());
    }
    Ok(())
}

/// Merge parameters from a file with `KEY=VALUE` pairs; pairs win
fn collect_params(
    file: Option<&Path>,
    pairs: &[String],
) -> anyhow::Result<IndexMap<String, Value>> {
    let mut params = match file {
        Some(file) => load_params(file)
            .with_context(|| format!("Failed to load params file {}", file.display()))?,
        None => IndexMap::new(),
    };
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .with_context(|| format!("Invalid --param '{pair}', expected KEY=VALUE"))?;
        let value = serde_json::from_str::<serde_json::Value>(raw)
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(raw));
        params.insert(key.trim().to_string(), value);
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_pairs_parse_json_or_fall_back_to_text() {
        let pairs = vec![
            "n=3".to_string(),
            "tags=[\"a\",\"b\"]".to_string(),
            "name=Ada Lovelace".to_string(),
            "eq=a=b".to_string(),
        ];
        let params = collect_params(None, &pairs).unwrap();
        assert_eq!(params["n"], Value::Int(3));
        assert_eq!(params["tags"], Value::list(vec!["a".into(), "b".into()]));
        assert_eq!(params["name"], Value::from("Ada Lovelace"));
        assert_eq!(params["eq"], Value::from("a=b"));
    }

    #[test]
    fn test_param_pair_without_equals_is_rejected() {
        assert!(collect_params(None, &["oops".to_string()]).is_err());
    }
}
