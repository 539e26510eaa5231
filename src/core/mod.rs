//! Shared configuration and the library-wide error type

pub mod config;
pub mod error;

pub use config::{EnvTemplateConfigReader, RenderConfig, TemplateConfigReader};
pub use error::{Error, Result};
