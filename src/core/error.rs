//! Error handling for the sigil template library.
//!
//! This module defines the main error type `Error` used throughout the library,
//! along with a convenient `Result` type alias. Each layer keeps its own error
//! type (parse, compile, evaluation, resolution) and converts into `Error`
//! through `#[from]`, so callers can still tell the categories apart.
//!
//! # Examples
//!
//! ```
//! use sigil_template::core::error::{Error, Result};
//!
//! fn might_fail() -> Result<()> {
//!     Err(Error::config("missing template root"))
//! }
//!
//! assert!(might_fail().is_err());
//! ```

use thiserror::Error;

use crate::compile::{CodegenError, CompileError};
use crate::runtime::EvalError;
use crate::syntax::ParseError;
use crate::template::ResolutionError;

/// Result type for template operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for template operations
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed template structure
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Malformed embedded expression or statement
    #[error("Compilation error: {0}")]
    Compile(#[from] CompileError),

    /// Failure while rendering
    #[error("Evaluation error: {0}")]
    Eval(EvalError),

    /// Template name could not be resolved
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Template name and source line, for parse and compilation errors
    pub fn location(&self) -> Option<(&str, usize)> {
        match self {
            Self::Parse(e) => Some((e.template.as_str(), e.line)),
            Self::Compile(e) => Some((e.template.as_str(), e.line)),
            _ => None,
        }
    }
}

/// Errors raised by a template included from an expression keep their own
/// category instead of becoming evaluation errors of the caller
impl From<EvalError> for Error {
    fn from(error: EvalError) -> Self {
        match error {
            EvalError::Nested(inner) => *inner,
            other => Self::Eval(other),
        }
    }
}

impl From<CodegenError> for Error {
    fn from(error: CodegenError) -> Self {
        match error {
            CodegenError::Parse(e) => Self::Parse(e),
            CodegenError::Compile(e) => Self::Compile(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_config_creation() {
        let error = Error::config("Invalid configuration");
        assert!(matches!(error, Error::Config(_)));
        assert_eq!(
            error.to_string(),
            "Configuration error: Invalid configuration"
        );
    }

    #[test]
    fn test_codegen_errors_keep_their_category() {
        let parse: Error = CodegenError::from(ParseError::new("a.html", 3, "bad")).into();
        assert!(matches!(parse, Error::Parse(_)));
        assert_eq!(parse.location(), Some(("a.html", 3)));
        assert_eq!(parse.to_string(), "Parse error: a.html, line 3: bad");

        let compile: Error = CodegenError::from(CompileError::new("b.txt", 7, "oops")).into();
        assert!(matches!(compile, Error::Compile(_)));
        assert_eq!(compile.location(), Some(("b.txt", 7)));
    }

    #[test]
    fn test_eval_error_round_trips_through_error() {
        let error: Error = EvalError::UndefinedName("x".to_string()).into();
        assert!(error.location().is_none());
        let back = EvalError::from(error);
        assert!(matches!(back, EvalError::UndefinedName(_)));
    }

    #[test]
    fn test_nested_errors_are_unwrapped() {
        let nested = EvalError::from(Error::config("inner"));
        assert!(matches!(nested, EvalError::Nested(_)));
        assert!(matches!(Error::from(nested), Error::Config(_)));
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error: Error = io_error.into();
        assert!(matches!(error, Error::Io(_)));
        assert!(error.to_string().contains("I/O error"));
        assert!(error.to_string().contains("File not found"));
    }

    #[test]
    fn test_error_from_serde_json_error() {
        let json_result: std::result::Result<serde_json::Value, _> =
            serde_json::from_str("invalid json");
        let error: Error = json_result.unwrap_err().into();
        assert!(matches!(error, Error::Json(_)));
        assert!(error.to_string().contains("JSON parsing error"));
    }
}
