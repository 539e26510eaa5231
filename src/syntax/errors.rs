//! Error types for the template front end

use thiserror::Error;

/// Structural parse error: a malformed directive, unterminated group,
/// missing `:` after a block header or malformed `$var` line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{template}, line {line}: {message}")]
pub struct ParseError {
    pub template: String,
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new<T: Into<String>, M: Into<String>>(template: T, line: usize, message: M) -> Self {
        Self {
            template: template.into(),
            line,
            message: message.into(),
        }
    }
}
