//! Error types for code generation

use thiserror::Error;

use crate::syntax::ParseError;

/// A malformed embedded expression or statement
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{template}, line {line}: {message}")]
pub struct CompileError {
    pub template: String,
    pub line: usize,
    pub message: String,
}

impl CompileError {
    pub fn new<T: Into<String>, M: Into<String>>(template: T, line: usize, message: M) -> Self {
        Self {
            template: template.into(),
            line,
            message: message.into(),
        }
    }
}

/// Errors raised while turning sections into instructions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl CodegenError {
    /// Source line the error points at
    pub fn line(&self) -> usize {
        match self {
            Self::Parse(e) => e.line,
            Self::Compile(e) => e.line,
        }
    }
}
