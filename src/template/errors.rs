//! Template lookup errors

use thiserror::Error;

/// A template name that does not resolve under a render root
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("no template named '{name}' under {root}")]
    NotFound { name: String, root: String },

    #[error("invalid template name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("'{0}' is a directory, not a template")]
    NotATemplate(String),
}

impl ResolutionError {
    pub fn invalid<N: Into<String>, R: Into<String>>(name: N, reason: R) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
