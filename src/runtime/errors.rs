//! Evaluation errors

use thiserror::Error;

/// Failure while running a compiled template
#[derive(Error, Debug)]
pub enum EvalError {
    #[error("name '{0}' is not defined")]
    UndefinedName(String),

    #[error("'{type_name}' object has no attribute '{attr}'")]
    NoAttribute { type_name: String, attr: String },

    #[error("'{0}' object is not subscriptable")]
    NotSubscriptable(String),

    #[error("{0} index out of range")]
    IndexOutOfRange(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("'{0}' object is not callable")]
    NotCallable(String),

    #[error("'{0}' object is not iterable")]
    NotIterable(String),

    #[error("{0}")]
    Arity(String),

    #[error("{0}")]
    Type(String),

    #[error("division by zero")]
    ZeroDivision,

    #[error("integer overflow")]
    Overflow,

    #[error("{0}")]
    Value(String),

    /// Failure raised by a template or render invoked from an expression
    #[error(transparent)]
    Nested(Box<crate::core::error::Error>),
}

impl EvalError {
    pub fn type_error<S: Into<String>>(msg: S) -> Self {
        Self::Type(msg.into())
    }

    pub fn arity<S: Into<String>>(msg: S) -> Self {
        Self::Arity(msg.into())
    }

    pub fn value<S: Into<String>>(msg: S) -> Self {
        Self::Value(msg.into())
    }

    pub fn no_attribute<T: Into<String>, A: Into<String>>(type_name: T, attr: A) -> Self {
        Self::NoAttribute {
            type_name: type_name.into(),
            attr: attr.into(),
        }
    }
}

impl From<crate::core::error::Error> for EvalError {
    fn from(error: crate::core::error::Error) -> Self {
        match error {
            crate::core::error::Error::Eval(inner) => inner,
            other => Self::Nested(Box::new(other)),
        }
    }
}

pub type EvalResult<T> = std::result::Result<T, EvalError>;
