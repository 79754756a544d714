//! Model error type.

use thiserror::Error;

/// Result type used across the model layer.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while decoding persisted values into model types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A status code read from the store is not part of the vocabulary.
    #[error("unknown status code: {0:?}")]
    UnknownStatus(String),

    /// An on-error policy code is not recognised.
    #[error("unknown on-error policy: {0:?}")]
    UnknownOnError(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl ModelError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
