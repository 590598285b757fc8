use revfield_core::CoreError;
use revfield_storage::StorageError;
use thiserror::Error;

use crate::field::FieldError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("invalid value for field '{key}': {message}")]
    Validation { key: String, message: String },

    #[error("transaction of type '{transaction_type}' has no effect")]
    NoEffect { transaction_type: String },

    #[error("required field '{key}' has no value")]
    MissingRequiredField { key: String },

    #[error("duplicate field key: {0}")]
    DuplicateFieldKey(String),

    #[error("revision not found: {0}")]
    RevisionNotFound(String),

    #[error("diff not found: {0}")]
    DiffNotFound(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub(crate) fn validation(key: &str, error: FieldError) -> Self {
        Self::Validation {
            key: key.to_string(),
            message: error.to_string(),
        }
    }

    /// Offending field key for validation failures.
    pub fn field_key(&self) -> Option<&str> {
        match self {
            Self::Validation { key, .. } | Self::MissingRequiredField { key } => Some(key),
            _ => None,
        }
    }
}
