use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}
