use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored field value could not be encoded or decoded.
    #[error("field value codec error: {0}")]
    Codec(String),

    /// A row holds bytes that cannot be an id or checksum.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// An update addressed a row that was never inserted.
    #[error("{0} does not exist")]
    NotFound(String),

    #[error("core error: {0}")]
    Core(#[from] revfield_core::CoreError),
}
