//! SQLite persistence for revisions, diffs, auxiliary field values, the edge
//! graph and the transaction log.

pub mod error;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use error::StorageError;
pub use sqlite::SqliteStorage;
pub use traits::*;
