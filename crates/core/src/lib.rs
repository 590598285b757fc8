pub mod error;
pub mod field_value;
pub mod ids;
pub mod records;
pub mod transaction;

pub use error::CoreError;
pub use field_value::FieldValue;
pub use ids::*;
pub use records::*;
pub use transaction::{Transaction, TransactionBatch, TransactionRecord, TransactionType};
