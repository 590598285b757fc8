use std::collections::HashMap;

use revfield_core::{
    field_value::FieldValue,
    ids::*,
    records::*,
    transaction::{TransactionBatch, TransactionRecord},
};

use crate::error::StorageError;

/// Address of one value in the auxiliary custom-field store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldStorageKey {
    pub object: Phid,
    pub field_key: String,
}

impl FieldStorageKey {
    pub fn new(object: Phid, field_key: &str) -> Self {
        Self {
            object,
            field_key: field_key.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewInlineComment {
    pub author: ActorId,
    pub changeset_id: Option<i64>,
    pub is_new_file: bool,
    pub line_number: u32,
    pub line_length: u32,
    pub content: String,
}

/// Everything one editor application writes. Committed all-or-nothing.
#[derive(Debug, Clone)]
pub struct EditCommit {
    pub revision: RevisionRecord,
    pub diffs: Vec<DiffRecord>,
    pub field_values: Vec<(FieldStorageKey, FieldValue)>,
    pub batch: TransactionBatch,
    pub records: Vec<TransactionRecord>,
}

/// Storage and graph collaborator.
///
/// Methods that take slices are batched: implementations must answer them
/// with a single round trip no matter how many keys are passed.
pub trait Storage {
    /// Insert or update a revision row, returning it with its id assigned.
    fn save_revision(&mut self, revision: &RevisionRecord) -> Result<RevisionRecord, StorageError>;

    fn get_revision(&self, phid: Phid) -> Result<Option<RevisionRecord>, StorageError>;

    fn create_diff(&mut self, description: &str) -> Result<DiffRecord, StorageError>;

    fn get_diff(&self, phid: Phid) -> Result<Option<DiffRecord>, StorageError>;

    fn save_diff(&mut self, diff: &DiffRecord) -> Result<(), StorageError>;

    fn create_changeset(
        &mut self,
        diff_id: i64,
        filename: &str,
        old_file: Option<&str>,
    ) -> Result<ChangesetRecord, StorageError>;

    fn get_changeset(&self, id: i64) -> Result<Option<ChangesetRecord>, StorageError>;

    fn create_inline_comment(
        &mut self,
        inline: &NewInlineComment,
    ) -> Result<InlineCommentRecord, StorageError>;

    fn get_inline_comment(&self, id: i64) -> Result<Option<InlineCommentRecord>, StorageError>;

    /// Batched read of auxiliary field values. Keys with no stored value are
    /// absent from the result.
    fn load_field_values(
        &self,
        keys: &[FieldStorageKey],
    ) -> Result<HashMap<FieldStorageKey, FieldValue>, StorageError>;

    fn add_edge(&mut self, edge: &EdgeRecord) -> Result<(), StorageError>;

    /// Batched edge query: every edge leaving any of `sources` whose type is
    /// one of `edge_types`, in insertion order.
    fn edge_destinations(
        &self,
        sources: &[Phid],
        edge_types: &[&str],
    ) -> Result<Vec<EdgeRecord>, StorageError>;

    /// Atomically persist the result of one editor application.
    fn commit_edit(&mut self, commit: &EditCommit) -> Result<RevisionRecord, StorageError>;

    fn transactions_for(&self, object: Phid) -> Result<Vec<TransactionRecord>, StorageError>;

    fn get_batch(&self, batch_id: BatchId) -> Result<Option<TransactionBatch>, StorageError>;

    fn transaction_count(&self) -> Result<u64, StorageError>;
}
