use std::cell::Cell;
use std::collections::HashMap;

use revfield_core::{
    BatchId, ChangesetRecord, DiffRecord, EdgeRecord, FieldValue, InlineCommentRecord, Phid,
    RevisionRecord, TransactionBatch, TransactionRecord,
};
use revfield_storage::{
    EditCommit, FieldStorageKey, NewInlineComment, SqliteStorage, Storage, StorageError,
};

/// Storage wrapper that counts the batched queries passing through it.
pub struct CountingStorage<S: Storage = SqliteStorage> {
    inner: S,
    field_loads: Cell<usize>,
    edge_queries: Cell<usize>,
}

impl<S: Storage> CountingStorage<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            field_loads: Cell::new(0),
            edge_queries: Cell::new(0),
        }
    }

    pub fn field_loads(&self) -> usize {
        self.field_loads.get()
    }

    pub fn edge_queries(&self) -> usize {
        self.edge_queries.get()
    }

    pub fn reset(&self) {
        self.field_loads.set(0);
        self.edge_queries.set(0);
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: Storage> Storage for CountingStorage<S> {
    fn save_revision(&mut self, revision: &RevisionRecord) -> Result<RevisionRecord, StorageError> {
        self.inner.save_revision(revision)
    }

    fn get_revision(&self, phid: Phid) -> Result<Option<RevisionRecord>, StorageError> {
        self.inner.get_revision(phid)
    }

    fn create_diff(&mut self, description: &str) -> Result<DiffRecord, StorageError> {
        self.inner.create_diff(description)
    }

    fn get_diff(&self, phid: Phid) -> Result<Option<DiffRecord>, StorageError> {
        self.inner.get_diff(phid)
    }

    fn save_diff(&mut self, diff: &DiffRecord) -> Result<(), StorageError> {
        self.inner.save_diff(diff)
    }

    fn create_changeset(
        &mut self,
        diff_id: i64,
        filename: &str,
        old_file: Option<&str>,
    ) -> Result<ChangesetRecord, StorageError> {
        self.inner.create_changeset(diff_id, filename, old_file)
    }

    fn get_changeset(&self, id: i64) -> Result<Option<ChangesetRecord>, StorageError> {
        self.inner.get_changeset(id)
    }

    fn create_inline_comment(
        &mut self,
        inline: &NewInlineComment,
    ) -> Result<InlineCommentRecord, StorageError> {
        self.inner.create_inline_comment(inline)
    }

    fn get_inline_comment(&self, id: i64) -> Result<Option<InlineCommentRecord>, StorageError> {
        self.inner.get_inline_comment(id)
    }

    fn load_field_values(
        &self,
        keys: &[FieldStorageKey],
    ) -> Result<HashMap<FieldStorageKey, FieldValue>, StorageError> {
        self.field_loads.set(self.field_loads.get() + 1);
        self.inner.load_field_values(keys)
    }

    fn add_edge(&mut self, edge: &EdgeRecord) -> Result<(), StorageError> {
        self.inner.add_edge(edge)
    }

    fn edge_destinations(
        &self,
        sources: &[Phid],
        edge_types: &[&str],
    ) -> Result<Vec<EdgeRecord>, StorageError> {
        self.edge_queries.set(self.edge_queries.get() + 1);
        self.inner.edge_destinations(sources, edge_types)
    }

    fn commit_edit(&mut self, commit: &EditCommit) -> Result<RevisionRecord, StorageError> {
        self.inner.commit_edit(commit)
    }

    fn transactions_for(&self, object: Phid) -> Result<Vec<TransactionRecord>, StorageError> {
        self.inner.transactions_for(object)
    }

    fn get_batch(&self, batch_id: BatchId) -> Result<Option<TransactionBatch>, StorageError> {
        self.inner.get_batch(batch_id)
    }

    fn transaction_count(&self) -> Result<u64, StorageError> {
        self.inner.transaction_count()
    }
}
