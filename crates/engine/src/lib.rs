pub mod api;
pub mod builder;
pub mod config;
pub mod editor;
pub mod error;
pub mod field;
pub mod fields;
pub mod registry;
pub mod resolver;

pub use api::{DiffInfo, InlineInfo};
pub use builder::TransactionBuilder;
pub use config::{CustomFieldKind, CustomFieldSpec, EngineConfig};
pub use editor::{EditSummary, TransactionEditor};
pub use error::EngineError;
pub use field::{Field, FieldError, FieldRole, StorageLocation};
pub use registry::{FieldCatalog, FieldList, FieldStorageQuery};
pub use resolver::LEGACY_EDGE_KEYS;

use std::collections::BTreeMap;

use revfield_core::{
    DiffRecord, EdgeRecord, InlineCommentRecord, Phid, RevisionRecord, Transaction,
    TransactionRecord, Viewer,
};
use revfield_storage::{SqliteStorage, Storage};
use serde_json::{Map, Value};

pub struct Engine<S: Storage = SqliteStorage> {
    storage: S,
    catalog: FieldCatalog,
    config: EngineConfig,
}

impl Engine<SqliteStorage> {
    pub fn open_in_memory(config: EngineConfig) -> Result<Self, EngineError> {
        Self::new(SqliteStorage::open_in_memory()?, config)
    }
}

impl<S: Storage> Engine<S> {
    /// Engine with the built-in revision fields plus the configured custom fields.
    pub fn new(storage: S, config: EngineConfig) -> Result<Self, EngineError> {
        let catalog = FieldCatalog::with_defaults(&config)?;
        Ok(Self::with_catalog(storage, config, catalog))
    }

    pub fn with_catalog(storage: S, config: EngineConfig, catalog: FieldCatalog) -> Self {
        Self {
            storage,
            catalog,
            config,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut FieldCatalog {
        &mut self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Build the transactions for an edit request and apply them.
    ///
    /// `diff` is attached to `revision` and, when `message` is non-blank, has
    /// its description replaced by the message's first line. That write
    /// happens once validation passes and is kept even if applying fails.
    pub fn apply_field_edit(
        &mut self,
        viewer: &Viewer,
        revision: &RevisionRecord,
        diff: &mut DiffRecord,
        fields: &Map<String, Value>,
        message: Option<&str>,
    ) -> Result<EditSummary, EngineError> {
        let transactions = TransactionBuilder::new(&self.catalog, viewer).build(
            &mut self.storage,
            revision,
            diff,
            fields,
            message,
        )?;
        self.apply_transactions(viewer, revision, transactions)
    }

    /// Same as [`Engine::apply_field_edit`], addressing both objects by PHID.
    pub fn edit(
        &mut self,
        viewer: &Viewer,
        revision: Phid,
        diff: Phid,
        fields: &Map<String, Value>,
        message: Option<&str>,
    ) -> Result<EditSummary, EngineError> {
        let revision = self
            .storage
            .get_revision(revision)?
            .ok_or_else(|| EngineError::RevisionNotFound(revision.to_string()))?;
        let mut diff = self
            .storage
            .get_diff(diff)?
            .ok_or_else(|| EngineError::DiffNotFound(diff.to_string()))?;
        self.apply_field_edit(viewer, &revision, &mut diff, fields, message)
    }

    /// Create a revision around `diff` from an edit request.
    pub fn create_revision(
        &mut self,
        viewer: &Viewer,
        diff: &mut DiffRecord,
        fields: &Map<String, Value>,
    ) -> Result<EditSummary, EngineError> {
        let revision = RevisionRecord::new(viewer.actor_id);
        self.apply_field_edit(viewer, &revision, diff, fields, None)
    }

    pub fn apply_transactions(
        &mut self,
        viewer: &Viewer,
        revision: &RevisionRecord,
        transactions: Vec<Transaction>,
    ) -> Result<EditSummary, EngineError> {
        TransactionEditor::new(viewer)
            .continue_on_no_effect(self.config.continue_on_no_effect)
            .continue_on_missing_fields(self.config.continue_on_missing_fields)
            .apply(&mut self.storage, &self.catalog, revision, transactions)
    }

    pub fn load_custom_fields_for_revisions(
        &self,
        viewer: &Viewer,
        revisions: &[RevisionRecord],
    ) -> Result<BTreeMap<Phid, Map<String, Value>>, EngineError> {
        resolver::load_custom_fields_for_revisions(&self.storage, &self.catalog, viewer, revisions)
    }

    pub fn build_diff_info(&self, diff: &DiffRecord) -> DiffInfo {
        DiffInfo::new(diff, &self.config.production_uri)
    }

    pub fn build_inline_info(&self, inline: &InlineCommentRecord) -> Result<InlineInfo, EngineError> {
        let changeset = match inline.changeset_id {
            Some(id) => self.storage.get_changeset(id)?,
            None => None,
        };
        Ok(InlineInfo::new(inline, changeset.as_ref()))
    }

    pub fn revision(&self, phid: Phid) -> Result<Option<RevisionRecord>, EngineError> {
        Ok(self.storage.get_revision(phid)?)
    }

    pub fn diff(&self, phid: Phid) -> Result<Option<DiffRecord>, EngineError> {
        Ok(self.storage.get_diff(phid)?)
    }

    pub fn create_diff(&mut self, description: &str) -> Result<DiffRecord, EngineError> {
        Ok(self.storage.create_diff(description)?)
    }

    pub fn transactions_for(&self, object: Phid) -> Result<Vec<TransactionRecord>, EngineError> {
        Ok(self.storage.transactions_for(object)?)
    }

    pub fn add_edge(&mut self, edge: &EdgeRecord) -> Result<(), EngineError> {
        Ok(self.storage.add_edge(edge)?)
    }
}
