use revfield_core::{DiffRecord, EdgeRecord, Phid, RevisionRecord, Viewer};
use revfield_engine::{EditSummary, Engine, EngineConfig, EngineError, resolver};
use revfield_storage::SqliteStorage;
use serde_json::{Map, Value};

use crate::counting::CountingStorage;

/// An in-memory engine plus the viewer every helper acts as.
pub struct TestApp {
    pub viewer: Viewer,
    pub engine: Engine<CountingStorage>,
}

impl TestApp {
    pub fn new() -> Result<Self, EngineError> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Result<Self, EngineError> {
        crate::init_tracing();
        let storage = CountingStorage::new(SqliteStorage::open_in_memory()?);
        Ok(Self {
            viewer: Viewer::new("alice"),
            engine: Engine::new(storage, config)?,
        })
    }

    pub fn storage(&self) -> &CountingStorage {
        self.engine.storage()
    }

    pub fn new_diff(&mut self) -> Result<DiffRecord, EngineError> {
        self.engine.create_diff("")
    }

    /// Create a revision titled `title` on a fresh diff, with any extra fields.
    pub fn create_revision(
        &mut self,
        title: &str,
        extra: Value,
    ) -> Result<RevisionRecord, EngineError> {
        let mut request = crate::fields(extra);
        request.insert("title".into(), Value::from(title));
        let mut diff = self.new_diff()?;
        let summary = self
            .engine
            .create_revision(&self.viewer, &mut diff, &request)?;
        Ok(summary.revision)
    }

    /// Edit the stored state of `revision` against a fresh diff.
    pub fn edit(
        &mut self,
        revision: &RevisionRecord,
        request: Value,
        message: Option<&str>,
    ) -> Result<(EditSummary, DiffRecord), EngineError> {
        let current = self.reload(revision)?;
        let mut diff = self.new_diff()?;
        let summary = self.engine.apply_field_edit(
            &self.viewer,
            &current,
            &mut diff,
            &crate::fields(request),
            message,
        )?;
        Ok((summary, diff))
    }

    pub fn reload(&self, revision: &RevisionRecord) -> Result<RevisionRecord, EngineError> {
        self.engine
            .revision(revision.phid)?
            .ok_or_else(|| EngineError::RevisionNotFound(revision.phid.to_string()))
    }

    pub fn tag_project(&mut self, revision: &RevisionRecord, project: Phid) -> Result<(), EngineError> {
        self.engine.add_edge(&EdgeRecord {
            source: revision.phid,
            edge_type: resolver::EDGE_OBJECT_HAS_PROJECT.into(),
            destination: project,
        })
    }

    pub fn add_dependency(
        &mut self,
        revision: &RevisionRecord,
        depends_on: &RevisionRecord,
    ) -> Result<(), EngineError> {
        self.engine.add_edge(&EdgeRecord {
            source: revision.phid,
            edge_type: resolver::EDGE_REVISION_DEPENDS_ON.into(),
            destination: depends_on.phid,
        })
    }

    /// API values for the stored state of one revision.
    pub fn api_fields(&self, revision: &RevisionRecord) -> Result<Map<String, Value>, EngineError> {
        let current = self.reload(revision)?;
        let mut resolved = self
            .engine
            .load_custom_fields_for_revisions(&self.viewer, std::slice::from_ref(&current))?;
        Ok(resolved.remove(&revision.phid).unwrap_or_default())
    }
}
