use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::{ActorId, Phid};

/// Returns the current wall-clock time as milliseconds since Unix epoch.
pub fn now_ms() -> Result<i64, CoreError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .map_err(|_| CoreError::InvalidData("system clock before epoch".into()))
}

/// The acting identity. Opaque to the engine apart from attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub actor_id: ActorId,
    pub username: String,
}

impl Viewer {
    pub fn new(username: &str) -> Self {
        Self {
            actor_id: ActorId::new(),
            username: username.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRecord {
    /// Storage-assigned id; `None` until the revision is first committed.
    pub id: Option<i64>,
    pub phid: Phid,
    pub author: ActorId,
    pub title: String,
    pub summary: String,
    pub test_plan: String,
    pub active_diff: Option<Phid>,
}

impl RevisionRecord {
    pub fn new(author: ActorId) -> Self {
        Self {
            id: None,
            phid: Phid::new(),
            author,
            title: String::new(),
            summary: String::new(),
            test_plan: String::new(),
            active_diff: None,
        }
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    /// Display name, e.g. `D12`.
    pub fn monogram(&self) -> Option<String> {
        self.id.map(|id| format!("D{id}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRecord {
    pub id: i64,
    pub phid: Phid,
    pub revision: Option<Phid>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangesetRecord {
    pub id: i64,
    pub diff_id: i64,
    pub filename: String,
    pub old_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineCommentRecord {
    pub id: i64,
    pub author: ActorId,
    pub changeset_id: Option<i64>,
    pub is_new_file: bool,
    pub line_number: u32,
    pub line_length: u32,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRecord {
    pub source: Phid,
    pub edge_type: String,
    pub destination: Phid,
}
