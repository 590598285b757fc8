use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::CoreError;
use crate::ids::*;

/// Metadata key naming the field a generic custom-field transaction targets.
pub const CUSTOMFIELD_KEY_METADATA: &str = "customfield:key";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransactionType {
    UpdateDiff,
    Comment,
    CustomField,
    Summary,
    TestPlan,
    /// Tag owned by a field implementation the engine knows nothing about.
    Extension(String),
}

impl TransactionType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::UpdateDiff => "differential:update",
            Self::Comment => "core:comment",
            Self::CustomField => "core:customfield",
            Self::Summary => "differential.revision.summary",
            Self::TestPlan => "differential.revision.testplan",
            Self::Extension(tag) => tag,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "differential:update" => Self::UpdateDiff,
            "core:comment" => Self::Comment,
            "core:customfield" => Self::CustomField,
            "differential.revision.summary" => Self::Summary,
            "differential.revision.testplan" => Self::TestPlan,
            other => Self::Extension(other.to_string()),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TransactionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TransactionType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag: String = Deserialize::deserialize(deserializer)?;
        Ok(Self::parse(&tag))
    }
}

/// One requested change to a revision. Built once, then only read.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    transaction_type: TransactionType,
    old_value: Option<Value>,
    new_value: Value,
    metadata: BTreeMap<String, Value>,
    comment: Option<String>,
}

impl Transaction {
    pub fn new(transaction_type: TransactionType, new_value: Value) -> Self {
        Self {
            transaction_type,
            old_value: None,
            new_value,
            metadata: BTreeMap::new(),
            comment: None,
        }
    }

    pub fn update_diff(diff: Phid) -> Self {
        Self::new(TransactionType::UpdateDiff, Value::String(diff.to_string()))
    }

    pub fn comment(content: &str) -> Self {
        Self {
            comment: Some(content.to_string()),
            ..Self::new(TransactionType::Comment, Value::Null)
        }
    }

    pub fn with_old_value(mut self, old_value: Value) -> Self {
        self.old_value = Some(old_value);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn transaction_type(&self) -> &TransactionType {
        &self.transaction_type
    }

    pub fn old_value(&self) -> Option<&Value> {
        self.old_value.as_ref()
    }

    pub fn new_value(&self) -> &Value {
        &self.new_value
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn comment_text(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Internal field key carried by a generic custom-field transaction.
    pub fn custom_field_key(&self) -> Option<&str> {
        self.metadata_value(CUSTOMFIELD_KEY_METADATA)
            .and_then(Value::as_str)
    }
}

/// Audit-log form of an applied transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: TransactionId,
    pub object: Phid,
    pub author: ActorId,
    pub batch_id: BatchId,
    pub transaction_type: TransactionType,
    /// Value reconciled against state at apply time; `Null` when there was none.
    pub old_value: Value,
    pub new_value: Value,
    pub metadata: BTreeMap<String, Value>,
    pub comment: Option<String>,
    pub created_at: i64,
}

impl TransactionRecord {
    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}

/// The set of records written by a single editor application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionBatch {
    pub batch_id: BatchId,
    pub object: Phid,
    pub author: ActorId,
    pub created_at: i64,
    pub record_count: u32,
    pub checksum: [u8; 32],
}

impl TransactionBatch {
    pub fn new(
        batch_id: BatchId,
        object: Phid,
        author: ActorId,
        created_at: i64,
        records: &[TransactionRecord],
    ) -> Result<Self, CoreError> {
        Ok(Self {
            batch_id,
            object,
            author,
            created_at,
            record_count: records.len() as u32,
            checksum: Self::checksum_of(records)?,
        })
    }

    pub fn checksum_of(records: &[TransactionRecord]) -> Result<[u8; 32], CoreError> {
        let mut hasher = blake3::Hasher::new();
        for record in records {
            hasher.update(&record.to_msgpack()?);
        }
        Ok(*hasher.finalize().as_bytes())
    }

    pub fn verify(&self, records: &[TransactionRecord]) -> Result<bool, CoreError> {
        Ok(records.len() as u32 == self.record_count && Self::checksum_of(records)? == self.checksum)
    }
}
