//! The capability interface every field implementation provides.
//!
//! The engine only ever talks to fields through [`Field`]; concrete behaviour
//! (what a value looks like, where it is stored, which transaction tag it
//! produces) lives entirely in the implementations registered with the
//! [`FieldCatalog`](crate::registry::FieldCatalog).

use std::collections::BTreeMap;

use revfield_core::{FieldValue, RevisionRecord, TransactionType, Viewer};
use serde_json::Value;
use thiserror::Error;

/// Context a field list is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldRole {
    /// Fields that can be set from a commit-message style edit request.
    CommitMessageEdit,
    /// Fields that may produce and apply transactions.
    ApplicationTransactions,
    /// Fields exposed when reading revisions through the API.
    Api,
}

/// Where a field keeps its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageLocation {
    /// Denormalized onto the revision row; loaded with the revision.
    Object,
    /// Kept in the custom-field store; needs a separate (batched) read.
    Auxiliary,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("{0}")]
    Invalid(String),

    #[error("value has the wrong type")]
    WrongType,
}

pub trait Field {
    /// Internal key, used for storage and transaction metadata.
    fn field_key(&self) -> &str;

    /// Stable key used in external API payloads.
    fn key_for_api(&self) -> &str {
        self.field_key()
    }

    fn should_enable_for_role(&self, role: FieldRole) -> bool;

    fn transaction_type(&self) -> TransactionType {
        TransactionType::CustomField
    }

    fn storage_location(&self) -> StorageLocation {
        StorageLocation::Auxiliary
    }

    fn is_required(&self) -> bool {
        false
    }

    fn set_viewer(&mut self, _viewer: &Viewer) {}

    fn read_value_from_object(&mut self, _revision: &RevisionRecord) {}

    /// Called for auxiliary fields with whatever the store holds (`None` when
    /// nothing was ever written).
    fn read_value_from_storage(&mut self, _value: Option<FieldValue>) {}

    /// Value to persist for auxiliary fields after a transaction applied.
    fn value_for_storage(&self) -> Option<FieldValue> {
        None
    }

    fn validate_commit_message_value(&self, value: &Value) -> Result<(), FieldError>;

    fn read_value_from_commit_message(&mut self, value: &Value) -> Result<(), FieldError>;

    fn old_value_for_transactions(&self) -> Value;

    fn new_value_for_transactions(&self) -> Value;

    fn transaction_metadata(&self) -> BTreeMap<String, Value> {
        BTreeMap::new()
    }

    /// Final-stage check run by the editor on every transaction it applies,
    /// whoever built it.
    fn validate_transaction_value(&self, value: &Value) -> Result<(), FieldError>;

    /// Adopt `value` as the field's current state. Object-stored fields also
    /// write it through to `revision`.
    fn apply_transaction(
        &mut self,
        revision: &mut RevisionRecord,
        value: &Value,
    ) -> Result<(), FieldError>;

    /// External representation of the current value.
    fn api_value(&self) -> Value;

    fn is_empty(&self) -> bool {
        value_is_empty(&self.api_value())
    }
}

pub(crate) fn value_is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
