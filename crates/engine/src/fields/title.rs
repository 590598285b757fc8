use revfield_core::RevisionRecord;
use serde_json::Value;

use crate::field::{Field, FieldError, FieldRole, StorageLocation};

/// Revision title. Stored on the revision row but edited through generic
/// custom-field transactions.
#[derive(Debug, Default)]
pub struct TitleField {
    value: String,
}

impl TitleField {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse(value: &Value) -> Result<String, FieldError> {
        let title = value.as_str().ok_or(FieldError::WrongType)?.trim();
        if title.is_empty() {
            return Err(FieldError::Invalid("a revision title is required".into()));
        }
        if title.contains('\n') {
            return Err(FieldError::Invalid("a revision title must be a single line".into()));
        }
        Ok(title.to_string())
    }
}

impl Field for TitleField {
    fn field_key(&self) -> &str {
        "differential:title"
    }

    fn key_for_api(&self) -> &str {
        "title"
    }

    fn should_enable_for_role(&self, _role: FieldRole) -> bool {
        true
    }

    fn storage_location(&self) -> StorageLocation {
        StorageLocation::Object
    }

    fn is_required(&self) -> bool {
        true
    }

    fn read_value_from_object(&mut self, revision: &RevisionRecord) {
        self.value = revision.title.clone();
    }

    fn validate_commit_message_value(&self, value: &Value) -> Result<(), FieldError> {
        Self::parse(value).map(|_| ())
    }

    fn read_value_from_commit_message(&mut self, value: &Value) -> Result<(), FieldError> {
        self.value = Self::parse(value)?;
        Ok(())
    }

    fn old_value_for_transactions(&self) -> Value {
        Value::String(self.value.clone())
    }

    fn new_value_for_transactions(&self) -> Value {
        Value::String(self.value.clone())
    }

    fn validate_transaction_value(&self, value: &Value) -> Result<(), FieldError> {
        Self::parse(value).map(|_| ())
    }

    fn apply_transaction(
        &mut self,
        revision: &mut RevisionRecord,
        value: &Value,
    ) -> Result<(), FieldError> {
        self.value = Self::parse(value)?;
        revision.title = self.value.clone();
        Ok(())
    }

    fn api_value(&self) -> Value {
        Value::String(self.value.clone())
    }
}
