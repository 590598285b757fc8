use revfield_core::{RevisionRecord, TransactionType};
use serde_json::Value;

use crate::field::{Field, FieldError, FieldRole, StorageLocation};

/// Free-text property kept on the revision row with its own transaction tag
/// (summary, test plan).
pub struct RevisionTextField {
    field_key: &'static str,
    api_key: &'static str,
    transaction_type: TransactionType,
    required: bool,
    read: fn(&RevisionRecord) -> &str,
    write: fn(&mut RevisionRecord, String),
    value: String,
}

impl RevisionTextField {
    pub fn summary() -> Self {
        Self {
            field_key: "differential:summary",
            api_key: "summary",
            transaction_type: TransactionType::Summary,
            required: false,
            read: |revision| revision.summary.as_str(),
            write: |revision, value| revision.summary = value,
            value: String::new(),
        }
    }

    pub fn test_plan(required: bool) -> Self {
        Self {
            field_key: "differential:test-plan",
            api_key: "testPlan",
            transaction_type: TransactionType::TestPlan,
            required,
            read: |revision| revision.test_plan.as_str(),
            write: |revision, value| revision.test_plan = value,
            value: String::new(),
        }
    }

    fn parse(value: &Value) -> Result<String, FieldError> {
        match value {
            Value::Null => Ok(String::new()),
            Value::String(s) => Ok(s.trim_end().to_string()),
            _ => Err(FieldError::WrongType),
        }
    }
}

impl Field for RevisionTextField {
    fn field_key(&self) -> &str {
        self.field_key
    }

    fn key_for_api(&self) -> &str {
        self.api_key
    }

    fn should_enable_for_role(&self, _role: FieldRole) -> bool {
        true
    }

    fn transaction_type(&self) -> TransactionType {
        self.transaction_type.clone()
    }

    fn storage_location(&self) -> StorageLocation {
        StorageLocation::Object
    }

    fn is_required(&self) -> bool {
        self.required
    }

    fn read_value_from_object(&mut self, revision: &RevisionRecord) {
        self.value = (self.read)(revision).to_string();
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
        (self.write)(revision, self.value.clone());
        Ok(())
    }

    fn api_value(&self) -> Value {
        Value::String(self.value.clone())
    }
}
