use std::collections::BTreeMap;

use revfield_core::{FieldValue, RevisionRecord};
use serde_json::{Value, json};

use crate::config::{CustomFieldKind, CustomFieldSpec};
use crate::field::{Field, FieldError, FieldRole};

/// Configuration-driven custom field kept in auxiliary storage.
#[derive(Debug)]
pub struct StandardField {
    spec: CustomFieldSpec,
    field_key: String,
    value: FieldValue,
}

impl StandardField {
    pub fn new(spec: CustomFieldSpec) -> Self {
        let field_key = format!("std:differential:{}", spec.key);
        Self {
            spec,
            field_key,
            value: FieldValue::Null,
        }
    }

    fn parse(&self, value: &Value) -> Result<FieldValue, FieldError> {
        if value.is_null() {
            return Ok(FieldValue::Null);
        }
        match self.spec.kind {
            CustomFieldKind::Text | CustomFieldKind::Remarkup => {
                let text = value.as_str().ok_or(FieldError::WrongType)?;
                if text.trim().is_empty() {
                    Ok(FieldValue::Null)
                } else {
                    Ok(FieldValue::Text(text.to_string()))
                }
            }
            CustomFieldKind::Int => match value {
                Value::Number(n) => n.as_i64().map(FieldValue::Integer).ok_or_else(|| {
                    FieldError::Invalid(format!("{} must be an integer", self.spec.name))
                }),
                Value::String(s) if s.trim().is_empty() => Ok(FieldValue::Null),
                Value::String(s) => s.trim().parse().map(FieldValue::Integer).map_err(|_| {
                    FieldError::Invalid(format!("{} must be an integer", self.spec.name))
                }),
                _ => Err(FieldError::WrongType),
            },
            CustomFieldKind::Bool => value
                .as_bool()
                .map(FieldValue::Boolean)
                .ok_or(FieldError::WrongType),
            CustomFieldKind::Select => {
                let choice = value.as_str().ok_or(FieldError::WrongType)?;
                if self.spec.options.iter().any(|option| option == choice) {
                    Ok(FieldValue::Text(choice.to_string()))
                } else {
                    Err(FieldError::Invalid(format!(
                        "'{choice}' is not a valid option for {}; expected one of: {}",
                        self.spec.name,
                        self.spec.options.join(", ")
                    )))
                }
            }
        }
    }
}

impl Field for StandardField {
    fn field_key(&self) -> &str {
        &self.field_key
    }

    fn key_for_api(&self) -> &str {
        &self.spec.key
    }

    fn should_enable_for_role(&self, role: FieldRole) -> bool {
        match role {
            FieldRole::CommitMessageEdit => self.spec.commit_message,
            FieldRole::ApplicationTransactions => self.spec.edit,
            FieldRole::Api => self.spec.api,
        }
    }

    fn is_required(&self) -> bool {
        self.spec.required
    }

    fn read_value_from_storage(&mut self, value: Option<FieldValue>) {
        self.value = value.unwrap_or(FieldValue::Null);
    }

    fn value_for_storage(&self) -> Option<FieldValue> {
        Some(self.value.clone())
    }

    fn validate_commit_message_value(&self, value: &Value) -> Result<(), FieldError> {
        self.parse(value).map(|_| ())
    }

    fn read_value_from_commit_message(&mut self, value: &Value) -> Result<(), FieldError> {
        self.value = self.parse(value)?;
        Ok(())
    }

    fn old_value_for_transactions(&self) -> Value {
        self.value.to_json()
    }

    fn new_value_for_transactions(&self) -> Value {
        self.value.to_json()
    }

    fn transaction_metadata(&self) -> BTreeMap<String, Value> {
        match (&self.spec.kind, &self.value) {
            (CustomFieldKind::Remarkup, FieldValue::Text(corpus)) => BTreeMap::from([(
                "remarkup.control".to_string(),
                json!({ "corpus": corpus }),
            )]),
            _ => BTreeMap::new(),
        }
    }

    fn validate_transaction_value(&self, value: &Value) -> Result<(), FieldError> {
        self.parse(value).map(|_| ())
    }

    fn apply_transaction(
        &mut self,
        _revision: &mut RevisionRecord,
        value: &Value,
    ) -> Result<(), FieldError> {
        self.value = self.parse(value)?;
        Ok(())
    }

    fn api_value(&self) -> Value {
        self.value.to_json()
    }
}
