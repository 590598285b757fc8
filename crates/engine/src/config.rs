use std::path::Path;

use serde::Deserialize;

use crate::error::EngineError;

/// Value shape of a configured custom field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomFieldKind {
    Text,
    Int,
    Bool,
    Select,
    Remarkup,
}

fn enabled() -> bool {
    true
}

/// One entry of the `custom_fields` configuration list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CustomFieldSpec {
    pub key: String,
    pub name: String,
    pub kind: CustomFieldKind,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "enabled")]
    pub commit_message: bool,
    #[serde(default = "enabled")]
    pub edit: bool,
    #[serde(default = "enabled")]
    pub api: bool,
}

impl CustomFieldSpec {
    pub fn new(key: &str, name: &str, kind: CustomFieldKind) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            kind,
            options: Vec::new(),
            required: false,
            commit_message: true,
            edit: true,
            api: true,
        }
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub(crate) fn check(&self) -> Result<(), EngineError> {
        if self.key.trim().is_empty() {
            return Err(EngineError::Config(format!(
                "custom field '{}' has an empty key",
                self.name
            )));
        }
        if self.kind == CustomFieldKind::Select && self.options.is_empty() {
            return Err(EngineError::Config(format!(
                "select field '{}' needs at least one option",
                self.key
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URI used when building links in API dictionaries.
    pub production_uri: String,
    pub continue_on_no_effect: bool,
    pub continue_on_missing_fields: bool,
    pub require_test_plan: bool,
    pub custom_fields: Vec<CustomFieldSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            production_uri: "http://localhost".to_string(),
            continue_on_no_effect: true,
            continue_on_missing_fields: true,
            require_test_plan: false,
            custom_fields: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| EngineError::Config(e.to_string()))?;
        for spec in &config.custom_fields {
            spec.check()?;
        }
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, EngineError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn with_custom_field(mut self, spec: CustomFieldSpec) -> Self {
        self.custom_fields.push(spec);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.continue_on_no_effect);
        assert!(config.continue_on_missing_fields);
    }

    #[test]
    fn custom_fields_parse_with_role_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{
                "production_uri": "https://review.example.com",
                "custom_fields": [
                    {"key": "risk", "name": "Risk", "kind": "select", "options": ["low", "high"]},
                    {"key": "ticket", "name": "Ticket", "kind": "int", "edit": false}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.production_uri, "https://review.example.com");
        assert_eq!(config.custom_fields.len(), 2);
        assert_eq!(config.custom_fields[0].options, vec!["low", "high"]);
        assert!(config.custom_fields[0].edit);
        assert!(!config.custom_fields[1].edit);
        assert!(config.custom_fields[1].api);
    }

    #[test]
    fn select_without_options_is_rejected() {
        let err = EngineConfig::from_json_str(
            r#"{"custom_fields": [{"key": "risk", "name": "Risk", "kind": "select"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("revfield.json");
        std::fs::write(&path, r#"{"require_test_plan": true}"#).unwrap();
        let config = EngineConfig::from_json_file(&path).unwrap();
        assert!(config.require_test_plan);
    }
}
