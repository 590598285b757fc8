//! Turns an untyped `key -> value` edit request into an ordered transaction
//! sequence.

use revfield_core::transaction::CUSTOMFIELD_KEY_METADATA;
use revfield_core::{DiffRecord, RevisionRecord, Transaction, TransactionType, Viewer};
use revfield_storage::Storage;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::editor::stored_state;
use crate::error::EngineError;
use crate::field::FieldRole;
use crate::registry::FieldCatalog;

pub struct TransactionBuilder<'a> {
    catalog: &'a FieldCatalog,
    viewer: &'a Viewer,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(catalog: &'a FieldCatalog, viewer: &'a Viewer) -> Self {
        Self { catalog, viewer }
    }

    /// Build the transactions for a field edit attributed to `diff`.
    ///
    /// The first transaction always attaches `diff`. Old values come from the
    /// stored revision. Keys with no matching field are skipped. Any
    /// validation failure, including a `diff` owned by another revision,
    /// aborts before anything is written. A non-blank `message` overwrites the diff description with its
    /// first line (persisted immediately, outside the transaction log) and adds
    /// a trailing comment.
    pub fn build<S: Storage + ?Sized>(
        &self,
        storage: &mut S,
        revision: &RevisionRecord,
        diff: &mut DiffRecord,
        values: &Map<String, Value>,
        message: Option<&str>,
    ) -> Result<Vec<Transaction>, EngineError> {
        if let Some(owner) = diff.revision.filter(|owner| *owner != revision.phid) {
            debug!(diff = %diff.phid, owner = %owner, "diff belongs to another revision");
            return Err(EngineError::Validation {
                key: "diff".into(),
                message: format!("diff {} is already attached to another revision", diff.id),
            });
        }

        let current = stored_state(&*storage, revision)?;
        let mut field_list = self.catalog.object_fields(FieldRole::CommitMessageEdit);
        field_list
            .set_viewer(self.viewer)
            .read_fields_from_storage(&*storage, &current)?;
        let field_map = field_list.index_by_api_key();

        let mut xactions = vec![Transaction::update_diff(diff.phid)];

        for (key, value) in values {
            let Some(&index) = field_map.get(key) else {
                // Callers echo back read-only keys (revision id and friends).
                debug!(key = %key, "ignoring unknown field");
                continue;
            };
            let Some(field) = field_list.field_at_mut(index) else {
                continue;
            };
            if !field.should_enable_for_role(FieldRole::ApplicationTransactions) {
                debug!(key = %key, "field does not accept transactions");
                continue;
            }

            let transaction_type = field.transaction_type();
            let old_value = (transaction_type == TransactionType::CustomField)
                .then(|| field.old_value_for_transactions());

            field
                .validate_commit_message_value(value)
                .map_err(|e| EngineError::validation(key, e))?;
            field
                .read_value_from_commit_message(value)
                .map_err(|e| EngineError::validation(key, e))?;

            let mut xaction =
                Transaction::new(transaction_type, field.new_value_for_transactions());
            if let Some(old_value) = old_value {
                xaction = xaction
                    .with_old_value(old_value)
                    .with_metadata(CUSTOMFIELD_KEY_METADATA, Value::from(field.field_key()));
            }
            for (meta_key, meta_value) in field.transaction_metadata() {
                xaction = xaction.with_metadata(&meta_key, meta_value);
            }
            xactions.push(xaction);
        }

        if let Some(message) = message.filter(|m| !m.trim().is_empty()) {
            Self::overwrite_diff_description(storage, diff, message)?;
            xactions.push(Transaction::comment(message));
        }

        info!(
            revision = %revision.phid,
            diff = %diff.phid,
            requested = values.len(),
            transactions = xactions.len(),
            "built field edit"
        );
        Ok(xactions)
    }

    /// Legacy behaviour: the diff description mirrors the first line of the
    /// most recent edit message. This is a direct write, not a transaction.
    fn overwrite_diff_description<S: Storage + ?Sized>(
        storage: &mut S,
        diff: &mut DiffRecord,
        message: &str,
    ) -> Result<(), EngineError> {
        let first_line = message.lines().next().unwrap_or_default();
        diff.description = first_line.to_string();
        storage.save_diff(diff)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CustomFieldKind, CustomFieldSpec, EngineConfig};
    use revfield_storage::SqliteStorage;
    use serde_json::json;

    struct Fixture {
        storage: SqliteStorage,
        catalog: FieldCatalog,
        viewer: Viewer,
        revision: RevisionRecord,
        diff: DiffRecord,
    }

    fn fixture() -> Fixture {
        let mut readonly = CustomFieldSpec::new("ticket", "Ticket", CustomFieldKind::Int);
        readonly.edit = false;
        let config = EngineConfig::default()
            .with_custom_field(
                CustomFieldSpec::new("risk", "Risk", CustomFieldKind::Select)
                    .with_options(&["low", "high"]),
            )
            .with_custom_field(readonly);

        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let viewer = Viewer::new("alice");
        let mut revision = RevisionRecord::new(viewer.actor_id);
        revision.title = "Old title".into();
        let revision = storage.save_revision(&revision).unwrap();
        let diff = storage.create_diff("initial").unwrap();
        Fixture {
            storage,
            catalog: FieldCatalog::with_defaults(&config).unwrap(),
            viewer,
            revision,
            diff,
        }
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn build(f: &mut Fixture, values: Value, message: Option<&str>) -> Result<Vec<Transaction>, EngineError> {
        TransactionBuilder::new(&f.catalog, &f.viewer).build(
            &mut f.storage,
            &f.revision,
            &mut f.diff,
            &fields(values),
            message,
        )
    }

    #[test]
    fn empty_request_yields_only_the_diff_update() {
        let mut f = fixture();
        let xactions = build(&mut f, json!({}), None).unwrap();
        assert_eq!(xactions.len(), 1);
        assert_eq!(*xactions[0].transaction_type(), TransactionType::UpdateDiff);
        assert_eq!(xactions[0].new_value(), &json!(f.diff.phid.to_string()));
    }

    #[test]
    fn custom_field_transactions_carry_old_value_and_key() {
        let mut f = fixture();
        let xactions = build(&mut f, json!({"title": "Fix bug"}), Some("")).unwrap();
        assert_eq!(xactions.len(), 2);

        let title = &xactions[1];
        assert_eq!(*title.transaction_type(), TransactionType::CustomField);
        assert_eq!(title.old_value(), Some(&json!("Old title")));
        assert_eq!(title.new_value(), &json!("Fix bug"));
        assert_eq!(title.custom_field_key(), Some("differential:title"));
        assert_eq!(f.diff.description, "initial");
    }

    #[test]
    fn builtin_typed_fields_have_no_old_value() {
        let mut f = fixture();
        let xactions = build(&mut f, json!({"summary": "Longer text"}), None).unwrap();
        let summary = &xactions[1];
        assert_eq!(*summary.transaction_type(), TransactionType::Summary);
        assert_eq!(summary.old_value(), None);
        assert!(summary.metadata().is_empty());
    }

    #[test]
    fn unknown_and_disabled_keys_are_skipped_in_order() {
        let mut f = fixture();
        let xactions = build(
            &mut f,
            json!({"revisionID": 12, "risk": "high", "ticket": 7, "title": "T"}),
            None,
        )
        .unwrap();
        let keys: Vec<Option<&str>> = xactions.iter().map(|x| x.custom_field_key()).collect();
        assert_eq!(
            keys,
            vec![None, Some("std:differential:risk"), Some("differential:title")]
        );
    }

    #[test]
    fn validation_failure_names_the_key_and_has_no_side_effect() {
        let mut f = fixture();
        let err = build(&mut f, json!({"title": "Good", "risk": "extreme"}), Some("Message")).unwrap_err();
        assert_eq!(err.field_key(), Some("risk"));
        assert!(err.to_string().contains("not a valid option"));

        assert_eq!(f.diff.description, "initial");
        let stored = f.storage.get_diff(f.diff.phid).unwrap().unwrap();
        assert_eq!(stored.description, "initial");
    }

    #[test]
    fn wrong_type_gets_the_generic_message() {
        let mut f = fixture();
        let err = build(&mut f, json!({"title": ["a"]}), None).unwrap_err();
        assert_eq!(err.to_string(), "invalid value for field 'title': value has the wrong type");
    }

    #[test]
    fn message_sets_description_and_appends_comment() {
        let mut f = fixture();
        let xactions = build(&mut f, json!({}), Some("Fix the bug.\nDetails...")).unwrap();
        assert_eq!(xactions.len(), 2);
        assert_eq!(*xactions[1].transaction_type(), TransactionType::Comment);
        assert_eq!(xactions[1].comment_text(), Some("Fix the bug.\nDetails..."));

        assert_eq!(f.diff.description, "Fix the bug.");
        let stored = f.storage.get_diff(f.diff.phid).unwrap().unwrap();
        assert_eq!(stored.description, "Fix the bug.");
    }

    #[test]
    fn old_values_come_from_the_stored_revision() {
        let mut f = fixture();
        let mut newer = f.revision.clone();
        newer.title = "Stored title".into();
        f.storage.save_revision(&newer).unwrap();

        let xactions = build(&mut f, json!({"title": "Fix bug"}), None).unwrap();
        assert_eq!(xactions[1].old_value(), Some(&json!("Stored title")));
    }

    #[test]
    fn diff_of_another_revision_keeps_its_description() {
        let mut f = fixture();
        f.diff.revision = Some(revfield_core::Phid::new());
        f.storage.save_diff(&f.diff).unwrap();

        let err = build(&mut f, json!({"title": "T"}), Some("Takeover")).unwrap_err();
        assert_eq!(err.field_key(), Some("diff"));
        assert_eq!(f.diff.description, "initial");
        let stored = f.storage.get_diff(f.diff.phid).unwrap().unwrap();
        assert_eq!(stored.description, "initial");
    }

    #[test]
    fn whitespace_message_is_absent() {
        let mut f = fixture();
        let xactions = build(&mut f, json!({}), Some(" \n\t ")).unwrap();
        assert_eq!(xactions.len(), 1);
        assert_eq!(f.diff.description, "initial");
    }
}
