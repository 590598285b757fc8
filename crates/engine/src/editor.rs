//! Applies a transaction sequence to a revision and commits the result.

use std::collections::BTreeMap;

use revfield_core::{
    BatchId, DiffRecord, FieldValue, Phid, RevisionRecord, Transaction, TransactionBatch,
    TransactionId, TransactionRecord, TransactionType, Viewer, now_ms,
};
use revfield_storage::{EditCommit, FieldStorageKey, Storage};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::field::{Field, FieldError, FieldRole, StorageLocation};
use crate::registry::{FieldCatalog, FieldList};

/// Outcome of one editor application.
#[derive(Debug, Clone)]
pub struct EditSummary {
    /// The revision as committed (or unchanged, when nothing applied).
    pub revision: RevisionRecord,
    /// `None` when every transaction was absorbed as a no-effect.
    pub batch_id: Option<BatchId>,
    pub applied: Vec<TransactionRecord>,
    pub skipped_no_effect: usize,
}

/// A transaction after reconciliation against the working state.
struct Applied {
    transaction_type: TransactionType,
    old_value: Value,
    new_value: Value,
    metadata: BTreeMap<String, Value>,
    comment: Option<String>,
}

enum Outcome {
    Applied(Applied),
    NoEffect,
}

/// State accumulated while applying a batch; written out in one commit.
struct Working {
    revision: RevisionRecord,
    fields: FieldList,
    diffs: Vec<DiffRecord>,
    field_values: BTreeMap<String, FieldValue>,
}

pub struct TransactionEditor<'a> {
    viewer: &'a Viewer,
    continue_on_no_effect: bool,
    continue_on_missing_fields: bool,
}

impl<'a> TransactionEditor<'a> {
    pub fn new(viewer: &'a Viewer) -> Self {
        Self {
            viewer,
            continue_on_no_effect: false,
            continue_on_missing_fields: false,
        }
    }

    pub fn continue_on_no_effect(mut self, value: bool) -> Self {
        self.continue_on_no_effect = value;
        self
    }

    /// Only consulted when the revision being edited has never been committed.
    pub fn continue_on_missing_fields(mut self, value: bool) -> Self {
        self.continue_on_missing_fields = value;
        self
    }

    pub fn apply<S: Storage + ?Sized>(
        &self,
        storage: &mut S,
        catalog: &FieldCatalog,
        revision: &RevisionRecord,
        transactions: Vec<Transaction>,
    ) -> Result<EditSummary, EngineError> {
        let current = stored_state(&*storage, revision)?;
        let mut fields = catalog.object_fields(FieldRole::ApplicationTransactions);
        fields.set_viewer(self.viewer);
        if current.is_new() {
            fields.read_fields_from_object(&current);
        } else {
            fields.read_fields_from_storage(&*storage, &current)?;
        }

        let mut working = Working {
            revision: current,
            fields,
            diffs: Vec::new(),
            field_values: BTreeMap::new(),
        };

        let mut applied = Vec::with_capacity(transactions.len());
        let mut skipped_no_effect = 0;
        for xaction in &transactions {
            match self.apply_one(&*storage, &mut working, xaction)? {
                Outcome::Applied(result) => applied.push(result),
                Outcome::NoEffect if self.continue_on_no_effect => {
                    debug!(
                        revision = %revision.phid,
                        transaction_type = %xaction.transaction_type(),
                        "dropping transaction with no effect"
                    );
                    skipped_no_effect += 1;
                }
                Outcome::NoEffect => {
                    return Err(EngineError::NoEffect {
                        transaction_type: xaction.transaction_type().to_string(),
                    });
                }
            }
        }

        if revision.is_new() && !self.continue_on_missing_fields {
            if let Some(field) = working
                .fields
                .fields()
                .iter()
                .find(|field| field.is_required() && field.is_empty())
            {
                return Err(EngineError::MissingRequiredField {
                    key: field.key_for_api().to_string(),
                });
            }
        }

        if applied.is_empty() {
            debug!(revision = %revision.phid, "nothing to commit");
            return Ok(EditSummary {
                revision: working.revision,
                batch_id: None,
                applied: Vec::new(),
                skipped_no_effect,
            });
        }

        let object = working.revision.phid;
        let author = self.viewer.actor_id;
        let batch_id = BatchId::new();
        let created_at = now_ms()?;
        let records: Vec<TransactionRecord> = applied
            .into_iter()
            .map(|a| TransactionRecord {
                transaction_id: TransactionId::new(),
                object,
                author,
                batch_id,
                transaction_type: a.transaction_type,
                old_value: a.old_value,
                new_value: a.new_value,
                metadata: a.metadata,
                comment: a.comment,
                created_at,
            })
            .collect();
        let batch = TransactionBatch::new(batch_id, object, author, created_at, &records)?;

        let commit = EditCommit {
            revision: working.revision,
            diffs: working.diffs,
            field_values: working
                .field_values
                .into_iter()
                .map(|(field_key, value)| (FieldStorageKey::new(object, &field_key), value))
                .collect(),
            batch,
            records,
        };
        let saved = storage.commit_edit(&commit)?;

        let monogram = saved.monogram().unwrap_or_default();
        info!(
            revision = %saved.phid,
            monogram = %monogram,
            batch = %batch_id,
            applied = commit.records.len(),
            skipped = skipped_no_effect,
            "applied transactions"
        );
        Ok(EditSummary {
            revision: saved,
            batch_id: Some(batch_id),
            applied: commit.records,
            skipped_no_effect,
        })
    }

    fn apply_one<S: Storage + ?Sized>(
        &self,
        storage: &S,
        working: &mut Working,
        xaction: &Transaction,
    ) -> Result<Outcome, EngineError> {
        match xaction.transaction_type() {
            TransactionType::UpdateDiff => Self::apply_update_diff(storage, working, xaction),
            TransactionType::Comment => {
                let text = xaction.comment_text().unwrap_or_default();
                if text.trim().is_empty() {
                    return Err(EngineError::Validation {
                        key: "comment".into(),
                        message: "a comment may not be empty".into(),
                    });
                }
                Ok(Outcome::Applied(Applied {
                    transaction_type: TransactionType::Comment,
                    old_value: Value::Null,
                    new_value: Value::Null,
                    metadata: xaction.metadata().clone(),
                    comment: Some(text.to_string()),
                }))
            }
            _ => Self::apply_field(working, xaction),
        }
    }

    fn apply_update_diff<S: Storage + ?Sized>(
        storage: &S,
        working: &mut Working,
        xaction: &Transaction,
    ) -> Result<Outcome, EngineError> {
        let invalid = |message: String| EngineError::Validation {
            key: "diff".into(),
            message,
        };
        let phid: Phid = xaction
            .new_value()
            .as_str()
            .ok_or_else(|| invalid("diff reference must be a string".into()))?
            .parse()?;

        let mut diff = storage
            .get_diff(phid)?
            .ok_or_else(|| EngineError::DiffNotFound(phid.to_string()))?;
        match diff.revision {
            Some(owner) if owner != working.revision.phid => {
                return Err(invalid(format!(
                    "diff {} is already attached to another revision",
                    diff.id
                )));
            }
            _ => {}
        }
        if working.revision.active_diff == Some(phid) {
            return Ok(Outcome::NoEffect);
        }

        let old_value = working
            .revision
            .active_diff
            .map_or(Value::Null, |p| Value::String(p.to_string()));
        diff.revision = Some(working.revision.phid);
        working.revision.active_diff = Some(phid);
        working.diffs.push(diff);

        Ok(Outcome::Applied(Applied {
            transaction_type: TransactionType::UpdateDiff,
            old_value,
            new_value: xaction.new_value().clone(),
            metadata: xaction.metadata().clone(),
            comment: None,
        }))
    }

    fn apply_field(working: &mut Working, xaction: &Transaction) -> Result<Outcome, EngineError> {
        let transaction_type = xaction.transaction_type();
        let field: &mut Box<dyn Field> = if *transaction_type == TransactionType::CustomField {
            let key = xaction.custom_field_key().ok_or_else(|| EngineError::Validation {
                key: transaction_type.to_string(),
                message: "custom field transaction does not name a field".into(),
            })?;
            working
                .fields
                .field_by_key_mut(key)
                .ok_or_else(|| EngineError::Validation {
                    key: key.to_string(),
                    message: "no such field accepts transactions".into(),
                })?
        } else {
            working
                .fields
                .field_by_transaction_type_mut(transaction_type)
                .ok_or_else(|| EngineError::Validation {
                    key: transaction_type.to_string(),
                    message: "no field handles this transaction type".into(),
                })?
        };

        let api_key = field.key_for_api().to_string();
        let new_value = xaction.new_value();
        field
            .validate_transaction_value(new_value)
            .map_err(|e| EngineError::validation(&api_key, e))?;

        let old_value = field.old_value_for_transactions();
        if old_value == *new_value {
            return Ok(Outcome::NoEffect);
        }

        field
            .apply_transaction(&mut working.revision, new_value)
            .map_err(|e: FieldError| EngineError::validation(&api_key, e))?;
        if field.storage_location() == StorageLocation::Auxiliary {
            if let Some(value) = field.value_for_storage() {
                working
                    .field_values
                    .insert(field.field_key().to_string(), value);
            }
        }

        Ok(Outcome::Applied(Applied {
            transaction_type: transaction_type.clone(),
            old_value,
            new_value: new_value.clone(),
            metadata: xaction.metadata().clone(),
            comment: None,
        }))
    }
}

/// The committed state of `revision`, or the record itself when it has never
/// been committed. Edits always reconcile against this, never against a
/// caller's copy that may predate other edits.
pub(crate) fn stored_state<S: Storage + ?Sized>(
    storage: &S,
    revision: &RevisionRecord,
) -> Result<RevisionRecord, EngineError> {
    if revision.is_new() {
        return Ok(revision.clone());
    }
    storage
        .get_revision(revision.phid)?
        .ok_or_else(|| EngineError::RevisionNotFound(revision.phid.to_string()))
}
