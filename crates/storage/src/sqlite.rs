use std::collections::{HashMap, HashSet};

use rusqlite::{Connection, OptionalExtension, types::Value as SqlValue};
use tracing::debug;

use revfield_core::{
    field_value::FieldValue,
    ids::*,
    records::*,
    transaction::{TransactionBatch, TransactionRecord},
};

use crate::error::StorageError;
use crate::traits::{EditCommit, FieldStorageKey, NewInlineComment, Storage};

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Corrupt(format!("invalid {label} length")))
}

fn to_phid(v: Vec<u8>, label: &str) -> Result<Phid, StorageError> {
    Ok(Phid::from_bytes(to_array::<16>(v, label)?))
}

fn to_actor(v: Vec<u8>, label: &str) -> Result<ActorId, StorageError> {
    Ok(ActorId::from_bytes(to_array::<16>(v, label)?))
}

/// `?, ?, ?` with `n` placeholders.
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }
}

type RevisionRow = (i64, Vec<u8>, Vec<u8>, String, String, String, Option<Vec<u8>>);

fn revision_from_row(row: RevisionRow) -> Result<RevisionRecord, StorageError> {
    let (id, phid, author, title, summary, test_plan, active_diff) = row;
    Ok(RevisionRecord {
        id: Some(id),
        phid: to_phid(phid, "revision phid")?,
        author: to_actor(author, "author")?,
        title,
        summary,
        test_plan,
        active_diff: active_diff
            .map(|bytes| to_phid(bytes, "active_diff"))
            .transpose()?,
    })
}

fn write_revision(
    conn: &Connection,
    revision: &RevisionRecord,
) -> Result<RevisionRecord, StorageError> {
    let active_diff = revision.active_diff.map(|p| p.as_bytes().to_vec());
    let mut saved = revision.clone();
    match revision.id {
        None => {
            conn.execute(
                "INSERT INTO revisions (phid, author, title, summary, test_plan, active_diff) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    revision.phid.as_bytes().as_slice(),
                    revision.author.as_bytes().as_slice(),
                    revision.title,
                    revision.summary,
                    revision.test_plan,
                    active_diff,
                ],
            )?;
            saved.id = Some(conn.last_insert_rowid());
        }
        Some(id) => {
            let updated = conn.execute(
                "UPDATE revisions SET title = ?1, summary = ?2, test_plan = ?3, active_diff = ?4 WHERE revision_id = ?5",
                rusqlite::params![
                    revision.title,
                    revision.summary,
                    revision.test_plan,
                    active_diff,
                    id,
                ],
            )?;
            if updated == 0 {
                return Err(StorageError::NotFound(format!("revision D{id}")));
            }
        }
    }
    Ok(saved)
}

fn write_diff(conn: &Connection, diff: &DiffRecord) -> Result<(), StorageError> {
    let updated = conn.execute(
        "UPDATE diffs SET revision_phid = ?1, description = ?2 WHERE diff_id = ?3",
        rusqlite::params![
            diff.revision.map(|p| p.as_bytes().to_vec()),
            diff.description,
            diff.id,
        ],
    )?;
    if updated == 0 {
        return Err(StorageError::NotFound(format!("diff {}", diff.id)));
    }
    Ok(())
}

impl Storage for SqliteStorage {
    fn save_revision(&mut self, revision: &RevisionRecord) -> Result<RevisionRecord, StorageError> {
        write_revision(&self.conn, revision)
    }

    fn get_revision(&self, phid: Phid) -> Result<Option<RevisionRecord>, StorageError> {
        let row: Option<RevisionRow> = self
            .conn
            .query_row(
                "SELECT revision_id, phid, author, title, summary, test_plan, active_diff FROM revisions WHERE phid = ?1",
                rusqlite::params![phid.as_bytes().as_slice()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )
            .optional()?;
        row.map(revision_from_row).transpose()
    }

    fn create_diff(&mut self, description: &str) -> Result<DiffRecord, StorageError> {
        let phid = Phid::new();
        self.conn.execute(
            "INSERT INTO diffs (phid, revision_phid, description) VALUES (?1, NULL, ?2)",
            rusqlite::params![phid.as_bytes().as_slice(), description],
        )?;
        Ok(DiffRecord {
            id: self.conn.last_insert_rowid(),
            phid,
            revision: None,
            description: description.to_string(),
        })
    }

    fn get_diff(&self, phid: Phid) -> Result<Option<DiffRecord>, StorageError> {
        let row: Option<(i64, Option<Vec<u8>>, String)> = self
            .conn
            .query_row(
                "SELECT diff_id, revision_phid, description FROM diffs WHERE phid = ?1",
                rusqlite::params![phid.as_bytes().as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        match row {
            Some((id, revision, description)) => Ok(Some(DiffRecord {
                id,
                phid,
                revision: revision
                    .map(|bytes| to_phid(bytes, "revision_phid"))
                    .transpose()?,
                description,
            })),
            None => Ok(None),
        }
    }

    fn save_diff(&mut self, diff: &DiffRecord) -> Result<(), StorageError> {
        write_diff(&self.conn, diff)
    }

    fn create_changeset(
        &mut self,
        diff_id: i64,
        filename: &str,
        old_file: Option<&str>,
    ) -> Result<ChangesetRecord, StorageError> {
        self.conn.execute(
            "INSERT INTO changesets (diff_id, filename, old_file) VALUES (?1, ?2, ?3)",
            rusqlite::params![diff_id, filename, old_file],
        )?;
        Ok(ChangesetRecord {
            id: self.conn.last_insert_rowid(),
            diff_id,
            filename: filename.to_string(),
            old_file: old_file.map(str::to_string),
        })
    }

    fn get_changeset(&self, id: i64) -> Result<Option<ChangesetRecord>, StorageError> {
        let changeset = self
            .conn
            .query_row(
                "SELECT changeset_id, diff_id, filename, old_file FROM changesets WHERE changeset_id = ?1",
                rusqlite::params![id],
                |row| {
                    Ok(ChangesetRecord {
                        id: row.get(0)?,
                        diff_id: row.get(1)?,
                        filename: row.get(2)?,
                        old_file: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(changeset)
    }

    fn create_inline_comment(
        &mut self,
        inline: &NewInlineComment,
    ) -> Result<InlineCommentRecord, StorageError> {
        self.conn.execute(
            "INSERT INTO inline_comments (author, changeset_id, is_new_file, line_number, line_length, content) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                inline.author.as_bytes().as_slice(),
                inline.changeset_id,
                inline.is_new_file,
                inline.line_number,
                inline.line_length,
                inline.content,
            ],
        )?;
        Ok(InlineCommentRecord {
            id: self.conn.last_insert_rowid(),
            author: inline.author,
            changeset_id: inline.changeset_id,
            is_new_file: inline.is_new_file,
            line_number: inline.line_number,
            line_length: inline.line_length,
            content: inline.content.clone(),
        })
    }

    fn get_inline_comment(&self, id: i64) -> Result<Option<InlineCommentRecord>, StorageError> {
        let row: Option<(i64, Vec<u8>, Option<i64>, bool, u32, u32, String)> = self
            .conn
            .query_row(
                "SELECT inline_id, author, changeset_id, is_new_file, line_number, line_length, content FROM inline_comments WHERE inline_id = ?1",
                rusqlite::params![id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((id, author, changeset_id, is_new_file, line_number, line_length, content)) => {
                Ok(Some(InlineCommentRecord {
                    id,
                    author: to_actor(author, "author")?,
                    changeset_id,
                    is_new_file,
                    line_number,
                    line_length,
                    content,
                }))
            }
            None => Ok(None),
        }
    }

    fn load_field_values(
        &self,
        keys: &[FieldStorageKey],
    ) -> Result<HashMap<FieldStorageKey, FieldValue>, StorageError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let objects: Vec<Phid> = keys
            .iter()
            .map(|k| k.object)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let field_keys: Vec<&str> = keys
            .iter()
            .map(|k| k.field_key.as_str())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let sql = format!(
            "SELECT object_phid, field_key, value FROM custom_field_storage WHERE object_phid IN ({}) AND field_key IN ({})",
            placeholders(objects.len()),
            placeholders(field_keys.len()),
        );
        let params: Vec<SqlValue> = objects
            .iter()
            .map(|p| SqlValue::Blob(p.as_bytes().to_vec()))
            .chain(field_keys.iter().map(|k| SqlValue::Text(k.to_string())))
            .collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
            let object: Vec<u8> = row.get(0)?;
            let field_key: String = row.get(1)?;
            let value: Vec<u8> = row.get(2)?;
            Ok((object, field_key, value))
        })?;

        // The IN x IN query can over-fetch; keep only the exact pairs asked for.
        let wanted: HashSet<&FieldStorageKey> = keys.iter().collect();
        let mut result = HashMap::new();
        for row in rows {
            let (object, field_key, value_bytes) = row?;
            let key = FieldStorageKey {
                object: to_phid(object, "object_phid")?,
                field_key,
            };
            if !wanted.contains(&key) {
                continue;
            }
            let value = FieldValue::from_msgpack(&value_bytes)
                .map_err(|e| StorageError::Codec(e.to_string()))?;
            result.insert(key, value);
        }
        Ok(result)
    }

    fn add_edge(&mut self, edge: &EdgeRecord) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO edges (source_phid, edge_type, dest_phid) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                edge.source.as_bytes().as_slice(),
                edge.edge_type,
                edge.destination.as_bytes().as_slice(),
            ],
        )?;
        Ok(())
    }

    fn edge_destinations(
        &self,
        sources: &[Phid],
        edge_types: &[&str],
    ) -> Result<Vec<EdgeRecord>, StorageError> {
        if sources.is_empty() || edge_types.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT source_phid, edge_type, dest_phid FROM edges WHERE source_phid IN ({}) AND edge_type IN ({}) ORDER BY rowid",
            placeholders(sources.len()),
            placeholders(edge_types.len()),
        );
        let params: Vec<SqlValue> = sources
            .iter()
            .map(|p| SqlValue::Blob(p.as_bytes().to_vec()))
            .chain(edge_types.iter().map(|t| SqlValue::Text(t.to_string())))
            .collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
            let source: Vec<u8> = row.get(0)?;
            let edge_type: String = row.get(1)?;
            let destination: Vec<u8> = row.get(2)?;
            Ok((source, edge_type, destination))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (source, edge_type, destination) = row?;
            result.push(EdgeRecord {
                source: to_phid(source, "source_phid")?,
                edge_type,
                destination: to_phid(destination, "dest_phid")?,
            });
        }
        Ok(result)
    }

    fn commit_edit(&mut self, commit: &EditCommit) -> Result<RevisionRecord, StorageError> {
        let tx = self.conn.transaction()?;

        let saved = write_revision(&tx, &commit.revision)?;

        for diff in &commit.diffs {
            write_diff(&tx, diff)?;
        }

        for (key, value) in &commit.field_values {
            let value_bytes = value
                .to_msgpack()
                .map_err(|e| StorageError::Codec(e.to_string()))?;
            tx.execute(
                "INSERT INTO custom_field_storage (object_phid, field_key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(object_phid, field_key) DO UPDATE SET value = excluded.value",
                rusqlite::params![key.object.as_bytes().as_slice(), key.field_key, value_bytes],
            )?;
        }

        let batch = &commit.batch;
        tx.execute(
            "INSERT INTO transaction_batches (batch_id, object_phid, author, created_at, record_count, checksum) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                batch.batch_id.as_bytes().as_slice(),
                batch.object.as_bytes().as_slice(),
                batch.author.as_bytes().as_slice(),
                batch.created_at,
                batch.record_count as i64,
                &batch.checksum[..],
            ],
        )?;

        for record in &commit.records {
            tx.execute(
                "INSERT INTO transactions (transaction_id, object_phid, batch_id, transaction_type, payload, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    record.transaction_id.as_bytes().as_slice(),
                    record.object.as_bytes().as_slice(),
                    record.batch_id.as_bytes().as_slice(),
                    record.transaction_type.as_str(),
                    record.to_msgpack()?,
                    record.created_at,
                ],
            )?;
        }

        tx.commit()?;
        debug!(
            revision = %saved.phid,
            batch = %batch.batch_id,
            records = commit.records.len(),
            field_values = commit.field_values.len(),
            "committed edit"
        );
        Ok(saved)
    }

    fn transactions_for(&self, object: Phid) -> Result<Vec<TransactionRecord>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload FROM transactions WHERE object_phid = ?1 ORDER BY rowid")?;
        let rows = stmt.query_map(rusqlite::params![object.as_bytes().as_slice()], |row| {
            row.get::<_, Vec<u8>>(0)
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(TransactionRecord::from_msgpack(&row?)?);
        }
        Ok(result)
    }

    fn get_batch(&self, batch_id: BatchId) -> Result<Option<TransactionBatch>, StorageError> {
        let row: Option<(Vec<u8>, Vec<u8>, i64, i64, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT object_phid, author, created_at, record_count, checksum FROM transaction_batches WHERE batch_id = ?1",
                rusqlite::params![batch_id.as_bytes().as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;
        match row {
            Some((object, author, created_at, record_count, checksum)) => {
                Ok(Some(TransactionBatch {
                    batch_id,
                    object: to_phid(object, "object_phid")?,
                    author: to_actor(author, "author")?,
                    created_at,
                    record_count: record_count as u32,
                    checksum: to_array::<32>(checksum, "checksum")?,
                }))
            }
            None => Ok(None),
        }
    }

    fn transaction_count(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revfield_core::transaction::TransactionType;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn storage() -> SqliteStorage {
        SqliteStorage::open_in_memory().unwrap()
    }

    fn record(object: Phid, batch_id: BatchId, author: ActorId) -> TransactionRecord {
        TransactionRecord {
            transaction_id: TransactionId::new(),
            object,
            author,
            batch_id,
            transaction_type: TransactionType::Comment,
            old_value: json!(null),
            new_value: json!(null),
            metadata: BTreeMap::new(),
            comment: Some("looks good".into()),
            created_at: 10,
        }
    }

    #[test]
    fn revision_insert_then_update() {
        let mut storage = storage();
        let mut revision = RevisionRecord::new(ActorId::new());
        revision.title = "First".into();

        let saved = storage.save_revision(&revision).unwrap();
        assert!(saved.id.is_some());

        let mut edited = saved.clone();
        edited.title = "Second".into();
        storage.save_revision(&edited).unwrap();

        let loaded = storage.get_revision(revision.phid).unwrap().unwrap();
        assert_eq!(loaded.title, "Second");
        assert_eq!(loaded.id, saved.id);
    }

    #[test]
    fn updating_unknown_revision_is_not_found() {
        let mut storage = storage();
        let mut revision = RevisionRecord::new(ActorId::new());
        revision.id = Some(99);
        let err = storage.save_revision(&revision).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn field_values_batch_returns_only_requested_pairs() {
        let mut storage = storage();
        let author = ActorId::new();
        let a = storage.save_revision(&RevisionRecord::new(author)).unwrap();
        let b = storage.save_revision(&RevisionRecord::new(author)).unwrap();

        let batch_id = BatchId::new();
        let records = vec![record(a.phid, batch_id, author)];
        let commit = EditCommit {
            revision: a.clone(),
            diffs: vec![],
            field_values: vec![
                (FieldStorageKey::new(a.phid, "risk"), FieldValue::Text("low".into())),
                (FieldStorageKey::new(a.phid, "size"), FieldValue::Integer(3)),
            ],
            batch: TransactionBatch::new(batch_id, a.phid, author, 10, &records).unwrap(),
            records,
        };
        storage.commit_edit(&commit).unwrap();

        let batch_id = BatchId::new();
        let records = vec![record(b.phid, batch_id, author)];
        let commit = EditCommit {
            revision: b.clone(),
            diffs: vec![],
            field_values: vec![(FieldStorageKey::new(b.phid, "size"), FieldValue::Integer(9))],
            batch: TransactionBatch::new(batch_id, b.phid, author, 10, &records).unwrap(),
            records,
        };
        storage.commit_edit(&commit).unwrap();

        // Asks for (a, risk) and (b, size) only: (a, size) must not leak in.
        let values = storage
            .load_field_values(&[
                FieldStorageKey::new(a.phid, "risk"),
                FieldStorageKey::new(b.phid, "size"),
                FieldStorageKey::new(b.phid, "risk"),
            ])
            .unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(
            values.get(&FieldStorageKey::new(a.phid, "risk")),
            Some(&FieldValue::Text("low".into()))
        );
        assert_eq!(
            values.get(&FieldStorageKey::new(b.phid, "size")),
            Some(&FieldValue::Integer(9))
        );
    }

    #[test]
    fn edges_filter_by_source_and_type() {
        let mut storage = storage();
        let (a, b, p1, p2) = (Phid::new(), Phid::new(), Phid::new(), Phid::new());
        for (source, edge_type, destination) in [
            (a, "object.has-project", p1),
            (a, "object.has-project", p2),
            (b, "object.has-project", p2),
            (a, "object.has-subscriber", p1),
        ] {
            storage
                .add_edge(&EdgeRecord {
                    source,
                    edge_type: edge_type.into(),
                    destination,
                })
                .unwrap();
        }

        let edges = storage
            .edge_destinations(&[a, b], &["object.has-project"])
            .unwrap();
        let pairs: Vec<(Phid, Phid)> = edges.iter().map(|e| (e.source, e.destination)).collect();
        assert_eq!(pairs, vec![(a, p1), (a, p2), (b, p2)]);

        assert!(storage.edge_destinations(&[], &["object.has-project"]).unwrap().is_empty());
    }

    #[test]
    fn failed_commit_leaves_nothing_behind() {
        let mut storage = storage();
        let author = ActorId::new();
        let revision = storage.save_revision(&RevisionRecord::new(author)).unwrap();

        let batch_id = BatchId::new();
        let records = vec![record(revision.phid, batch_id, author)];
        let mut edited = revision.clone();
        edited.title = "changed".into();
        let commit = EditCommit {
            revision: edited,
            // Diff 404 does not exist, so the commit fails after the revision write.
            diffs: vec![DiffRecord {
                id: 404,
                phid: Phid::new(),
                revision: Some(revision.phid),
                description: String::new(),
            }],
            field_values: vec![],
            batch: TransactionBatch::new(batch_id, revision.phid, author, 10, &records).unwrap(),
            records,
        };
        assert!(storage.commit_edit(&commit).is_err());

        let loaded = storage.get_revision(revision.phid).unwrap().unwrap();
        assert_eq!(loaded.title, "");
        assert_eq!(storage.transaction_count().unwrap(), 0);
        assert!(storage.get_batch(batch_id).unwrap().is_none());
    }

    #[test]
    fn committed_batch_verifies_against_its_records() {
        let mut storage = storage();
        let author = ActorId::new();
        let revision = storage.save_revision(&RevisionRecord::new(author)).unwrap();

        let batch_id = BatchId::new();
        let records = vec![
            record(revision.phid, batch_id, author),
            record(revision.phid, batch_id, author),
        ];
        let batch = TransactionBatch::new(batch_id, revision.phid, author, 10, &records).unwrap();
        storage
            .commit_edit(&EditCommit {
                revision: revision.clone(),
                diffs: vec![],
                field_values: vec![],
                batch,
                records,
            })
            .unwrap();

        let loaded = storage.transactions_for(revision.phid).unwrap();
        let batch = storage.get_batch(batch_id).unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(batch.verify(&loaded).unwrap());
    }

    #[test]
    fn on_disk_store_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("revfield.db");
        let path = path.to_str().unwrap();

        let phid = {
            let mut storage = SqliteStorage::open(path).unwrap();
            let mut revision = RevisionRecord::new(ActorId::new());
            revision.title = "persisted".into();
            storage.save_revision(&revision).unwrap().phid
        };

        let storage = SqliteStorage::open(path).unwrap();
        assert_eq!(storage.get_revision(phid).unwrap().unwrap().title, "persisted");
    }

    #[test]
    fn inline_comment_roundtrip() {
        let mut storage = storage();
        let diff = storage.create_diff("d").unwrap();
        let changeset = storage
            .create_changeset(diff.id, "src/lib.rs", Some("src/old.rs"))
            .unwrap();
        let inline = storage
            .create_inline_comment(&NewInlineComment {
                author: ActorId::new(),
                changeset_id: Some(changeset.id),
                is_new_file: true,
                line_number: 12,
                line_length: 3,
                content: "nit".into(),
            })
            .unwrap();

        assert_eq!(storage.get_inline_comment(inline.id).unwrap(), Some(inline));
        assert_eq!(storage.get_changeset(changeset.id).unwrap(), Some(changeset));
    }
}
