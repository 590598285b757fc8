use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS revisions (
    revision_id INTEGER PRIMARY KEY AUTOINCREMENT,
    phid BLOB NOT NULL UNIQUE CHECK (length(phid) = 16),
    author BLOB NOT NULL CHECK (length(author) = 16),
    title TEXT NOT NULL,
    summary TEXT NOT NULL,
    test_plan TEXT NOT NULL,
    active_diff BLOB CHECK (active_diff IS NULL OR length(active_diff) = 16)
);

CREATE TABLE IF NOT EXISTS diffs (
    diff_id INTEGER PRIMARY KEY AUTOINCREMENT,
    phid BLOB NOT NULL UNIQUE CHECK (length(phid) = 16),
    revision_phid BLOB CHECK (revision_phid IS NULL OR length(revision_phid) = 16),
    description TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS changesets (
    changeset_id INTEGER PRIMARY KEY AUTOINCREMENT,
    diff_id INTEGER NOT NULL REFERENCES diffs (diff_id),
    filename TEXT NOT NULL,
    old_file TEXT
);

CREATE TABLE IF NOT EXISTS inline_comments (
    inline_id INTEGER PRIMARY KEY AUTOINCREMENT,
    author BLOB NOT NULL CHECK (length(author) = 16),
    changeset_id INTEGER REFERENCES changesets (changeset_id),
    is_new_file INTEGER NOT NULL,
    line_number INTEGER NOT NULL,
    line_length INTEGER NOT NULL,
    content TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS custom_field_storage (
    object_phid BLOB NOT NULL CHECK (length(object_phid) = 16),
    field_key TEXT NOT NULL,
    value BLOB NOT NULL,
    PRIMARY KEY (object_phid, field_key)
);

CREATE TABLE IF NOT EXISTS edges (
    rowid INTEGER PRIMARY KEY,
    source_phid BLOB NOT NULL CHECK (length(source_phid) = 16),
    edge_type TEXT NOT NULL,
    dest_phid BLOB NOT NULL CHECK (length(dest_phid) = 16),
    UNIQUE (source_phid, edge_type, dest_phid)
);
CREATE INDEX IF NOT EXISTS idx_edges_source ON edges (source_phid, edge_type);

CREATE TABLE IF NOT EXISTS transaction_batches (
    batch_id BLOB PRIMARY KEY CHECK (length(batch_id) = 16),
    object_phid BLOB NOT NULL CHECK (length(object_phid) = 16),
    author BLOB NOT NULL CHECK (length(author) = 16),
    created_at INTEGER NOT NULL,
    record_count INTEGER NOT NULL,
    checksum BLOB NOT NULL CHECK (length(checksum) = 32)
);

CREATE TABLE IF NOT EXISTS transactions (
    rowid INTEGER PRIMARY KEY,
    transaction_id BLOB NOT NULL UNIQUE CHECK (length(transaction_id) = 16),
    object_phid BLOB NOT NULL CHECK (length(object_phid) = 16),
    batch_id BLOB NOT NULL REFERENCES transaction_batches (batch_id),
    transaction_type TEXT NOT NULL,
    payload BLOB NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_transactions_object ON transactions (object_phid, rowid);
";
