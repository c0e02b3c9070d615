#![forbid(unsafe_code)]

mod changes;
mod documents;
mod entities;
mod error;
mod queue;
mod requests;
mod resolver;
mod sources;
mod types;

pub use error::StoreError;
pub use requests::*;
pub use types::*;

use rusqlite::{Connection, ErrorCode, OptionalExtension, Transaction, params};
use std::path::{Path, PathBuf};
use std::time::Duration;
use trove_core::SchemaRegistry;

const SCHEMA_VERSION: i64 = 1;

/// The authoritative transactional store. Every public mutating call runs in
/// exactly one SQLite transaction; dependency checks and dedup lookups are
/// never separated from the writes they guard.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
    registry: SchemaRegistry,
}

impl SqliteStore {
    /// Opens (or creates) the store. The registry must already hold every
    /// entity schema the store will be asked to resolve.
    pub fn open(
        storage_dir: impl AsRef<Path>,
        registry: SchemaRegistry,
    ) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join("trove.db");
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\n\
             PRAGMA synchronous=NORMAL;\n\
             PRAGMA foreign_keys=ON;",
        )?;

        install_schema(&conn)?;

        Ok(Self {
            conn,
            storage_dir,
            registry,
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }
}

fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS counters (
          name TEXT PRIMARY KEY,
          value INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sources (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          name TEXT NOT NULL,
          kind TEXT NOT NULL CHECK(kind IN ('provider', 'user')),
          created_at_ms INTEGER NOT NULL,
          UNIQUE(name)
        );

        CREATE TABLE IF NOT EXISTS raw_documents (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          source_id INTEGER NOT NULL REFERENCES sources(id),
          source_doc_id TEXT NOT NULL,
          content_hash TEXT NOT NULL,
          payload BLOB NOT NULL,
          first_seen_ms INTEGER NOT NULL,
          last_seen_ms INTEGER NOT NULL,
          UNIQUE(source_id, source_doc_id, content_hash)
        );

        CREATE TABLE IF NOT EXISTS pending_work (
          raw_document_id INTEGER PRIMARY KEY REFERENCES raw_documents(id),
          enqueued_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS normalizations (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          raw_document_id INTEGER NOT NULL REFERENCES raw_documents(id),
          normalized_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS entities (
          entity_type TEXT NOT NULL,
          id INTEGER NOT NULL,
          record_json TEXT NOT NULL,
          version_no INTEGER NOT NULL,
          PRIMARY KEY(entity_type, id)
        );

        CREATE TABLE IF NOT EXISTS change_requests (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          status TEXT NOT NULL CHECK(status IN ('pending', 'accepted', 'rejected')),
          patch_json TEXT NOT NULL,
          target_type TEXT NOT NULL,
          target_id INTEGER,
          version_type TEXT NOT NULL,
          version_id INTEGER,
          raw_document_id INTEGER REFERENCES raw_documents(id),
          submitted_by INTEGER NOT NULL REFERENCES sources(id),
          submitted_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS entity_versions (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          entity_type TEXT NOT NULL,
          entity_id INTEGER NOT NULL,
          version_no INTEGER NOT NULL,
          record_json TEXT NOT NULL,
          change_request_id INTEGER NOT NULL REFERENCES change_requests(id),
          created_at_ms INTEGER NOT NULL,
          UNIQUE(entity_type, entity_id, version_no),
          FOREIGN KEY(entity_type, entity_id) REFERENCES entities(entity_type, id)
        );

        CREATE TABLE IF NOT EXISTS change_requirements (
          dependent_id INTEGER NOT NULL REFERENCES change_requests(id),
          prerequisite_id INTEGER NOT NULL REFERENCES change_requests(id),
          field TEXT NOT NULL,
          version_field TEXT NOT NULL,
          PRIMARY KEY(dependent_id, field),
          CHECK(dependent_id <> prerequisite_id)
        );

        CREATE INDEX IF NOT EXISTS idx_change_requests_status
          ON change_requests(status, id);

        CREATE INDEX IF NOT EXISTS idx_change_requirements_prerequisite
          ON change_requirements(prerequisite_id);

        CREATE INDEX IF NOT EXISTS idx_entity_versions_entity
          ON entity_versions(entity_type, entity_id, version_no);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES ('schema_version', ?1)",
        params![SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                || message.as_deref().is_some_and(|value| {
                    value.contains("UNIQUE constraint failed")
                        || value.contains("PRIMARY KEY constraint failed")
                })
        }
        _ => false,
    }
}

fn next_counter_tx(tx: &Transaction<'_>, name: &str) -> Result<i64, StoreError> {
    let current: i64 = tx
        .query_row(
            "SELECT value FROM counters WHERE name=?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);
    let next = current + 1;
    tx.execute(
        "INSERT INTO counters(name, value) VALUES (?1, ?2) \
         ON CONFLICT(name) DO UPDATE SET value=excluded.value",
        params![name, next],
    )?;
    Ok(next)
}

fn to_sqlite_i64(value: usize) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::InvalidInput("numeric overflow"))
}
