use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use uuid::Uuid;

use super::{RecordStore, StoreError};
use crate::models::{Audience, EncryptedRecord};

/// SQLite-backed store. The encrypted tree is stored as JSON text next to
/// index columns copied from its cleartext leaves.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        configure_pragmas(&conn)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn configure_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

/// Run all pending migrations
fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![(
        1,
        include_str!("../../resources/migrations/001_records.sql"),
    )];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running record store migration v{version}");
            conn.execute_batch(sql).map_err(|e| StoreError::MigrationFailed {
                version,
                reason: e.to_string(),
            })?;
        }
    }

    Ok(())
}

/// Current schema version (0 if no schema exists yet)
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })
    .unwrap_or(0)
}

fn parse_body(body: &str) -> Result<Value, StoreError> {
    serde_json::from_str(body).map_err(|e| StoreError::Serialization(e.to_string()))
}

impl RecordStore for SqliteRecordStore {
    fn save(&self, record: &EncryptedRecord) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let body = serde_json::to_string(record.as_value())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.conn()?.execute(
            "INSERT INTO records (id, session_id, symptom_count, completeness, created_at, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                record.session_id(),
                record.symptom_count() as i64,
                record.completeness(),
                record.created_at(),
                body,
            ],
        )?;
        tracing::debug!(record_id = %id, symptoms = record.symptom_count(), "Stored encrypted record");
        Ok(id)
    }

    fn load(&self, id: &str) -> Result<EncryptedRecord, StoreError> {
        let body: Option<String> = self
            .conn()?
            .query_row("SELECT body FROM records WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        match body {
            Some(body) => Ok(EncryptedRecord(parse_body(&body)?)),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    fn put_summary(&self, id: &str, audience: Audience, summary: &Value) -> Result<(), StoreError> {
        let body =
            serde_json::to_string(summary).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM records WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::NotFound(id.to_string()));
        }
        conn.execute(
            "INSERT INTO summaries (record_id, audience, body, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(record_id, audience) DO UPDATE SET
               body = excluded.body,
               updated_at = excluded.updated_at",
            params![id, audience.as_str(), body],
        )?;
        Ok(())
    }

    fn get_summary(&self, id: &str, audience: Audience) -> Result<Option<Value>, StoreError> {
        let body: Option<String> = self
            .conn()?
            .query_row(
                "SELECT body FROM summaries WHERE record_id = ?1 AND audience = ?2",
                params![id, audience.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        body.as_deref().map(parse_body).transpose()
    }

    /// Served from the session index column; bodies are never read.
    fn records_for_session(&self, session_id: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM records WHERE session_id = ?1 ORDER BY created_at, stored_at",
        )?;
        let ids = stmt
            .query_map(params![session_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(session: &str, created_at: &str) -> EncryptedRecord {
        EncryptedRecord(json!({
            "symptoms": [{"id": "enc:v1:aa:bb"}, {"id": "enc:v1:aa:cc"}],
            "metadata": {
                "session_id": session,
                "created_at": created_at,
                "completeness": 0.75,
                "frozen": true
            }
        }))
    }

    #[test]
    fn schema_version_is_current() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let conn = store.conn().unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn migration_idempotent() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let conn = store.conn().unwrap();
        assert!(run_migrations(&conn).is_ok());
    }

    #[test]
    fn save_and_load_preserve_tree() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let original = record("s-1", "2026-05-04T12:00:00Z");
        let id = store.save(&original).unwrap();
        assert_eq!(store.load(&id).unwrap(), original);
    }

    #[test]
    fn index_columns_are_populated() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let id = store.save(&record("s-1", "2026-05-04T12:00:00Z")).unwrap();
        let conn = store.conn().unwrap();
        let (count, completeness): (i64, f64) = conn
            .query_row(
                "SELECT symptom_count, completeness FROM records WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(count, 2);
        assert!((completeness - 0.75).abs() < 1e-9);
    }

    #[test]
    fn records_for_session_are_ordered() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let later = store.save(&record("s-1", "2026-05-05T12:00:00Z")).unwrap();
        let earlier = store.save(&record("s-1", "2026-05-04T12:00:00Z")).unwrap();
        store.save(&record("s-2", "2026-05-04T12:00:00Z")).unwrap();
        assert_eq!(store.records_for_session("s-1").unwrap(), vec![earlier, later]);
    }

    #[test]
    fn load_unknown_is_not_found() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        assert!(matches!(store.load("missing"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn summary_slot_replaced_not_appended() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let id = store.save(&record("s-1", "2026-05-04T12:00:00Z")).unwrap();
        store.put_summary(&id, Audience::Doctor, &json!({"n": 1})).unwrap();
        store.put_summary(&id, Audience::Doctor, &json!({"n": 2})).unwrap();
        assert_eq!(store.get_summary(&id, Audience::Doctor).unwrap(), Some(json!({"n": 2})));

        let conn = store.conn().unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM summaries WHERE record_id = ?1", params![id], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn summary_for_unknown_record_is_rejected() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let err = store.put_summary("nope", Audience::Patient, &json!({})).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.db");
        let id = {
            let store = SqliteRecordStore::open(&path).unwrap();
            store.save(&record("s-1", "2026-05-04T12:00:00Z")).unwrap()
        };
        let reopened = SqliteRecordStore::open(&path).unwrap();
        assert_eq!(reopened.load(&id).unwrap(), record("s-1", "2026-05-04T12:00:00Z"));
    }
}
