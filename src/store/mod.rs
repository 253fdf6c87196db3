//! Record store: persists encrypted records and their summary slots.
//!
//! Stores only ever see ciphertext trees. Summaries are kept one per
//! (record, audience); writing a slot replaces whatever was there.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryRecordStore;
pub use sqlite::SqliteRecordStore;

use serde_json::Value;
use thiserror::Error;

use crate::models::{Audience, EncryptedRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored body is not valid JSON: {0}")]
    Serialization(String),

    #[error("Record store lock poisoned")]
    Poisoned,
}

pub trait RecordStore: Send + Sync {
    /// Persist a record and return its new identifier.
    fn save(&self, record: &EncryptedRecord) -> Result<String, StoreError>;

    fn load(&self, id: &str) -> Result<EncryptedRecord, StoreError>;

    /// Write the summary slot for `audience`, replacing any previous one.
    fn put_summary(&self, id: &str, audience: Audience, summary: &Value) -> Result<(), StoreError>;

    fn get_summary(&self, id: &str, audience: Audience) -> Result<Option<Value>, StoreError>;

    /// Ids of records persisted for a session, oldest first.
    fn records_for_session(&self, session_id: &str) -> Result<Vec<String>, StoreError>;
}
