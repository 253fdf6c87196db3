use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;
use uuid::Uuid;

use super::{RecordStore, StoreError};
use crate::models::{Audience, EncryptedRecord};

/// Process-local store for tests and single-run CLI sessions.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<String, EncryptedRecord>>,
    summaries: RwLock<HashMap<(String, Audience), Value>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for InMemoryRecordStore {
    fn save(&self, record: &EncryptedRecord) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.records
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .insert(id.clone(), record.clone());
        Ok(id)
    }

    fn load(&self, id: &str) -> Result<EncryptedRecord, StoreError> {
        self.records
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn put_summary(&self, id: &str, audience: Audience, summary: &Value) -> Result<(), StoreError> {
        if !self
            .records
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .contains_key(id)
        {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.summaries
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .insert((id.to_string(), audience), summary.clone());
        Ok(())
    }

    fn get_summary(&self, id: &str, audience: Audience) -> Result<Option<Value>, StoreError> {
        Ok(self
            .summaries
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .get(&(id.to_string(), audience))
            .cloned())
    }

    fn records_for_session(&self, session_id: &str) -> Result<Vec<String>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        let mut matching: Vec<(&str, &String)> = records
            .iter()
            .filter(|(_, r)| r.session_id() == Some(session_id))
            .map(|(id, r)| (r.created_at().unwrap_or_default(), id))
            .collect();
        matching.sort();
        Ok(matching.into_iter().map(|(_, id)| id.clone()).collect())
    }
}
