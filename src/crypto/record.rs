//! Structural encryption of records.
//!
//! The walk is schema-independent: it dispatches only on JSON leaf kind.
//! Contract: a leaf is encrypted iff it is a string AND the nearest enclosing
//! field name is not in [`INDEX_FIELDS`]. Field names, numbers, booleans and
//! nulls always stay in cleartext. Strings inside arrays inherit the array's
//! field name. Decryption enforces the same predicate in reverse: a string that
//! should be a token but is not one is a malformed record, never passed through.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::encryption::FieldCipher;
use super::keys::RecordKey;
use super::CryptoError;
use crate::models::{EncryptedRecord, SymptomRecord};

/// String fields kept in cleartext so the record store can filter and sort on them.
pub const INDEX_FIELDS: &[&str] = &["session_id", "created_at", "frozen_at", "record_id"];

/// Field name used for strings that are not under any named field.
const ROOT_FIELD: &str = "$";

pub fn is_index_field(field: &str) -> bool {
    INDEX_FIELDS.contains(&field)
}

/// Encrypt every non-index string leaf of a JSON tree.
pub fn encrypt_value(value: &Value, key: &RecordKey) -> Result<Value, CryptoError> {
    walk(value, ROOT_FIELD, &key.cipher(), Direction::Encrypt)
}

/// Decrypt every non-index string leaf of a JSON tree.
pub fn decrypt_value(value: &Value, key: &RecordKey) -> Result<Value, CryptoError> {
    walk(value, ROOT_FIELD, &key.cipher(), Direction::Decrypt)
}

pub fn encrypt_record(record: &SymptomRecord, key: &RecordKey) -> Result<EncryptedRecord, CryptoError> {
    Ok(EncryptedRecord(encrypt_serializable(record, key)?))
}

pub fn decrypt_record(record: &EncryptedRecord, key: &RecordKey) -> Result<SymptomRecord, CryptoError> {
    decrypt_deserializable(record.as_value(), key)
}

/// Encrypt any serializable structure through the same tree walk.
pub fn encrypt_serializable<T: Serialize>(data: &T, key: &RecordKey) -> Result<Value, CryptoError> {
    let plain = serde_json::to_value(data).map_err(|e| CryptoError::Serialization(e.to_string()))?;
    encrypt_value(&plain, key)
}

pub fn decrypt_deserializable<T: DeserializeOwned>(value: &Value, key: &RecordKey) -> Result<T, CryptoError> {
    let plain = decrypt_value(value, key)?;
    serde_json::from_value(plain).map_err(|e| CryptoError::Serialization(e.to_string()))
}

#[derive(Clone, Copy)]
enum Direction {
    Encrypt,
    Decrypt,
}

fn walk(value: &Value, field: &str, cipher: &FieldCipher<'_>, dir: Direction) -> Result<Value, CryptoError> {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (name, child) in map {
                out.insert(name.clone(), walk(child, name, cipher, dir)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| walk(item, field, cipher, dir))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::String(s) if is_index_field(field) => Ok(Value::String(s.clone())),
        Value::String(s) => match dir {
            Direction::Encrypt => cipher.encrypt_field(field, s).map(Value::String),
            Direction::Decrypt => cipher.decrypt_field(field, s).map(Value::String),
        },
        Value::Number(_) | Value::Bool(_) | Value::Null => Ok(value.clone()),
    }
}
