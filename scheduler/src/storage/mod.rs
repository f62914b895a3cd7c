//! Storage port — the get/set/append interface every persisted piece of
//! user state goes through, plus an in-memory implementation.
//!
//! # Modules
//!
//! - [`history`] — capped log of finished debates
//! - [`settings`] — persisted user defaults

pub mod history;
pub mod settings;

pub use history::{HistoryLog, HistoryPayload, HistoryRecord, DEFAULT_HISTORY_CAP, HISTORY_KEY};
pub use settings::{Settings, SettingsStore, SETTINGS_KEY};

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use thiserror::Error;

/// Errors from a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("value under {key} is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    #[error("storage lock poisoned")]
    Poisoned,
}

/// Key-value storage of JSON documents.
pub trait StoragePort: Send + Sync {
    /// Read the value under `key`.
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Replace the value under `key`.
    fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Push `value` onto the array under `key`, creating it if absent.
    /// Returns the new array length.
    fn append(&self, key: &str, value: Value) -> Result<usize, StorageError> {
        let mut items = match self.get(key)? {
            None => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(StorageError::TypeMismatch {
                    key: key.to_string(),
                    expected: "array",
                })
            }
        };
        items.push(value);
        let len = items.len();
        self.set(key, Value::Array(items))?;
        Ok(len)
    }
}

/// Volatile storage backed by a map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoragePort for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        values.insert(key.to_string(), value);
        Ok(())
    }

    fn append(&self, key: &str, value: Value) -> Result<usize, StorageError> {
        let mut values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        let slot = values
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        match slot {
            Value::Array(items) => {
                items.push(value);
                Ok(items.len())
            }
            _ => Err(StorageError::TypeMismatch {
                key: key.to_string(),
                expected: "array",
            }),
        }
    }
}
