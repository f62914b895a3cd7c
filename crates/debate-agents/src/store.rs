//! JSON file implementation of the storage port.
//!
//! The whole store is one JSON object on disk. Every write rewrites the
//! file through a temporary sibling and a rename, so a crash mid-write
//! leaves the previous contents intact.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use debate_scheduler::storage::{StorageError, StoragePort};
use serde_json::{Map, Value};
use tracing::debug;

pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>, StorageError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(StorageError::Io(format!("{}: {e}", self.path.display()))),
        };
        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(StorageError::Serialization(format!(
                "{} does not hold a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(StorageError::Serialization(e.to_string())),
        }
    }

    fn write_all(&self, map: Map<String, Value>) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(&Value::Object(map))
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| StorageError::Io(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| StorageError::Io(e.to_string()))?;
        debug!(path = %self.path.display(), "store written");
        Ok(())
    }
}

impl StoragePort for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut map = self.read_all()?;
        map.insert(key.to_string(), value);
        self.write_all(map)
    }

    fn append(&self, key: &str, value: Value) -> Result<usize, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut map = self.read_all()?;
        let slot = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        let len = match slot {
            Value::Array(items) => {
                items.push(value);
                items.len()
            }
            _ => {
                return Err(StorageError::TypeMismatch {
                    key: key.to_string(),
                    expected: "array",
                })
            }
        };
        self.write_all(map)?;
        Ok(len)
    }
}
