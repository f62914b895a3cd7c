//! Capped, timestamp-ordered log of finished debates.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{StorageError, StoragePort};
use crate::debate::{DebateConfig, FinalAnalysis, Transcript};

/// Storage key for the history log.
pub const HISTORY_KEY: &str = "debate_history";

/// Entries kept before the oldest is evicted.
pub const DEFAULT_HISTORY_CAP: usize = 100;

/// Full record of a finished debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPayload {
    pub config: DebateConfig,
    pub transcript: Transcript,
    pub analysis: FinalAnalysis,
}

/// One history log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    /// Record type, always `"debate"` for records written here.
    pub kind: String,
    pub topic: String,
    pub timestamp: DateTime<Utc>,
    /// One-line result summary.
    pub summary: String,
    pub payload: HistoryPayload,
}

impl HistoryRecord {
    pub fn new(config: &DebateConfig, transcript: &Transcript, analysis: &FinalAnalysis) -> Self {
        let summary = match &analysis.winner {
            Some(winner) => format!("Winner: {} | {}", winner, analysis.summary_line()),
            None => analysis.summary_line(),
        };
        Self {
            id: Uuid::new_v4(),
            kind: "debate".to_string(),
            topic: config.topic.clone(),
            timestamp: Utc::now(),
            summary,
            payload: HistoryPayload {
                config: config.clone(),
                transcript: transcript.clone(),
                analysis: analysis.clone(),
            },
        }
    }

    /// Compact listing line.
    pub fn list_line(&self) -> String {
        format!(
            "{} | {} | {} | {}",
            self.id,
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.topic,
            self.summary
        )
    }
}

/// History log over a storage port.
#[derive(Clone)]
pub struct HistoryLog {
    store: Arc<dyn StoragePort>,
    key: String,
    cap: usize,
}

impl HistoryLog {
    pub fn new(store: Arc<dyn StoragePort>) -> Self {
        Self::with_cap(store, DEFAULT_HISTORY_CAP)
    }

    pub fn with_cap(store: Arc<dyn StoragePort>, cap: usize) -> Self {
        Self {
            store,
            key: HISTORY_KEY.to_string(),
            cap: cap.max(1),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Append a record, evicting the oldest entries beyond the cap.
    pub fn append(&self, record: &HistoryRecord) -> Result<(), StorageError> {
        let value = serde_json::to_value(record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let len = self.store.append(&self.key, value)?;

        if len > self.cap {
            let mut raw = self.raw()?;
            let excess = raw.len().saturating_sub(self.cap);
            raw.drain(..excess);
            self.store.set(&self.key, serde_json::Value::Array(raw))?;
            debug!(evicted = excess, cap = self.cap, "history log trimmed");
        }
        Ok(())
    }

    /// All records, oldest first. Entries that fail to parse are skipped.
    pub fn list(&self) -> Result<Vec<HistoryRecord>, StorageError> {
        let records = self
            .raw()?
            .into_iter()
            .filter_map(|value| match serde_json::from_value(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable history entry");
                    None
                }
            })
            .collect();
        Ok(records)
    }

    /// The `n` most recent records, newest first.
    pub fn recent(&self, n: usize) -> Result<Vec<HistoryRecord>, StorageError> {
        let mut records = self.list()?;
        records.reverse();
        records.truncate(n);
        Ok(records)
    }

    pub fn get(&self, id: Uuid) -> Result<Option<HistoryRecord>, StorageError> {
        Ok(self.list()?.into_iter().find(|r| r.id == id))
    }

    /// Remove one record. Returns whether it existed.
    pub fn remove(&self, id: Uuid) -> Result<bool, StorageError> {
        let records = self.list()?;
        let before = records.len();
        let kept: Vec<HistoryRecord> = records.into_iter().filter(|r| r.id != id).collect();
        if kept.len() == before {
            return Ok(false);
        }
        let value = serde_json::to_value(&kept)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.store.set(&self.key, value)?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.store.set(&self.key, serde_json::Value::Array(Vec::new()))
    }

    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.raw()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    fn raw(&self) -> Result<Vec<serde_json::Value>, StorageError> {
        match self.store.get(&self.key)? {
            None => Ok(Vec::new()),
            Some(serde_json::Value::Array(items)) => Ok(items),
            Some(_) => Err(StorageError::TypeMismatch {
                key: self.key.clone(),
                expected: "array",
            }),
        }
    }
}
