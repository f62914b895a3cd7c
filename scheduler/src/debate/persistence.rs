//! Run snapshots — save and restore an interrupted debate.
//!
//! A snapshot captures the config, state, transition log, transcript, and
//! analysis as versioned JSON. Restoring validates integrity so a hand-edited
//! or truncated file cannot produce a run whose counters disagree with its
//! transcript.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::DebateConfig;
use super::run::{AnalysisOutcome, DebateRun};
use super::state::{RunState, RunTransition, StateMachine};
use super::transcript::{Transcript, TurnCounter, TurnKind};

/// Serialized form of a [`DebateRun`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// Schema version for forward compatibility.
    pub version: u32,
    pub config: Option<DebateConfig>,
    pub state: RunState,
    pub transitions: Vec<RunTransition>,
    pub transcript: Transcript,
    pub analysis: Option<AnalysisOutcome>,
    pub last_error: Option<String>,
    pub taken_at: DateTime<Utc>,
}

impl RunSnapshot {
    /// Current schema version.
    pub const CURRENT_VERSION: u32 = 1;

    pub fn capture(run: &DebateRun) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            config: run.last_config().cloned(),
            state: run.state(),
            transitions: run.transitions().to_vec(),
            transcript: run.transcript().clone(),
            analysis: run.analysis().cloned(),
            last_error: run.last_error().map(str::to_string),
            taken_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string_pretty(self).map_err(|e| SnapshotError::SerializeFailed {
            reason: e.to_string(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| SnapshotError::DeserializeFailed {
                reason: e.to_string(),
            })?;

        if snapshot.version > Self::CURRENT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                expected: Self::CURRENT_VERSION,
                found: snapshot.version,
            });
        }

        Ok(snapshot)
    }

    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| SnapshotError::Io {
            reason: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let json = std::fs::read_to_string(path).map_err(|e| SnapshotError::Io {
            reason: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    /// Validate and rebuild the run.
    ///
    /// A snapshot taken while `running` comes back `paused` so nothing
    /// speaks until the caller resumes.
    pub fn restore(self) -> Result<(DebateRun, IntegrityStatus), SnapshotError> {
        let status = validate_snapshot(&self);
        if let IntegrityStatus::Corrupted { errors } = &status {
            return Err(SnapshotError::IntegrityCheckFailed {
                reason: errors.join("; "),
            });
        }

        let machine = StateMachine::restore(self.state, self.transitions);
        let mut run = DebateRun::from_parts(
            self.config,
            machine,
            self.transcript,
            self.analysis,
            self.last_error,
        );
        if run.state() == RunState::Running {
            run.machine_mut()
                .transition(RunState::Paused, "restored from snapshot")
                .map_err(|e| SnapshotError::IntegrityCheckFailed {
                    reason: e.to_string(),
                })?;
        }
        Ok((run, status))
    }
}

/// Error during snapshot operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("serialize failed: {reason}")]
    SerializeFailed { reason: String },

    #[error("deserialize failed: {reason}")]
    DeserializeFailed { reason: String },

    #[error("version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("integrity check failed: {reason}")]
    IntegrityCheckFailed { reason: String },

    #[error("snapshot I/O failed: {reason}")]
    Io { reason: String },
}

/// Integrity check result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityStatus {
    /// Snapshot is valid and can be resumed.
    Valid,
    /// Snapshot has minor issues but is recoverable.
    Recoverable { warnings: Vec<String> },
    /// Snapshot is corrupted and cannot be used.
    Corrupted { errors: Vec<String> },
}

impl IntegrityStatus {
    /// Whether resume is safe.
    pub fn can_resume(&self) -> bool {
        matches!(self, Self::Valid | Self::Recoverable { .. })
    }
}

/// Validate a snapshot before restoring it.
pub fn validate_snapshot(snapshot: &RunSnapshot) -> IntegrityStatus {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    if snapshot.version > RunSnapshot::CURRENT_VERSION {
        errors.push(format!(
            "version {} > current {}",
            snapshot.version,
            RunSnapshot::CURRENT_VERSION
        ));
    }

    match &snapshot.config {
        None if snapshot.state != RunState::Configuring => {
            errors.push(format!("state {} without a config", snapshot.state));
        }
        Some(config) => {
            let counter = TurnCounter::from_transcript(&snapshot.transcript);
            for (seat, count) in counter.iter() {
                if !seat.is_moderator() && count > config.turn_limit {
                    errors.push(format!(
                        "{} spoke {} times, limit {}",
                        seat, count, config.turn_limit
                    ));
                }
                if seat.is_moderator() && count > 2 {
                    errors.push(format!("moderator spoke {} times", count));
                }
            }
        }
        None => {}
    }

    // Per-seat turn numbers must run 1, 2, 3... in transcript order.
    let mut seen = TurnCounter::new();
    let mut closed = false;
    for (i, entry) in snapshot.transcript.entries().iter().enumerate() {
        let expected = seen.increment(entry.seat);
        if entry.turn != expected {
            errors.push(format!(
                "entry {} for {} has turn {}, expected {}",
                i, entry.seat, entry.turn, expected
            ));
        }
        if !entry.seat.is_moderator() && entry.kind != TurnKind::Argument {
            errors.push(format!("entry {} for {} is a {}", i, entry.seat, entry.kind));
        }
        if entry.seat.is_moderator() && entry.kind == TurnKind::Argument {
            warnings.push(format!("entry {} is a mid-debate moderator turn", i));
        }
        if closed {
            errors.push(format!("entry {} follows the closing statement", i));
        }
        closed |= entry.kind == TurnKind::Closing;
    }

    if let Some(first) = snapshot.transcript.entries().first() {
        if first.kind != TurnKind::Opening {
            errors.push(format!("transcript opens with {} instead of opening", first.kind));
        }
    }

    if let Some(last) = snapshot.transitions.last() {
        if last.to != snapshot.state {
            errors.push(format!(
                "last transition target {} doesn't match state {}",
                last.to, snapshot.state
            ));
        }
    } else if snapshot.state != RunState::Configuring {
        errors.push(format!("state {} with no transition history", snapshot.state));
    }

    if snapshot.state == RunState::Finished && snapshot.analysis.is_none() {
        warnings.push("finished run has no analysis".to_string());
    }

    if !errors.is_empty() {
        IntegrityStatus::Corrupted { errors }
    } else if !warnings.is_empty() {
        IntegrityStatus::Recoverable { warnings }
    } else {
        IntegrityStatus::Valid
    }
}
