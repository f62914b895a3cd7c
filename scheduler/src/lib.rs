//! Debate Scheduler Library
//!
//! This library provides:
//! - A turn scheduler for moderated debates between model-backed participants
//! - Run lifecycle management with pause, resume, end-now, and cancellation
//! - Checkpoint snapshots with integrity validation
//! - A key/value storage port with debate history and user settings on top
//!
//! Provider clients and the command-line front end live in `debate-agents`.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use debate_scheduler::{
//!     DebateConfig, DebateScheduler, ModelProvider, ModelRegistry, Participant, Role, Roster,
//!     ScriptedModel,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let roster = Roster::from_participants(vec![
//!     Participant::new("m", Role::Moderator, "Moderator", ModelProvider::Gemini),
//!     Participant::new("p", Role::Proponent, "Ada", ModelProvider::Gemini),
//!     Participant::new("o", Role::Opponent, "Brook", ModelProvider::Gemini),
//! ])?;
//! let config = DebateConfig::new("Should cities ban cars?", roster);
//!
//! let models = ModelRegistry::new().with(Arc::new(ScriptedModel::new(ModelProvider::Gemini)));
//! let mut scheduler = DebateScheduler::new(models);
//! scheduler.start(config)?;
//! let report = scheduler.run_to_completion().await?;
//! println!("{}", report.summary_line());
//! # Ok(())
//! # }
//! ```

pub mod debate;
pub mod storage;

pub use debate::{
    AnalysisOutcome, DebateConfig, DebateModel, DebateRun, DebateScheduler, FinalAnalysis,
    ModelError, ModelProvider, ModelRegistry, Participant, Role, Roster, RunControl, RunReport,
    RunSnapshot, RunState, SchedulerError, ScriptedModel, Seat, Transcript, TranscriptEntry,
};
pub use storage::{
    HistoryLog, HistoryRecord, MemoryStore, Settings, SettingsStore, StorageError, StoragePort,
};
