//! Debate Scheduling — Moderated Multi-Party Turn Loop
//!
//! Decides who speaks next in a moderated debate, records what they said,
//! and carries the run from configuration through to a scored analysis.
//!
//! # Run Flow
//!
//! ```text
//! Configuring → Running ⇄ Paused
//!                  │        │
//!                  │        ├─ end now ──────┐
//!                  ├─ no speaker left ───────┤
//!                  │                         ▼
//!                  │                     Analyzing → Finished
//!                  └─ model failure → Error
//!
//! Finished / Error → reset → Configuring
//! ```
//!
//! # Speaking Order
//!
//! ```text
//! moderator (opening)
//!   → starter → next seat with turns left → ... (cyclic)
//!   → moderator (closing, once every debater has used its turns)
//! ```

pub mod config;
pub mod error;
pub mod model;
pub mod participant;
pub mod persistence;
pub mod run;
pub mod scheduler;
pub mod state;
pub mod transcript;
pub mod turns;

pub use config::{
    ConfigError, DebateConfig, Quality, ResponseLength, Tone, DEFAULT_TURN_LIMIT, MAX_TURN_LIMIT,
};
pub use error::SchedulerError;
pub use model::{
    AnalysisRequest, DebateModel, FinalAnalysis, ModelError, ModelRegistry, ParticipantMetrics,
    ScriptedModel, UtteranceCall, UtteranceRequest,
};
pub use participant::{ModelProvider, Participant, Role, Roster, RosterError, Seat, MAX_NEUTRALS};
pub use persistence::{validate_snapshot, IntegrityStatus, RunSnapshot, SnapshotError};
pub use run::{AnalysisOutcome, DebateRun};
pub use scheduler::{
    ControlSignal, DebateScheduler, RunControl, RunReport, StepOutcome, TurnObserver,
};
pub use state::{RunState, RunTransition, StateMachine, TransitionError};
pub use transcript::{ModeratorStage, Transcript, TranscriptEntry, TurnCounter, TurnKind};
pub use turns::{debaters_exhausted, next_speaker, plan_turn, TurnPlan};
