//! Scheduler error taxonomy.
//!
//! | Variant      | When                                   | Run afterwards |
//! |--------------|----------------------------------------|----------------|
//! | `Config`     | validation before start                | configuring    |
//! | `Generation` | a model failed to produce an utterance | error          |
//! | `Cancelled`  | the run's token fired mid-call         | unchanged      |
//! | `Transition` | an operation the state does not allow  | unchanged      |
//!
//! Analysis failures are not errors here: the run still finishes and the
//! failure is recorded as [`AnalysisOutcome::Failed`](super::AnalysisOutcome).

use thiserror::Error;

use super::config::ConfigError;
use super::model::ModelError;
use super::participant::Seat;
use super::state::{RunState, TransitionError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("{speaker} ({seat}) could not respond on turn {turn}: {source}")]
    Generation {
        seat: Seat,
        speaker: String,
        turn: u32,
        source: ModelError,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error("run is {actual}, expected {expected}")]
    WrongState {
        actual: RunState,
        expected: &'static str,
    },

    #[error("a turn is already awaiting its speaker")]
    TurnInFlight,

    #[error("no turn is awaiting a speaker")]
    NoTurnInFlight,
}

impl SchedulerError {
    /// Whether the run moved to `error` because of this failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Generation { .. })
    }
}
