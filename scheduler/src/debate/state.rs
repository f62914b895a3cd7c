//! Run state machine: states, transitions, and the transition log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a debate run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Config is being edited; nothing has been said.
    Configuring,
    /// Turns are being scheduled.
    Running,
    /// No new turn starts until resumed.
    Paused,
    /// Waiting on the final analysis.
    Analyzing,
    /// Run complete; transcript and analysis are final.
    Finished,
    /// A turn failed; the partial transcript is kept.
    Error,
}

impl RunState {
    /// Whether the run has stopped producing turns for good.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Error)
    }

    /// Whether turns may still be added.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Valid transitions from this state.
    pub fn valid_transitions(self) -> &'static [RunState] {
        match self {
            Self::Configuring => &[Self::Running],
            Self::Running => &[Self::Paused, Self::Analyzing, Self::Error],
            Self::Paused => &[Self::Running, Self::Analyzing, Self::Error],
            Self::Analyzing => &[Self::Finished],
            Self::Finished | Self::Error => &[Self::Configuring],
        }
    }

    pub fn can_transition_to(self, to: RunState) -> bool {
        self.valid_transitions().contains(&to)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuring => write!(f, "configuring"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Analyzing => write!(f, "analyzing"),
            Self::Finished => write!(f, "finished"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A state transition record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTransition {
    pub from: RunState,
    pub to: RunState,
    pub timestamp: DateTime<Utc>,
    /// Why the transition happened.
    pub reason: String,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition {from} → {to}: {reason}")]
pub struct TransitionError {
    pub from: RunState,
    pub to: RunState,
    pub reason: String,
}

/// Current state plus the history of how it got there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMachine {
    state: RunState,
    transitions: Vec<RunTransition>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: RunState::Configuring,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn transitions(&self) -> &[RunTransition] {
        &self.transitions
    }

    /// Move to `to`, recording `reason`.
    pub fn transition(&mut self, to: RunState, reason: &str) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(to) {
            return Err(TransitionError {
                from: self.state,
                to,
                reason: format!(
                    "not a valid transition (allowed: {:?})",
                    self.state.valid_transitions()
                ),
            });
        }

        self.transitions.push(RunTransition {
            from: self.state,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        tracing::debug!(from = %self.state, to = %to, reason, "run transition");
        self.state = to;
        Ok(())
    }

    /// Rebuild a machine from saved parts without validation.
    pub(crate) fn restore(state: RunState, transitions: Vec<RunTransition>) -> Self {
        Self { state, transitions }
    }
}
