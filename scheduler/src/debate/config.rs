//! Debate configuration, presets, and start-time validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::participant::{ModelProvider, Roster, RosterError, Seat};

/// How long each utterance should be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseLength {
    Brief,
    #[default]
    Standard,
    Detailed,
}

impl ResponseLength {
    /// Paragraph guidance handed to the model.
    pub fn guidance(self) -> &'static str {
        match self {
            Self::Brief => "one short paragraph",
            Self::Standard => "two to three paragraphs",
            Self::Detailed => "four to five well-developed paragraphs",
        }
    }
}

/// Depth of argumentation expected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Casual,
    #[default]
    Academic,
    Expert,
}

impl Quality {
    pub fn guidance(self) -> &'static str {
        match self {
            Self::Casual => "plain language an interested newcomer can follow",
            Self::Academic => "structured reasoning with cited evidence where possible",
            Self::Expert => "specialist depth, precise terminology, and rigorous evidence",
        }
    }
}

/// Register of the exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Formal,
    Conversational,
    Heated,
}

impl Tone {
    pub fn guidance(self) -> &'static str {
        match self {
            Self::Formal => "formal and courteous",
            Self::Conversational => "relaxed and conversational",
            Self::Heated => "passionate and combative while staying civil",
        }
    }
}

/// Error from validating a [`DebateConfig`] before a run starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("a debate topic is required")]
    EmptyTopic,

    #[error("invalid roster: {0}")]
    Roster(#[from] RosterError),

    #[error("turn limit must be at least 1")]
    InvalidTurnLimit,

    #[error("turn limit {0} exceeds the maximum of {max}", max = MAX_TURN_LIMIT)]
    TurnLimitTooHigh(u32),

    #[error("starter {0} is not in the speaking order")]
    StarterNotInOrder(Seat),

    #[error("no model registered for provider {0}")]
    ProviderUnavailable(ModelProvider),
}

/// Default utterances per non-moderator seat.
pub const DEFAULT_TURN_LIMIT: u32 = 2;

/// Largest accepted turn limit per seat.
pub const MAX_TURN_LIMIT: u32 = 100;

/// Configuration for a single debate run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateConfig {
    /// Motion or question under debate.
    pub topic: String,
    /// Optional points the debaters should address.
    #[serde(default)]
    pub focus_points: Vec<String>,
    /// Participants in configuration order.
    pub roster: Roster,
    /// Seat that speaks after each moderator turn.
    #[serde(default = "default_starter")]
    pub starter: Seat,
    /// Maximum utterances per non-moderator seat.
    #[serde(default = "default_turn_limit")]
    pub turn_limit: u32,
    #[serde(default)]
    pub length: ResponseLength,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub tone: Tone,
    /// Provider for the final analysis; the moderator's when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_provider: Option<ModelProvider>,
}

fn default_starter() -> Seat {
    Seat::Proponent
}

fn default_turn_limit() -> u32 {
    DEFAULT_TURN_LIMIT
}

impl DebateConfig {
    pub fn new(topic: &str, roster: Roster) -> Self {
        Self {
            topic: topic.to_string(),
            focus_points: Vec::new(),
            roster,
            starter: default_starter(),
            turn_limit: DEFAULT_TURN_LIMIT,
            length: ResponseLength::default(),
            quality: Quality::default(),
            tone: Tone::default(),
            analysis_provider: None,
        }
    }

    pub fn with_turn_limit(mut self, turn_limit: u32) -> Self {
        self.turn_limit = turn_limit;
        self
    }

    pub fn with_starter(mut self, starter: Seat) -> Self {
        self.starter = starter;
        self
    }

    pub fn with_focus_points(mut self, points: Vec<String>) -> Self {
        self.focus_points = points;
        self
    }

    /// Cyclic order of non-moderator seats: proponent, opponent, then
    /// each neutral in configuration order.
    pub fn speaking_order(&self) -> Vec<Seat> {
        let mut order = vec![Seat::Proponent, Seat::Opponent];
        order.extend(self.roster.neutral_seats());
        order
    }

    /// Total non-moderator utterances in a run that is not ended early.
    pub fn debater_turn_budget(&self) -> u64 {
        (self.speaking_order().len() as u64).saturating_mul(u64::from(self.turn_limit))
    }

    /// Provider used for the end-of-run analysis.
    pub fn analysis_provider(&self) -> Option<ModelProvider> {
        self.analysis_provider
            .or_else(|| self.roster.moderator().map(|m| m.provider))
    }

    /// Check everything that can be checked without the model registry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topic.trim().is_empty() {
            return Err(ConfigError::EmptyTopic);
        }
        // One proponent plus one opponent also guarantees two debaters.
        self.roster.validate()?;
        if self.turn_limit == 0 {
            return Err(ConfigError::InvalidTurnLimit);
        }
        if self.turn_limit > MAX_TURN_LIMIT {
            return Err(ConfigError::TurnLimitTooHigh(self.turn_limit));
        }
        if !self.speaking_order().contains(&self.starter) {
            return Err(ConfigError::StarterNotInOrder(self.starter));
        }
        Ok(())
    }

    /// Compact status line.
    pub fn summary_line(&self) -> String {
        format!(
            "\"{}\" | {} participants | {} turns per seat | starter={}",
            self.topic,
            self.roster.len(),
            self.turn_limit,
            self.starter
        )
    }
}
