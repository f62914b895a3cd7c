//! Participants, roles, seats, and roster editing rules.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role a participant plays in the debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Opens and closes the debate.
    Moderator,
    /// Argues for the motion.
    Proponent,
    /// Argues against the motion.
    Opponent,
    /// Weighs both sides without taking one.
    Neutral,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Moderator => write!(f, "moderator"),
            Self::Proponent => write!(f, "proponent"),
            Self::Opponent => write!(f, "opponent"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// The identity turns are counted against.
///
/// Proponents share one seat and opponents share one seat. Every neutral
/// participant gets its own seat, numbered by its position among the
/// neutrals in configuration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    Moderator,
    Proponent,
    Opponent,
    Neutral(u16),
}

impl Seat {
    /// The role behind this seat.
    pub fn role(self) -> Role {
        match self {
            Self::Moderator => Role::Moderator,
            Self::Proponent => Role::Proponent,
            Self::Opponent => Role::Opponent,
            Self::Neutral(_) => Role::Neutral,
        }
    }

    pub fn is_moderator(self) -> bool {
        self == Self::Moderator
    }
}

impl std::fmt::Display for Seat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Moderator => write!(f, "moderator"),
            Self::Proponent => write!(f, "proponent"),
            Self::Opponent => write!(f, "opponent"),
            Self::Neutral(n) => write!(f, "neutral-{}", u32::from(*n) + 1),
        }
    }
}

impl std::str::FromStr for Seat {
    type Err = String;

    /// Parses the display form: `moderator`, `proponent`, `opponent`,
    /// or `neutral-N` with `N` starting at 1.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "moderator" => Ok(Self::Moderator),
            "proponent" => Ok(Self::Proponent),
            "opponent" => Ok(Self::Opponent),
            other => other
                .strip_prefix("neutral-")
                .and_then(|n| n.parse::<u32>().ok())
                .and_then(|n| n.checked_sub(1))
                .and_then(|n| u16::try_from(n).ok())
                .map(Self::Neutral)
                .ok_or_else(|| format!("unknown seat: {other}")),
        }
    }
}

/// Which model backend speaks for a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelProvider {
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
}

impl ModelProvider {
    pub const ALL: [ModelProvider; 3] = [Self::Gemini, Self::OpenAi, Self::Anthropic];
}

impl std::fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::OpenAi => write!(f, "openai"),
            Self::Anthropic => write!(f, "anthropic"),
        }
    }
}

impl std::str::FromStr for ModelProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" | "gpt" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(format!("unknown model provider: {other}")),
        }
    }
}

/// A configured debate participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Unique identifier within the roster.
    pub id: String,
    /// Role in the debate.
    pub role: Role,
    /// Name shown in the transcript.
    pub name: String,
    /// Backend that generates this participant's utterances.
    pub provider: ModelProvider,
    /// Optional persona or stance notes fed into the prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
}

impl Participant {
    pub fn new(id: &str, role: Role, name: &str, provider: ModelProvider) -> Self {
        Self {
            id: id.to_string(),
            role,
            name: name.to_string(),
            provider,
            persona: None,
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }
}

/// Error from editing or validating a roster.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    #[error("the moderator cannot be removed")]
    ModeratorRemoval,

    #[error("removing {0} would leave fewer than two debaters")]
    TooFewDebaters(String),

    #[error("removing {id} would leave no {role}")]
    RoleVacated { id: String, role: Role },

    #[error("no participant with id {0}")]
    UnknownParticipant(String),

    #[error("participant id {0} is already taken")]
    DuplicateId(String),

    #[error("a roster needs exactly one moderator, found {0}")]
    ModeratorCount(usize),

    #[error("a roster needs at least one {0}")]
    MissingRole(Role),

    #[error("a roster allows at most {max} neutrals, found {0}", max = MAX_NEUTRALS)]
    TooManyNeutrals(usize),
}

/// Largest number of neutral participants a roster may hold.
pub const MAX_NEUTRALS: usize = 64;

/// Ordered list of participants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    participants: Vec<Participant>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a roster from participants, checking only id uniqueness.
    ///
    /// Role composition is checked by [`Roster::validate`] so a roster can
    /// be assembled incrementally.
    pub fn from_participants(participants: Vec<Participant>) -> Result<Self, RosterError> {
        let mut roster = Self::new();
        for p in participants {
            roster.add(p)?;
        }
        Ok(roster)
    }

    pub fn add(&mut self, participant: Participant) -> Result<(), RosterError> {
        if self.get(&participant.id).is_some() {
            return Err(RosterError::DuplicateId(participant.id));
        }
        self.participants.push(participant);
        Ok(())
    }

    /// Remove a participant, enforcing the roster rules.
    pub fn remove(&mut self, id: &str) -> Result<Participant, RosterError> {
        let index = self
            .participants
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| RosterError::UnknownParticipant(id.to_string()))?;
        let target = &self.participants[index];

        if target.role == Role::Moderator {
            return Err(RosterError::ModeratorRemoval);
        }
        if self.debaters().count() <= 2 {
            return Err(RosterError::TooFewDebaters(id.to_string()));
        }
        if matches!(target.role, Role::Proponent | Role::Opponent)
            && self.members(target.role).len() == 1
        {
            return Err(RosterError::RoleVacated {
                id: id.to_string(),
                role: target.role,
            });
        }

        Ok(self.participants.remove(index))
    }

    /// Check the composition rules: one moderator, at least one proponent
    /// and one opponent, at most [`MAX_NEUTRALS`] neutrals.
    pub fn validate(&self) -> Result<(), RosterError> {
        let moderators = self.members(Role::Moderator).len();
        if moderators != 1 {
            return Err(RosterError::ModeratorCount(moderators));
        }
        for role in [Role::Proponent, Role::Opponent] {
            if self.members(role).is_empty() {
                return Err(RosterError::MissingRole(role));
            }
        }
        let neutrals = self.members(Role::Neutral).len();
        if neutrals > MAX_NEUTRALS {
            return Err(RosterError::TooManyNeutrals(neutrals));
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn moderator(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.role == Role::Moderator)
    }

    /// Participants with the given role, in configuration order.
    pub fn members(&self, role: Role) -> Vec<&Participant> {
        self.participants.iter().filter(|p| p.role == role).collect()
    }

    /// Every non-moderator participant.
    pub fn debaters(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.role != Role::Moderator)
    }

    /// Neutral seats in configuration order. Neutrals beyond the seat
    /// range get no seat; `validate` rejects such rosters.
    pub fn neutral_seats(&self) -> Vec<Seat> {
        (0..self.members(Role::Neutral).len())
            .map_while(|n| u16::try_from(n).ok().map(Seat::Neutral))
            .collect()
    }

    /// The participant speaking for `seat` on its `turn`-th utterance.
    ///
    /// Seats shared by several participants rotate through them in
    /// configuration order.
    pub fn speaker_for(&self, seat: Seat, turn: u32) -> Option<&Participant> {
        match seat {
            Seat::Neutral(n) => self.members(Role::Neutral).get(n as usize).copied(),
            other => {
                let members = self.members(other.role());
                if members.is_empty() {
                    return None;
                }
                let idx = (turn.max(1) as usize - 1) % members.len();
                Some(members[idx])
            }
        }
    }

    /// Providers referenced by any participant.
    pub fn providers(&self) -> Vec<ModelProvider> {
        let mut providers: Vec<ModelProvider> =
            self.participants.iter().map(|p| p.provider).collect();
        providers.sort();
        providers.dedup();
        providers
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
