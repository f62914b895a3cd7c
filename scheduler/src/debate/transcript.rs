//! Append-only transcript, per-seat turn counter, and moderator stage.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::participant::{Participant, Seat};

/// What a turn contributes to the debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    /// Moderator's opening statement.
    Opening,
    /// A debater's argument or rebuttal.
    Argument,
    /// Moderator's closing statement.
    Closing,
}

impl std::fmt::Display for TurnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opening => write!(f, "opening"),
            Self::Argument => write!(f, "argument"),
            Self::Closing => write!(f, "closing"),
        }
    }
}

/// One utterance in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Snapshot of the participant at the time they spoke.
    pub speaker: Participant,
    /// Seat the turn counts against.
    pub seat: Seat,
    pub kind: TurnKind,
    /// 1-based turn number for the seat.
    pub turn: u32,
    /// The utterance text.
    pub text: String,
    pub spoken_at: DateTime<Utc>,
}

/// Append-only ordered list of utterances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Seats in speaking order.
    pub fn seats(&self) -> Vec<Seat> {
        self.entries.iter().map(|e| e.seat).collect()
    }

    /// Transcript restricted to its first `len` entries.
    pub fn prefix(&self, len: usize) -> Transcript {
        Transcript {
            entries: self.entries[..len.min(self.entries.len())].to_vec(),
        }
    }

    /// Plain-text rendering used in prompts: `Name (seat): text` per line.
    pub fn render_plain(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{} ({}): {}", e.speaker.name, e.seat, e.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Utterances delivered per seat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnCounter {
    counts: BTreeMap<Seat, u32>,
}

impl TurnCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild counts from a transcript.
    pub fn from_transcript(transcript: &Transcript) -> Self {
        let mut counter = Self::new();
        for entry in transcript.entries() {
            counter.increment(entry.seat);
        }
        counter
    }

    pub fn increment(&mut self, seat: Seat) -> u32 {
        let count = self.counts.entry(seat).or_insert(0);
        *count += 1;
        *count
    }

    pub fn get(&self, seat: Seat) -> u32 {
        self.counts.get(&seat).copied().unwrap_or(0)
    }

    /// Total utterances by non-moderator seats.
    pub fn debater_total(&self) -> u32 {
        self.counts
            .iter()
            .filter(|(seat, _)| !seat.is_moderator())
            .map(|(_, n)| n)
            .sum()
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn reset(&mut self) {
        self.counts.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (Seat, u32)> + '_ {
        self.counts.iter().map(|(s, n)| (*s, *n))
    }
}

/// Whether the moderator has opened and closed the debate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeratorStage {
    #[default]
    NotStarted,
    Opened,
    Closed,
}

impl ModeratorStage {
    /// Derive the stage from the turn kinds recorded in a transcript.
    pub fn from_transcript(transcript: &Transcript) -> Self {
        let mut stage = Self::NotStarted;
        for entry in transcript.entries() {
            match entry.kind {
                TurnKind::Closing => return Self::Closed,
                TurnKind::Opening => stage = Self::Opened,
                TurnKind::Argument => {}
            }
        }
        stage
    }
}

impl std::fmt::Display for ModeratorStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Opened => write!(f, "opened"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
