//! Next-speaker selection.
//!
//! Selection is a pure function of the transcript and the config: the
//! moderator opens, debaters rotate round-robin seeded by the starter seat
//! after every moderator turn, and the moderator closes once every debater
//! seat has used its turn limit.

use super::config::DebateConfig;
use super::participant::{Participant, Seat};
use super::transcript::{ModeratorStage, Transcript, TurnCounter, TurnKind};

/// Pick the seat that speaks next, or `None` when the debate is over.
pub fn next_speaker(config: &DebateConfig, transcript: &Transcript) -> Option<Seat> {
    let stage = ModeratorStage::from_transcript(transcript);
    if stage == ModeratorStage::NotStarted {
        return Some(Seat::Moderator);
    }

    let order = config.speaking_order();
    let counter = TurnCounter::from_transcript(transcript);

    if debaters_exhausted(config, &counter) {
        return match stage {
            ModeratorStage::Opened => Some(Seat::Moderator),
            _ => None,
        };
    }

    let previous = match transcript.last() {
        None => return Some(config.starter),
        Some(entry) if entry.seat.is_moderator() => return Some(config.starter),
        Some(entry) => entry.seat,
    };

    let start = order
        .iter()
        .position(|s| *s == previous)
        .map(|i| i + 1)
        .unwrap_or(0);
    (0..order.len())
        .map(|offset| order[(start + offset) % order.len()])
        .find(|seat| counter.get(*seat) < config.turn_limit)
        .or(Some(Seat::Moderator))
}

/// Whether every debater seat has used its full turn limit.
pub fn debaters_exhausted(config: &DebateConfig, counter: &TurnCounter) -> bool {
    u64::from(counter.debater_total()) >= config.debater_turn_budget()
}

/// Everything needed to execute one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnPlan {
    pub seat: Seat,
    pub speaker: Participant,
    /// 1-based turn number for the seat.
    pub turn: u32,
    pub kind: TurnKind,
}

impl TurnPlan {
    pub fn is_closing(&self) -> bool {
        self.kind == TurnKind::Closing
    }
}

/// Resolve a seat into a concrete turn.
///
/// Returns `None` if no participant sits in `seat`.
pub fn plan_turn(config: &DebateConfig, transcript: &Transcript, seat: Seat) -> Option<TurnPlan> {
    let counter = TurnCounter::from_transcript(transcript);
    let turn = counter.get(seat) + 1;
    let speaker = config.roster.speaker_for(seat, turn)?.clone();

    let kind = if !seat.is_moderator() {
        TurnKind::Argument
    } else if ModeratorStage::from_transcript(transcript) == ModeratorStage::NotStarted {
        TurnKind::Opening
    } else if debaters_exhausted(config, &counter) {
        TurnKind::Closing
    } else {
        // Fallback moderator turn mid-debate; only reachable when the
        // speaking order has no eligible seat.
        TurnKind::Argument
    };

    Some(TurnPlan {
        seat,
        speaker,
        turn,
        kind,
    })
}
