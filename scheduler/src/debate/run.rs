//! Synchronous core of a debate run.
//!
//! `DebateRun` owns the state machine, transcript, and turn counter and
//! enforces the one-turn-in-flight rule. It never talks to a model: callers
//! take a [`TurnPlan`] with [`DebateRun::begin_turn`], obtain the utterance
//! however they like, and hand it back with [`DebateRun::complete_turn`] or
//! [`DebateRun::fail_turn`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::config::DebateConfig;
use super::error::SchedulerError;
use super::model::FinalAnalysis;
use super::participant::Seat;
use super::state::{RunState, RunTransition, StateMachine};
use super::transcript::{ModeratorStage, Transcript, TranscriptEntry, TurnCounter};
use super::turns::{next_speaker, plan_turn, TurnPlan};

/// How the end-of-run analysis went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Completed { analysis: FinalAnalysis },
    Failed { message: String },
}

impl AnalysisOutcome {
    pub fn analysis(&self) -> Option<&FinalAnalysis> {
        match self {
            Self::Completed { analysis } => Some(analysis),
            Self::Failed { .. } => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// A single debate run.
#[derive(Debug, Clone)]
pub struct DebateRun {
    config: Option<DebateConfig>,
    machine: StateMachine,
    transcript: Transcript,
    counter: TurnCounter,
    next: Option<Seat>,
    in_flight: Option<TurnPlan>,
    analysis: Option<AnalysisOutcome>,
    last_error: Option<String>,
}

impl Default for DebateRun {
    fn default() -> Self {
        Self::new()
    }
}

impl DebateRun {
    /// A run in `configuring` with nothing said.
    pub fn new() -> Self {
        Self {
            config: None,
            machine: StateMachine::new(),
            transcript: Transcript::new(),
            counter: TurnCounter::new(),
            next: None,
            in_flight: None,
            analysis: None,
            last_error: None,
        }
    }

    /// Validate `config` and start the run.
    ///
    /// On a validation failure the run stays in `configuring`.
    pub fn start(&mut self, config: DebateConfig) -> Result<(), SchedulerError> {
        self.expect_state(RunState::Configuring, "configuring")?;
        config.validate()?;

        self.transcript = Transcript::new();
        self.counter.reset();
        self.in_flight = None;
        self.analysis = None;
        self.last_error = None;
        self.next = Some(Seat::Moderator);
        info!(config = %config.summary_line(), "debate starting");
        self.config = Some(config);
        self.machine.transition(RunState::Running, "debate started")?;
        Ok(())
    }

    /// Claim the next turn.
    ///
    /// Returns `Ok(None)` when there is no eligible speaker left; the
    /// caller should then call [`DebateRun::begin_analysis`].
    pub fn begin_turn(&mut self) -> Result<Option<TurnPlan>, SchedulerError> {
        self.expect_state(RunState::Running, "running")?;
        if self.in_flight.is_some() {
            return Err(SchedulerError::TurnInFlight);
        }
        let Some(seat) = self.next else {
            return Ok(None);
        };
        let config = self.config()?;
        let Some(plan) = plan_turn(config, &self.transcript, seat) else {
            warn!(%seat, "no participant for seat, ending debate");
            self.next = None;
            return Ok(None);
        };
        self.in_flight = Some(plan.clone());
        Ok(Some(plan))
    }

    /// Apply the utterance for the turn in flight.
    ///
    /// Allowed while paused: a pause never discards a turn that was already
    /// requested.
    pub fn complete_turn(&mut self, text: String) -> Result<&TranscriptEntry, SchedulerError> {
        if !self.state().is_active() {
            return Err(SchedulerError::WrongState {
                actual: self.state(),
                expected: "running or paused",
            });
        }
        let plan = self.in_flight.take().ok_or(SchedulerError::NoTurnInFlight)?;

        self.counter.increment(plan.seat);
        self.transcript.push(TranscriptEntry {
            speaker: plan.speaker,
            seat: plan.seat,
            kind: plan.kind,
            turn: plan.turn,
            text,
            spoken_at: Utc::now(),
        });
        self.next = next_speaker(self.config()?, &self.transcript);

        let entry = self
            .transcript
            .last()
            .ok_or(SchedulerError::NoTurnInFlight)?;
        info!(
            seat = %entry.seat,
            speaker = %entry.speaker.name,
            turn = entry.turn,
            kind = %entry.kind,
            next = ?self.next,
            "turn complete"
        );
        Ok(entry)
    }

    /// Record a failed turn and move the run to `error`. The transcript is
    /// left exactly as it was before the turn began.
    pub fn fail_turn(&mut self, message: &str) -> Result<TurnPlan, SchedulerError> {
        let plan = self.in_flight.take().ok_or(SchedulerError::NoTurnInFlight)?;
        self.last_error = Some(message.to_string());
        self.machine.transition(RunState::Error, message)?;
        warn!(seat = %plan.seat, turn = plan.turn, error = message, "turn failed");
        Ok(plan)
    }

    /// Drop the turn in flight without applying anything.
    pub fn abandon_turn(&mut self) -> Option<TurnPlan> {
        self.in_flight.take()
    }

    pub fn pause(&mut self) -> Result<(), SchedulerError> {
        self.machine.transition(RunState::Paused, "paused by user")?;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), SchedulerError> {
        self.expect_state(RunState::Paused, "paused")?;
        self.machine.transition(RunState::Running, "resumed by user")?;
        Ok(())
    }

    /// Stop scheduling turns and wait for the analysis.
    pub fn begin_analysis(&mut self, reason: &str) -> Result<(), SchedulerError> {
        if self.in_flight.is_some() {
            return Err(SchedulerError::TurnInFlight);
        }
        self.machine.transition(RunState::Analyzing, reason)?;
        info!(turns = self.transcript.len(), reason, "debate analyzing");
        Ok(())
    }

    /// Attach the analysis outcome and finish. Succeeds for either outcome.
    pub fn finish(&mut self, outcome: AnalysisOutcome) -> Result<(), SchedulerError> {
        self.expect_state(RunState::Analyzing, "analyzing")?;
        let reason = match &outcome {
            AnalysisOutcome::Completed { .. } => "analysis complete".to_string(),
            AnalysisOutcome::Failed { message } => {
                self.last_error = Some(message.clone());
                format!("analysis failed: {message}")
            }
        };
        self.analysis = Some(outcome);
        self.machine.transition(RunState::Finished, &reason)?;
        Ok(())
    }

    /// Return a finished or failed run to `configuring`, keeping its config
    /// for editing.
    pub fn reset(&mut self) -> Result<(), SchedulerError> {
        self.machine.transition(RunState::Configuring, "reset by user")?;
        self.transcript = Transcript::new();
        self.counter.reset();
        self.next = None;
        self.in_flight = None;
        self.analysis = None;
        self.last_error = None;
        Ok(())
    }

    pub fn state(&self) -> RunState {
        self.machine.state()
    }

    pub fn transitions(&self) -> &[RunTransition] {
        self.machine.transitions()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn counter(&self) -> &TurnCounter {
        &self.counter
    }

    /// Seat scheduled to speak next.
    pub fn next_seat(&self) -> Option<Seat> {
        self.next
    }

    pub fn in_flight(&self) -> Option<&TurnPlan> {
        self.in_flight.as_ref()
    }

    pub fn moderator_stage(&self) -> ModeratorStage {
        ModeratorStage::from_transcript(&self.transcript)
    }

    pub fn config(&self) -> Result<&DebateConfig, SchedulerError> {
        self.config.as_ref().ok_or(SchedulerError::WrongState {
            actual: self.state(),
            expected: "a configured run",
        })
    }

    /// The last config passed to [`DebateRun::start`], if any.
    pub fn last_config(&self) -> Option<&DebateConfig> {
        self.config.as_ref()
    }

    pub fn analysis(&self) -> Option<&AnalysisOutcome> {
        self.analysis.as_ref()
    }

    /// Human-readable message of the most recent failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        let next = self
            .next
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "[{}] {} turns | moderator {} | next={}",
            self.state(),
            self.transcript.len(),
            self.moderator_stage(),
            next
        )
    }

    fn expect_state(&self, state: RunState, expected: &'static str) -> Result<(), SchedulerError> {
        if self.state() != state {
            return Err(SchedulerError::WrongState {
                actual: self.state(),
                expected,
            });
        }
        Ok(())
    }

    pub(crate) fn from_parts(
        config: Option<DebateConfig>,
        machine: StateMachine,
        transcript: Transcript,
        analysis: Option<AnalysisOutcome>,
        last_error: Option<String>,
    ) -> Self {
        let counter = TurnCounter::from_transcript(&transcript);
        let next = match (&config, machine.state().is_active()) {
            (Some(config), true) => next_speaker(config, &transcript),
            _ => None,
        };
        Self {
            config,
            machine,
            transcript,
            counter,
            next,
            in_flight: None,
            analysis,
            last_error,
        }
    }

    pub(crate) fn machine_mut(&mut self) -> &mut StateMachine {
        &mut self.machine
    }

    pub(crate) fn machine(&self) -> &StateMachine {
        &self.machine
    }
}

#[cfg(test)]
mod tests {
    use super::super::config::ConfigError;
    use super::super::participant::{ModelProvider, Participant, Role, Roster};
    use super::super::transcript::TurnKind;
    use super::*;

    fn config(limit: u32) -> DebateConfig {
        DebateConfig::new(
            "Should homework be banned?",
            Roster::from_participants(vec![
                Participant::new("m", Role::Moderator, "Mod", ModelProvider::Gemini),
                Participant::new("p", Role::Proponent, "Pro", ModelProvider::Gemini),
                Participant::new("o", Role::Opponent, "Con", ModelProvider::Gemini),
            ])
            .unwrap(),
        )
        .with_turn_limit(limit)
    }

    fn speak(run: &mut DebateRun) -> Option<Seat> {
        let plan = run.begin_turn().unwrap()?;
        let text = format!("{} turn {}", plan.seat, plan.turn);
        run.complete_turn(text).unwrap();
        Some(plan.seat)
    }

    #[test]
    fn test_start_requires_topic() {
        let mut run = DebateRun::new();
        let mut cfg = config(1);
        cfg.topic = String::new();
        let err = run.start(cfg).unwrap_err();
        assert_eq!(err, SchedulerError::Config(ConfigError::EmptyTopic));
        assert_eq!(run.state(), RunState::Configuring);
        assert!(run.transitions().is_empty());
    }

    #[test]
    fn test_start_sets_moderator_next() {
        let mut run = DebateRun::new();
        run.start(config(1)).unwrap();
        assert_eq!(run.state(), RunState::Running);
        assert_eq!(run.next_seat(), Some(Seat::Moderator));
        assert_eq!(run.moderator_stage(), ModeratorStage::NotStarted);
    }

    #[test]
    fn test_full_run() {
        let mut run = DebateRun::new();
        run.start(config(1)).unwrap();

        let mut seats = Vec::new();
        while let Some(seat) = speak(&mut run) {
            seats.push(seat);
            assert_eq!(run.counter(), &TurnCounter::from_transcript(run.transcript()));
        }
        assert_eq!(
            seats,
            vec![Seat::Moderator, Seat::Proponent, Seat::Opponent, Seat::Moderator]
        );
        assert_eq!(run.moderator_stage(), ModeratorStage::Closed);
        assert_eq!(run.transcript().entries()[3].kind, TurnKind::Closing);

        run.begin_analysis("no eligible speaker").unwrap();
        assert_eq!(run.state(), RunState::Analyzing);

        run.finish(AnalysisOutcome::Completed {
            analysis: FinalAnalysis {
                summary: "Close call.".to_string(),
                participants: vec![],
                winner: None,
            },
        })
        .unwrap();
        assert_eq!(run.state(), RunState::Finished);
        assert!(run.analysis().unwrap().is_completed());
    }

    #[test]
    fn test_one_turn_in_flight() {
        let mut run = DebateRun::new();
        run.start(config(1)).unwrap();
        run.begin_turn().unwrap().unwrap();
        assert_eq!(run.begin_turn().unwrap_err(), SchedulerError::TurnInFlight);
        assert_eq!(
            run.begin_analysis("end now").unwrap_err(),
            SchedulerError::TurnInFlight
        );
    }

    #[test]
    fn test_complete_without_turn() {
        let mut run = DebateRun::new();
        run.start(config(1)).unwrap();
        assert_eq!(
            run.complete_turn("x".to_string()).unwrap_err(),
            SchedulerError::NoTurnInFlight
        );
    }

    #[test]
    fn test_pause_blocks_new_turns_but_applies_in_flight() {
        let mut run = DebateRun::new();
        run.start(config(1)).unwrap();
        let plan = run.begin_turn().unwrap().unwrap();
        run.pause().unwrap();

        // In-flight result still lands.
        run.complete_turn("opening".to_string()).unwrap();
        assert_eq!(run.transcript().len(), 1);
        assert_eq!(run.transcript().entries()[0].seat, plan.seat);

        assert!(matches!(
            run.begin_turn().unwrap_err(),
            SchedulerError::WrongState { .. }
        ));
        run.resume().unwrap();
        assert_eq!(speak(&mut run), Some(Seat::Proponent));
    }

    #[test]
    fn test_fail_turn_keeps_transcript() {
        let mut run = DebateRun::new();
        run.start(config(1)).unwrap();
        speak(&mut run);
        speak(&mut run);

        let plan = run.begin_turn().unwrap().unwrap();
        assert_eq!(plan.seat, Seat::Opponent);
        run.fail_turn("backend down").unwrap();

        assert_eq!(run.state(), RunState::Error);
        assert_eq!(run.transcript().len(), 2);
        assert_eq!(run.counter().get(Seat::Opponent), 0);
        assert_eq!(run.last_error(), Some("backend down"));
    }

    #[test]
    fn test_end_now_while_paused() {
        let mut run = DebateRun::new();
        run.start(config(3)).unwrap();
        speak(&mut run);
        run.pause().unwrap();
        run.begin_analysis("ended by user").unwrap();
        assert_eq!(run.state(), RunState::Analyzing);
    }

    #[test]
    fn test_failed_analysis_still_finishes() {
        let mut run = DebateRun::new();
        run.start(config(1)).unwrap();
        speak(&mut run);
        run.begin_analysis("ended by user").unwrap();
        run.finish(AnalysisOutcome::Failed {
            message: "bad json".to_string(),
        })
        .unwrap();
        assert_eq!(run.state(), RunState::Finished);
        assert_eq!(run.transcript().len(), 1);
        assert_eq!(run.last_error(), Some("bad json"));
    }

    #[test]
    fn test_reset_and_restart() {
        let mut run = DebateRun::new();
        run.start(config(1)).unwrap();
        speak(&mut run);
        run.begin_turn().unwrap();
        run.fail_turn("boom").unwrap();

        run.reset().unwrap();
        assert_eq!(run.state(), RunState::Configuring);
        assert!(run.transcript().is_empty());
        assert!(run.last_config().is_some());

        run.start(config(1)).unwrap();
        assert_eq!(run.counter().total(), 0);
        assert_eq!(speak(&mut run), Some(Seat::Moderator));
        assert_eq!(run.moderator_stage(), ModeratorStage::Opened);
    }

    #[test]
    fn test_cannot_start_twice() {
        let mut run = DebateRun::new();
        run.start(config(1)).unwrap();
        assert!(matches!(
            run.start(config(1)).unwrap_err(),
            SchedulerError::WrongState { .. }
        ));
    }

    #[test]
    fn test_status_line() {
        let mut run = DebateRun::new();
        run.start(config(1)).unwrap();
        let line = run.status_line();
        assert!(line.contains("[running]"));
        assert!(line.contains("next=moderator"));
    }
}
