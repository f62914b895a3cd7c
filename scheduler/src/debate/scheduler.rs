//! Async driver: asks models for utterances, paces turns, honours
//! pause/resume/end/cancel requests, runs the final analysis, and writes
//! the history record.
//!
//! ## Lifecycle
//!
//! ```text
//! DebateScheduler::start(config)        — validate, configuring → running
//!   → loop:
//!       check cancel / end / pause      — RunControl, any task may steer
//!       step()                          — one model call, one transcript entry
//!       pacing delay
//!   → analyze()                         — analyzing → finished
//!   → history.append(record)            — completed analyses only
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::error::SchedulerError;
use super::model::{AnalysisRequest, ModelError, ModelRegistry, UtteranceRequest};
use super::run::{AnalysisOutcome, DebateRun};
use super::state::RunState;
use super::transcript::{Transcript, TranscriptEntry};
use crate::storage::{HistoryLog, HistoryRecord};

/// Requests from the user, read by the scheduler between turns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlSignal {
    pub paused: bool,
    pub end_requested: bool,
}

/// Cloneable handle for steering a run from another task.
#[derive(Clone)]
pub struct RunControl {
    signal: Arc<watch::Sender<ControlSignal>>,
    cancel: CancellationToken,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ControlSignal::default());
        Self {
            signal: Arc::new(tx),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop starting new turns. A turn already requested still lands.
    pub fn pause(&self) {
        self.signal.send_modify(|s| s.paused = true);
    }

    pub fn resume(&self) {
        self.signal.send_modify(|s| s.paused = false);
    }

    /// Skip the remaining turns and go straight to analysis.
    pub fn end_now(&self) {
        self.signal.send_modify(|s| s.end_requested = true);
    }

    /// Tear the run down. Results that arrive afterwards are discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn signal(&self) -> ControlSignal {
        *self.signal.borrow()
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn subscribe(&self) -> watch::Receiver<ControlSignal> {
        self.signal.subscribe()
    }

    fn clear(&self) {
        self.signal.send_replace(ControlSignal::default());
    }
}

/// What a single [`DebateScheduler::step`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// A participant spoke.
    Spoke(TranscriptEntry),
    /// The run is paused; nothing was requested.
    Paused,
    /// No eligible speaker remains.
    DebateOver,
}

/// Final state of a run handed back to the caller.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: RunState,
    pub transcript: Transcript,
    pub analysis: Option<AnalysisOutcome>,
    /// Id of the history record written for this run, if any.
    pub history_id: Option<Uuid>,
}

impl RunReport {
    /// Compact summary line.
    pub fn summary_line(&self) -> String {
        let analysis = match &self.analysis {
            Some(AnalysisOutcome::Completed { analysis }) => analysis.summary_line(),
            Some(AnalysisOutcome::Failed { message }) => format!("analysis failed: {message}"),
            None => "no analysis".to_string(),
        };
        format!(
            "[{}] {} turns | {}",
            self.state,
            self.transcript.len(),
            analysis
        )
    }
}

/// Called after every applied turn with the new entry and the run.
pub type TurnObserver = Box<dyn FnMut(&TranscriptEntry, &DebateRun) + Send>;

/// Drives a [`DebateRun`] against the registered models.
pub struct DebateScheduler {
    run: DebateRun,
    models: ModelRegistry,
    history: Option<HistoryLog>,
    control: RunControl,
    pacing: Duration,
    observer: Option<TurnObserver>,
}

impl DebateScheduler {
    pub fn new(models: ModelRegistry) -> Self {
        Self {
            run: DebateRun::new(),
            models,
            history: None,
            control: RunControl::new(),
            pacing: Duration::ZERO,
            observer: None,
        }
    }

    /// Write finished runs to `history`.
    pub fn with_history(mut self, history: HistoryLog) -> Self {
        self.history = Some(history);
        self
    }

    /// Delay between turns. Purely presentational.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Observe each turn as it lands, e.g. to print or checkpoint it.
    pub fn on_turn<F>(mut self, observer: F) -> Self
    where
        F: FnMut(&TranscriptEntry, &DebateRun) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Continue an existing run, e.g. one restored from a snapshot.
    pub fn with_run(mut self, run: DebateRun) -> Self {
        if run.state() == RunState::Paused {
            self.control.pause();
        }
        self.run = run;
        self
    }

    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    pub fn run(&self) -> &DebateRun {
        &self.run
    }

    pub fn state(&self) -> RunState {
        self.run.state()
    }

    /// Validate `config` against the run rules and the registered models,
    /// then start.
    pub fn start(&mut self, config: super::config::DebateConfig) -> Result<(), SchedulerError> {
        config.validate()?;
        self.models.check(&config)?;
        self.control.clear();
        self.run.start(config)
    }

    pub fn pause(&mut self) -> Result<(), SchedulerError> {
        self.control.pause();
        self.sync_control()
    }

    pub fn resume(&mut self) -> Result<(), SchedulerError> {
        self.control.resume();
        self.sync_control()
    }

    /// Return a finished or failed run to `configuring`.
    pub fn reset(&mut self) -> Result<(), SchedulerError> {
        self.run.reset()?;
        self.control.clear();
        Ok(())
    }

    /// Execute at most one turn.
    pub async fn step(&mut self) -> Result<StepOutcome, SchedulerError> {
        if self.control.is_cancelled() {
            return Err(SchedulerError::Cancelled);
        }
        self.discard_stale_turn();
        self.sync_control()?;

        match self.run.state() {
            RunState::Paused => return Ok(StepOutcome::Paused),
            RunState::Running => {}
            other => {
                return Err(SchedulerError::WrongState {
                    actual: other,
                    expected: "running",
                })
            }
        }

        let Some(plan) = self.run.begin_turn()? else {
            return Ok(StepOutcome::DebateOver);
        };

        let request = UtteranceRequest {
            transcript: self.run.transcript().clone(),
            seat: plan.seat,
            speaker: plan.speaker.clone(),
            turn: plan.turn,
            kind: plan.kind,
            config: self.run.config()?.clone(),
        };

        let token = self.control.token();
        let result = match self.models.get(request.provider()) {
            None => Err(ModelError::RequestFailed(format!(
                "no model registered for {}",
                request.provider()
            ))),
            Some(model) => {
                let reply = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    r = model.generate_utterance(&request) => Some(r),
                };
                reply.unwrap_or_else(|| Err(ModelError::RequestFailed("cancelled".to_string())))
            }
        };

        if token.is_cancelled() {
            self.run.abandon_turn();
            info!(seat = %plan.seat, "run cancelled, discarding utterance");
            return Err(SchedulerError::Cancelled);
        }

        match result {
            Ok(text) => {
                let entry = self.run.complete_turn(text)?.clone();
                if let Some(observer) = self.observer.as_mut() {
                    observer(&entry, &self.run);
                }
                self.sync_control()?;
                Ok(StepOutcome::Spoke(entry))
            }
            Err(source) => {
                let err = SchedulerError::Generation {
                    seat: plan.seat,
                    speaker: plan.speaker.name.clone(),
                    turn: plan.turn,
                    source,
                };
                self.run.fail_turn(&err.to_string())?;
                Err(err)
            }
        }
    }

    /// Run turns until the debate is over, ended, failed, or cancelled,
    /// then analyze.
    pub async fn run_to_completion(&mut self) -> Result<RunReport, SchedulerError> {
        let token = self.control.token();
        loop {
            if token.is_cancelled() {
                return Err(SchedulerError::Cancelled);
            }
            if self.control.signal().end_requested && self.run.state().is_active() {
                self.discard_stale_turn();
                self.run.begin_analysis("ended by user")?;
                break;
            }

            match self.step().await? {
                StepOutcome::Spoke(_) => {
                    if !self.pacing.is_zero() {
                        tokio::select! {
                            _ = token.cancelled() => return Err(SchedulerError::Cancelled),
                            _ = tokio::time::sleep(self.pacing) => {}
                        }
                    }
                }
                StepOutcome::Paused => self.wait_for_control().await?,
                StepOutcome::DebateOver => {
                    self.run.begin_analysis("no eligible speaker")?;
                    break;
                }
            }
        }
        self.analyze().await
    }

    /// Skip remaining turns and analyze immediately.
    pub async fn end_now(&mut self) -> Result<RunReport, SchedulerError> {
        self.discard_stale_turn();
        self.run.begin_analysis("ended by user")?;
        self.analyze().await
    }

    /// Drop a plan left behind when a `step` future was dropped mid-call.
    fn discard_stale_turn(&mut self) {
        if let Some(stale) = self.run.abandon_turn() {
            warn!(seat = %stale.seat, turn = stale.turn, "discarding turn from a dropped call");
        }
    }

    /// Run the final analysis and finish. An analysis failure still
    /// finishes the run.
    pub async fn analyze(&mut self) -> Result<RunReport, SchedulerError> {
        if self.run.state() != RunState::Analyzing {
            return Err(SchedulerError::WrongState {
                actual: self.run.state(),
                expected: "analyzing",
            });
        }

        let config = self.run.config()?.clone();
        let request = AnalysisRequest {
            transcript: self.run.transcript().clone(),
            config: config.clone(),
        };
        let token = self.control.token();

        let result = match config.analysis_provider().and_then(|p| self.models.get(p)) {
            None => Err(ModelError::RequestFailed(
                "no model registered for analysis".to_string(),
            )),
            Some(model) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(SchedulerError::Cancelled),
                    r = model.analyze_debate(&request) => r,
                }
            }
        };
        if token.is_cancelled() {
            return Err(SchedulerError::Cancelled);
        }

        let outcome = match result {
            Ok(analysis) => AnalysisOutcome::Completed { analysis },
            Err(e) => {
                warn!(error = %e, "analysis failed, finishing without it");
                AnalysisOutcome::Failed {
                    message: e.to_string(),
                }
            }
        };
        self.run.finish(outcome)?;

        let history_id = self.persist();
        let report = RunReport {
            state: self.run.state(),
            transcript: self.run.transcript().clone(),
            analysis: self.run.analysis().cloned(),
            history_id,
        };
        info!(summary = %report.summary_line(), "debate finished");
        Ok(report)
    }

    /// Append the finished run to history. Failures are logged and dropped.
    fn persist(&self) -> Option<Uuid> {
        let history = self.history.as_ref()?;
        let analysis = self.run.analysis()?.analysis()?;
        let config = self.run.last_config()?;
        let record = HistoryRecord::new(config, self.run.transcript(), analysis);
        match history.append(&record) {
            Ok(()) => {
                info!(id = %record.id, "history record saved");
                Some(record.id)
            }
            Err(e) => {
                warn!(error = %e, "failed to save history record");
                None
            }
        }
    }

    /// Bring the run's paused/running state in line with the control handle.
    fn sync_control(&mut self) -> Result<(), SchedulerError> {
        let signal = self.control.signal();
        match (self.run.state(), signal.paused) {
            (RunState::Running, true) => self.run.pause(),
            (RunState::Paused, false) => self.run.resume(),
            _ => Ok(()),
        }
    }

    async fn wait_for_control(&mut self) -> Result<(), SchedulerError> {
        let mut rx = self.control.subscribe();
        let token = self.control.token();
        loop {
            let signal = *rx.borrow_and_update();
            if !signal.paused || signal.end_requested {
                return Ok(());
            }
            tokio::select! {
                _ = token.cancelled() => return Err(SchedulerError::Cancelled),
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

impl Drop for DebateScheduler {
    fn drop(&mut self) {
        // Late results from detached tasks must not land in a disposed run.
        self.control.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::config::DebateConfig;
    use super::super::model::{FinalAnalysis, MockDebateModel, ScriptedModel};
    use super::super::participant::{ModelProvider, Participant, Role, Roster, Seat};
    use super::*;
    use crate::storage::MemoryStore;

    fn config(limit: u32) -> DebateConfig {
        DebateConfig::new(
            "Is remote work here to stay?",
            Roster::from_participants(vec![
                Participant::new("m", Role::Moderator, "Mod", ModelProvider::Gemini),
                Participant::new("p", Role::Proponent, "Pro", ModelProvider::Gemini),
                Participant::new("o", Role::Opponent, "Con", ModelProvider::Gemini),
            ])
            .unwrap(),
        )
        .with_turn_limit(limit)
    }

    fn scheduler(model: ScriptedModel) -> DebateScheduler {
        DebateScheduler::new(ModelRegistry::new().with(Arc::new(model)))
    }

    #[tokio::test]
    async fn test_step_by_step() {
        let mut s = scheduler(ScriptedModel::new(ModelProvider::Gemini));
        s.start(config(1)).unwrap();

        let mut seats = Vec::new();
        loop {
            match s.step().await.unwrap() {
                StepOutcome::Spoke(entry) => seats.push(entry.seat),
                StepOutcome::DebateOver => break,
                StepOutcome::Paused => unreachable!(),
            }
        }
        assert_eq!(
            seats,
            vec![Seat::Moderator, Seat::Proponent, Seat::Opponent, Seat::Moderator]
        );
    }

    #[tokio::test]
    async fn test_start_rejects_unregistered_provider() {
        let mut s = scheduler(ScriptedModel::new(ModelProvider::OpenAi));
        let err = s.start(config(1)).unwrap_err();
        assert!(matches!(err, SchedulerError::Config(_)));
        assert_eq!(s.state(), RunState::Configuring);
    }

    #[tokio::test]
    async fn test_paused_step_does_nothing() {
        let model = Arc::new(ScriptedModel::new(ModelProvider::Gemini));
        let mut s = DebateScheduler::new(ModelRegistry::new().with(model.clone()));
        s.start(config(1)).unwrap();
        s.pause().unwrap();
        assert_eq!(s.step().await.unwrap(), StepOutcome::Paused);
        assert!(model.calls().is_empty());
        s.resume().unwrap();
        assert!(matches!(s.step().await.unwrap(), StepOutcome::Spoke(_)));
    }

    #[tokio::test]
    async fn test_run_to_completion_persists_history() {
        let store = Arc::new(MemoryStore::new());
        let history = HistoryLog::new(store);
        let mut s = scheduler(ScriptedModel::new(ModelProvider::Gemini)).with_history(history.clone());
        s.start(config(2)).unwrap();

        let report = s.run_to_completion().await.unwrap();
        assert_eq!(report.state, RunState::Finished);
        assert_eq!(report.transcript.len(), 6);
        assert!(report.analysis.as_ref().unwrap().is_completed());

        let records = history.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(Some(records[0].id), report.history_id);
        assert_eq!(records[0].payload.transcript.len(), 6);
    }

    #[tokio::test]
    async fn test_mock_generation_failure_on_opponent() {
        let mut mock = MockDebateModel::new();
        mock.expect_provider().return_const(ModelProvider::Gemini);
        mock.expect_generate_utterance()
            .times(3)
            .returning(|req| match req.seat {
                Seat::Opponent => Err(ModelError::RequestFailed("503".to_string())),
                seat => Ok(format!("{seat} speaks")),
            });
        mock.expect_analyze_debate().never();

        let mut s = DebateScheduler::new(ModelRegistry::new().with(Arc::new(mock)));
        s.start(config(1)).unwrap();

        let err = s.run_to_completion().await.unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Generation {
                seat: Seat::Opponent,
                turn: 1,
                ..
            }
        ));
        assert_eq!(s.state(), RunState::Error);
        assert_eq!(s.run().transcript().seats(), vec![Seat::Moderator, Seat::Proponent]);
        assert!(s.run().last_error().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_mock_analysis_failure_still_finishes() {
        let mut mock = MockDebateModel::new();
        mock.expect_provider().return_const(ModelProvider::Gemini);
        mock.expect_generate_utterance()
            .times(4)
            .returning(|req| Ok(format!("{} turn {}", req.seat, req.turn)));
        mock.expect_analyze_debate()
            .times(1)
            .returning(|_| Err(ModelError::ParseError("not json".to_string())));

        let history = HistoryLog::new(Arc::new(MemoryStore::new()));
        let mut s = DebateScheduler::new(ModelRegistry::new().with(Arc::new(mock)))
            .with_history(history.clone());
        s.start(config(1)).unwrap();

        let report = s.run_to_completion().await.unwrap();
        assert_eq!(report.state, RunState::Finished);
        assert_eq!(report.transcript.len(), 4);
        assert!(matches!(
            report.analysis,
            Some(AnalysisOutcome::Failed { .. })
        ));
        assert!(report.history_id.is_none());
        assert!(history.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_end_now_skips_closing() {
        let mut s = scheduler(ScriptedModel::new(ModelProvider::Gemini));
        s.start(config(3)).unwrap();
        s.step().await.unwrap();
        s.step().await.unwrap();

        let report = s.end_now().await.unwrap();
        assert_eq!(report.state, RunState::Finished);
        assert_eq!(report.transcript.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_now_after_dropped_step() {
        let model = ScriptedModel::new(ModelProvider::Gemini).with_delay(Duration::from_millis(200));
        let mut s = scheduler(model);
        s.start(config(2)).unwrap();

        let timed_out = tokio::time::timeout(Duration::from_millis(10), s.step()).await;
        assert!(timed_out.is_err());
        assert_eq!(s.run().in_flight().map(|p| p.seat), Some(Seat::Moderator));

        let report = s.end_now().await.unwrap();
        assert_eq!(report.state, RunState::Finished);
        assert!(report.transcript.is_empty());
        assert!(s.run().in_flight().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_requested_after_dropped_step() {
        let model = ScriptedModel::new(ModelProvider::Gemini).with_delay(Duration::from_millis(200));
        let mut s = scheduler(model);
        s.start(config(2)).unwrap();

        let timed_out = tokio::time::timeout(Duration::from_millis(10), s.step()).await;
        assert!(timed_out.is_err());
        assert!(s.run().in_flight().is_some());

        s.control().end_now();
        let report = s.run_to_completion().await.unwrap();
        assert_eq!(report.state, RunState::Finished);
        assert!(report.transcript.is_empty());
    }

    #[tokio::test]
    async fn test_end_requested_through_control() {
        let mut s = scheduler(ScriptedModel::new(ModelProvider::Gemini));
        s.start(config(3)).unwrap();
        s.control().end_now();
        let report = s.run_to_completion().await.unwrap();
        assert!(report.transcript.is_empty());
        assert_eq!(report.state, RunState::Finished);
    }

    #[tokio::test]
    async fn test_cancel_discards_in_flight_result() {
        let model = ScriptedModel::new(ModelProvider::Gemini).with_delay(Duration::from_millis(200));
        let mut s = scheduler(model);
        s.start(config(1)).unwrap();
        let control = s.control();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            control.cancel();
        });

        let err = s.step().await.unwrap_err();
        assert_eq!(err, SchedulerError::Cancelled);
        assert!(s.run().transcript().is_empty());
        assert!(s.run().in_flight().is_none());
    }

    #[tokio::test]
    async fn test_pause_mid_flight_applies_result() {
        let model = ScriptedModel::new(ModelProvider::Gemini).with_delay(Duration::from_millis(50));
        let mut s = scheduler(model);
        s.start(config(1)).unwrap();
        let control = s.control();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            control.pause();
        });

        let outcome = s.step().await.unwrap();
        assert!(matches!(outcome, StepOutcome::Spoke(_)));
        assert_eq!(s.run().transcript().len(), 1);
        assert_eq!(s.state(), RunState::Paused);
        assert_eq!(s.step().await.unwrap(), StepOutcome::Paused);
    }

    #[tokio::test]
    async fn test_observer_sees_every_turn() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut s = scheduler(ScriptedModel::new(ModelProvider::Gemini)).on_turn(move |entry, run| {
            assert_eq!(run.transcript().last(), Some(entry));
            sink.lock().unwrap().push(entry.seat);
        });
        s.start(config(1)).unwrap();
        let report = s.run_to_completion().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), report.transcript.seats());
    }

    #[tokio::test]
    async fn test_reset_after_finish() {
        let mut s = scheduler(ScriptedModel::new(ModelProvider::Gemini));
        s.start(config(1)).unwrap();
        s.run_to_completion().await.unwrap();
        s.reset().unwrap();
        assert_eq!(s.state(), RunState::Configuring);
        s.start(config(1)).unwrap();
        assert_eq!(s.state(), RunState::Running);
    }

    #[tokio::test]
    async fn test_analyze_requires_analyzing() {
        let mut s = scheduler(ScriptedModel::new(ModelProvider::Gemini));
        s.start(config(1)).unwrap();
        assert!(matches!(
            s.analyze().await.unwrap_err(),
            SchedulerError::WrongState { .. }
        ));
    }

    #[test]
    fn test_report_summary_line() {
        let report = RunReport {
            state: RunState::Finished,
            transcript: Transcript::new(),
            analysis: Some(AnalysisOutcome::Completed {
                analysis: FinalAnalysis {
                    summary: "Pro won narrowly. More detail.".to_string(),
                    participants: vec![],
                    winner: Some("Pro".to_string()),
                },
            }),
            history_id: None,
        };
        assert_eq!(report.summary_line(), "[finished] 0 turns | Pro won narrowly.");
    }
}
