//! Full-run tests for the async scheduler: pause/resume, failures,
//! cancellation, checkpoint restore, and history retention.

use std::sync::Arc;
use std::time::Duration;

use debate_scheduler::debate::{
    AnalysisOutcome, DebateConfig, DebateScheduler, IntegrityStatus, ModelProvider,
    ModelRegistry, Participant, Role, Roster, RunSnapshot, RunState, SchedulerError,
    ScriptedModel, Seat, StepOutcome, TurnKind,
};
use debate_scheduler::storage::{HistoryLog, HistoryRecord, MemoryStore};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(limit: u32) -> DebateConfig {
    let roster = Roster::from_participants(vec![
        Participant::new("m", Role::Moderator, "Moderator", ModelProvider::Anthropic),
        Participant::new("p", Role::Proponent, "Ada", ModelProvider::Gemini),
        Participant::new("o", Role::Opponent, "Brook", ModelProvider::OpenAi),
        Participant::new("n", Role::Neutral, "Cyd", ModelProvider::Gemini),
    ])
    .unwrap();
    DebateConfig::new("Should cities ban private cars?", roster).with_turn_limit(limit)
}

fn registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    for provider in ModelProvider::ALL {
        registry.register(Arc::new(ScriptedModel::new(provider)));
    }
    registry
}

async fn uninterrupted_seats(limit: u32) -> Vec<Seat> {
    let mut s = DebateScheduler::new(registry());
    s.start(config(limit)).unwrap();
    s.run_to_completion().await.unwrap().transcript.seats()
}

// ── Happy path ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_mixed_provider_run_finishes_with_analysis() {
    init_tracing();
    let history = HistoryLog::new(Arc::new(MemoryStore::new()));
    let mut s = DebateScheduler::new(registry()).with_history(history.clone());
    s.start(config(2)).unwrap();

    let report = s.run_to_completion().await.unwrap();
    assert_eq!(report.state, RunState::Finished);
    assert_eq!(report.transcript.len(), 2 * 3 + 2);

    let analysis = report.analysis.as_ref().and_then(|a| a.analysis()).unwrap();
    assert_eq!(analysis.participants.len(), 4);

    let record = history.get(report.history_id.unwrap()).unwrap().unwrap();
    assert_eq!(record.topic, "Should cities ban private cars?");
    assert_eq!(record.kind, "debate");
}

// ── Pause / resume ─────────────────────────────────────────────────

#[tokio::test]
async fn test_pause_resume_continues_identically() {
    let expected = uninterrupted_seats(2).await;

    let mut s = DebateScheduler::new(registry());
    s.start(config(2)).unwrap();
    for _ in 0..3 {
        s.step().await.unwrap();
    }
    s.pause().unwrap();
    assert_eq!(s.state(), RunState::Paused);
    assert_eq!(s.step().await.unwrap(), StepOutcome::Paused);
    assert_eq!(s.run().transcript().len(), 3);

    s.resume().unwrap();
    let report = s.run_to_completion().await.unwrap();
    assert_eq!(report.transcript.seats(), expected);
}

#[tokio::test]
async fn test_control_handle_resumes_waiting_loop() {
    let mut s = DebateScheduler::new(registry());
    s.start(config(1)).unwrap();
    let control = s.control();
    control.pause();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        control.resume();
    });

    let report = s.run_to_completion().await.unwrap();
    assert_eq!(report.state, RunState::Finished);
    assert_eq!(report.transcript.len(), 5);
}

#[tokio::test]
async fn test_end_while_paused_analyzes_partial_transcript() {
    let mut s = DebateScheduler::new(registry());
    s.start(config(3)).unwrap();
    s.step().await.unwrap();
    s.step().await.unwrap();
    s.pause().unwrap();

    let report = s.end_now().await.unwrap();
    assert_eq!(report.state, RunState::Finished);
    assert_eq!(report.transcript.len(), 2);
    assert!(report.analysis.unwrap().is_completed());
}

// ── Failures ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_opponent_failure_moves_to_error() {
    let mut registry = registry();
    registry.register(Arc::new(
        ScriptedModel::new(ModelProvider::OpenAi).failing_on_seat(Seat::Opponent),
    ));
    let history = HistoryLog::new(Arc::new(MemoryStore::new()));
    let mut s = DebateScheduler::new(registry).with_history(history.clone());
    s.start(config(2)).unwrap();

    let err = s.run_to_completion().await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(s.state(), RunState::Error);
    assert_eq!(
        s.run().transcript().seats(),
        vec![Seat::Moderator, Seat::Proponent]
    );
    assert!(s.run().last_error().unwrap().contains("Brook"));
    assert!(history.is_empty().unwrap());

    s.reset().unwrap();
    assert_eq!(s.state(), RunState::Configuring);
}

#[tokio::test]
async fn test_analysis_failure_still_finishes() {
    let mut registry = registry();
    registry.register(Arc::new(
        ScriptedModel::new(ModelProvider::Anthropic).failing_analysis(),
    ));
    let mut s = DebateScheduler::new(registry);
    s.start(config(1)).unwrap();

    let report = s.run_to_completion().await.unwrap();
    assert_eq!(report.state, RunState::Finished);
    assert_eq!(report.transcript.len(), 5);
    assert!(matches!(
        report.analysis,
        Some(AnalysisOutcome::Failed { .. })
    ));
    assert!(s.run().last_error().is_some());
}

// ── Cancellation ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_call_discards_late_result() {
    let model = Arc::new(
        ScriptedModel::new(ModelProvider::Anthropic).with_delay(Duration::from_secs(5)),
    );
    let mut registry = registry();
    registry.register(model.clone());
    let mut s = DebateScheduler::new(registry);
    s.start(config(1)).unwrap();

    let control = s.control();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        control.cancel();
    });

    let err = s.run_to_completion().await.unwrap_err();
    assert_eq!(err, SchedulerError::Cancelled);
    assert_eq!(model.calls().len(), 1);
    assert!(s.run().transcript().is_empty());
    assert!(s.run().in_flight().is_none());
}

// ── Checkpoint restore ─────────────────────────────────────────────

#[tokio::test]
async fn test_snapshot_restore_continues_identically() {
    let expected = uninterrupted_seats(2).await;

    let mut s = DebateScheduler::new(registry());
    s.start(config(2)).unwrap();
    for _ in 0..4 {
        s.step().await.unwrap();
    }
    let json = RunSnapshot::capture(s.run()).to_json().unwrap();
    drop(s);

    let (run, status) = RunSnapshot::from_json(&json).unwrap().restore().unwrap();
    assert_eq!(status, IntegrityStatus::Valid);
    assert_eq!(run.state(), RunState::Paused);

    let mut resumed = DebateScheduler::new(registry()).with_run(run);
    assert_eq!(resumed.step().await.unwrap(), StepOutcome::Paused);
    resumed.resume().unwrap();
    let report = resumed.run_to_completion().await.unwrap();
    assert_eq!(report.transcript.seats(), expected);
    assert_eq!(
        report.transcript.last().map(|e| e.kind),
        Some(TurnKind::Closing)
    );
}

// ── History retention ──────────────────────────────────────────────

#[tokio::test]
async fn test_history_keeps_newest_hundred() {
    let store = Arc::new(MemoryStore::new());
    let history = HistoryLog::new(store);

    let mut s = DebateScheduler::new(registry()).with_history(history.clone());
    s.start(config(1)).unwrap();
    let report = s.run_to_completion().await.unwrap();
    let first_id = report.history_id.unwrap();

    let analysis = report.analysis.as_ref().and_then(|a| a.analysis()).unwrap();
    for _ in 0..100 {
        let record = HistoryRecord::new(&config(1), &report.transcript, analysis);
        history.append(&record).unwrap();
    }

    assert_eq!(history.len().unwrap(), 100);
    assert!(history.get(first_id).unwrap().is_none());
}
