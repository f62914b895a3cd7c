//! Model collaborators: the utterance/analysis capability each provider
//! implements, the registry that selects one per participant, and a
//! scripted implementation for tests and dry runs.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::{ConfigError, DebateConfig};
use super::participant::{ModelProvider, Participant, Seat};
use super::transcript::{Transcript, TurnKind};

/// Errors from a model provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("API key not configured for {0}")]
    MissingApiKey(ModelProvider),

    #[error("Response parse error: {0}")]
    ParseError(String),

    #[error("Rate limited: retry after {0:?}")]
    RateLimited(Duration),

    #[error("{0} returned an empty response")]
    EmptyResponse(ModelProvider),
}

/// Inputs for one utterance.
#[derive(Debug, Clone)]
pub struct UtteranceRequest {
    /// Everything said so far.
    pub transcript: Transcript,
    pub seat: Seat,
    pub speaker: Participant,
    /// 1-based turn number for the seat.
    pub turn: u32,
    pub kind: TurnKind,
    pub config: DebateConfig,
}

impl UtteranceRequest {
    pub fn is_closing(&self) -> bool {
        self.kind == TurnKind::Closing
    }

    pub fn provider(&self) -> ModelProvider {
        self.speaker.provider
    }
}

/// Inputs for the end-of-run analysis.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub transcript: Transcript,
    pub config: DebateConfig,
}

/// Scores for one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ParticipantMetrics {
    /// Display name as it appears in the transcript.
    pub name: String,
    /// Role label (moderator, proponent, opponent, neutral).
    pub role: String,
    /// Soundness of reasoning, 0-10.
    pub logic: u8,
    /// Use of evidence, 0-10.
    pub evidence: u8,
    /// Clarity and persuasiveness, 0-10.
    pub rhetoric: u8,
    /// Strongest points the participant made.
    #[serde(default)]
    pub key_points: Vec<String>,
}

impl ParticipantMetrics {
    pub fn total(&self) -> u32 {
        self.logic as u32 + self.evidence as u32 + self.rhetoric as u32
    }
}

/// Result of the end-of-run analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FinalAnalysis {
    /// Overall summary of the debate.
    pub summary: String,
    /// Per-participant scores.
    #[serde(default)]
    pub participants: Vec<ParticipantMetrics>,
    /// Display name of the winner, if the analyst picked one.
    #[serde(default)]
    pub winner: Option<String>,
}

impl FinalAnalysis {
    /// JSON schema handed to providers that support constrained output.
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(FinalAnalysis)).unwrap_or_default()
    }

    /// First sentence of the summary, capped at 140 characters.
    pub fn summary_line(&self) -> String {
        let first = self
            .summary
            .split_inclusive(['.', '!', '?'])
            .next()
            .unwrap_or("")
            .trim();
        if first.chars().count() > 140 {
            let cut: String = first.chars().take(137).collect();
            format!("{}...", cut.trim_end())
        } else {
            first.to_string()
        }
    }
}

/// One provider's debate capabilities.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DebateModel: Send + Sync {
    /// Provider this model answers for.
    fn provider(&self) -> ModelProvider;

    /// Produce the next utterance for `request.speaker`.
    async fn generate_utterance(&self, request: &UtteranceRequest) -> Result<String, ModelError>;

    /// Summarize and score a finished debate.
    async fn analyze_debate(&self, request: &AnalysisRequest) -> Result<FinalAnalysis, ModelError>;
}

/// Models keyed by provider, chosen once at configuration time.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<ModelProvider, Arc<dyn DebateModel>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model under its own provider, replacing any previous one.
    pub fn register(&mut self, model: Arc<dyn DebateModel>) {
        self.models.insert(model.provider(), model);
    }

    pub fn with(mut self, model: Arc<dyn DebateModel>) -> Self {
        self.register(model);
        self
    }

    pub fn get(&self, provider: ModelProvider) -> Option<Arc<dyn DebateModel>> {
        self.models.get(&provider).cloned()
    }

    pub fn providers(&self) -> Vec<ModelProvider> {
        let mut providers: Vec<ModelProvider> = self.models.keys().copied().collect();
        providers.sort();
        providers
    }

    /// Confirm every provider the config needs is registered.
    pub fn check(&self, config: &DebateConfig) -> Result<(), ConfigError> {
        let mut needed = config.roster.providers();
        needed.extend(config.analysis_provider());
        for provider in needed {
            if !self.models.contains_key(&provider) {
                return Err(ConfigError::ProviderUnavailable(provider));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}

/// Deterministic model for tests and offline dry runs.
///
/// Utterances read `"<name> (<seat>) turn <n>"`, with a `[closing]` or
/// `[opening]` tag for moderator turns. Failures can be scripted per call.
pub struct ScriptedModel {
    provider: ModelProvider,
    delay: Duration,
    fail_on_call: Option<usize>,
    fail_on_seat: Option<Seat>,
    fail_analysis: bool,
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<UtteranceCall>>,
    analyses: Mutex<usize>,
}

/// What a [`ScriptedModel`] was asked to say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtteranceCall {
    pub seat: Seat,
    pub turn: u32,
    pub kind: TurnKind,
    pub transcript_len: usize,
}

impl ScriptedModel {
    pub fn new(provider: ModelProvider) -> Self {
        Self {
            provider,
            delay: Duration::ZERO,
            fail_on_call: None,
            fail_on_seat: None,
            fail_analysis: false,
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            analyses: Mutex::new(0),
        }
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the n-th utterance call (0-based).
    pub fn failing_on_call(mut self, n: usize) -> Self {
        self.fail_on_call = Some(n);
        self
    }

    /// Fail the first utterance requested for `seat`.
    pub fn failing_on_seat(mut self, seat: Seat) -> Self {
        self.fail_on_seat = Some(seat);
        self
    }

    pub fn failing_analysis(mut self) -> Self {
        self.fail_analysis = true;
        self
    }

    /// Canned replies returned in order before falling back to the
    /// generated text.
    pub fn with_replies(mut self, replies: Vec<String>) -> Self {
        if let Ok(queue) = self.replies.get_mut() {
            queue.extend(replies);
        }
        self
    }

    /// Utterance calls received so far, including failed ones.
    pub fn calls(&self) -> Vec<UtteranceCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn analysis_calls(&self) -> usize {
        self.analyses.lock().map(|n| *n).unwrap_or(0)
    }
}

#[async_trait]
impl DebateModel for ScriptedModel {
    fn provider(&self) -> ModelProvider {
        self.provider
    }

    async fn generate_utterance(&self, request: &UtteranceRequest) -> Result<String, ModelError> {
        let index = {
            let mut calls = self
                .calls
                .lock()
                .map_err(|e| ModelError::RequestFailed(e.to_string()))?;
            calls.push(UtteranceCall {
                seat: request.seat,
                turn: request.turn,
                kind: request.kind,
                transcript_len: request.transcript.len(),
            });
            calls.len() - 1
        };

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.fail_on_call == Some(index)
            || (self.fail_on_seat == Some(request.seat) && request.turn == 1)
        {
            return Err(ModelError::RequestFailed(format!(
                "scripted failure on {} turn {}",
                request.seat, request.turn
            )));
        }

        if let Some(reply) = self.replies.lock().ok().and_then(|mut q| q.pop_front()) {
            return Ok(reply);
        }

        let tag = match request.kind {
            TurnKind::Opening => " [opening]",
            TurnKind::Closing => " [closing]",
            TurnKind::Argument => "",
        };
        Ok(format!(
            "{} ({}) turn {}{}",
            request.speaker.name, request.seat, request.turn, tag
        ))
    }

    async fn analyze_debate(&self, request: &AnalysisRequest) -> Result<FinalAnalysis, ModelError> {
        if let Ok(mut n) = self.analyses.lock() {
            *n += 1;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_analysis {
            return Err(ModelError::ParseError("scripted analysis failure".to_string()));
        }

        let participants = request
            .config
            .roster
            .iter()
            .map(|p| ParticipantMetrics {
                name: p.name.clone(),
                role: p.role.to_string(),
                logic: 5,
                evidence: 5,
                rhetoric: 5,
                key_points: Vec::new(),
            })
            .collect();

        Ok(FinalAnalysis {
            summary: format!(
                "Debate on {} ran for {} turns. Both sides held their ground.",
                request.config.topic,
                request.transcript.len()
            ),
            participants,
            winner: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::participant::{Role, Roster};
    use super::*;

    fn config() -> DebateConfig {
        DebateConfig::new(
            "Topic",
            Roster::from_participants(vec![
                Participant::new("m", Role::Moderator, "Mod", ModelProvider::Gemini),
                Participant::new("p", Role::Proponent, "Pro", ModelProvider::OpenAi),
                Participant::new("o", Role::Opponent, "Con", ModelProvider::Gemini),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_registry_check() {
        let registry = ModelRegistry::new().with(Arc::new(ScriptedModel::new(ModelProvider::Gemini)));
        assert_eq!(
            registry.check(&config()).unwrap_err(),
            ConfigError::ProviderUnavailable(ModelProvider::OpenAi)
        );

        let registry = registry.with(Arc::new(ScriptedModel::new(ModelProvider::OpenAi)));
        assert!(registry.check(&config()).is_ok());
        assert_eq!(
            registry.providers(),
            vec![ModelProvider::Gemini, ModelProvider::OpenAi]
        );
    }

    #[test]
    fn test_registry_checks_analysis_provider() {
        let mut config = config();
        config.analysis_provider = Some(ModelProvider::Anthropic);
        let registry = ModelRegistry::new()
            .with(Arc::new(ScriptedModel::new(ModelProvider::Gemini)))
            .with(Arc::new(ScriptedModel::new(ModelProvider::OpenAi)));
        assert_eq!(
            registry.check(&config).unwrap_err(),
            ConfigError::ProviderUnavailable(ModelProvider::Anthropic)
        );
    }

    #[test]
    fn test_summary_line() {
        let analysis = FinalAnalysis {
            summary: "The proponent carried the room. The opponent rallied late.".to_string(),
            participants: vec![],
            winner: Some("Pro".to_string()),
        };
        assert_eq!(analysis.summary_line(), "The proponent carried the room.");

        let long = FinalAnalysis {
            summary: "x".repeat(300),
            participants: vec![],
            winner: None,
        };
        assert_eq!(long.summary_line().chars().count(), 140);
        assert!(long.summary_line().ends_with("..."));
    }

    #[test]
    fn test_schema_has_summary() {
        let schema = FinalAnalysis::json_schema();
        assert!(schema["properties"]["summary"].is_object());
        assert!(schema["properties"]["participants"].is_object());
    }

    #[test]
    fn test_metrics_total() {
        let m = ParticipantMetrics {
            name: "Pro".to_string(),
            role: "proponent".to_string(),
            logic: 7,
            evidence: 6,
            rhetoric: 9,
            key_points: vec![],
        };
        assert_eq!(m.total(), 22);
    }

    #[tokio::test]
    async fn test_scripted_model_records_calls() {
        let model = ScriptedModel::new(ModelProvider::Gemini);
        let config = config();
        let speaker = config.roster.moderator().unwrap().clone();
        let request = UtteranceRequest {
            transcript: Transcript::new(),
            seat: Seat::Moderator,
            speaker,
            turn: 1,
            kind: TurnKind::Opening,
            config,
        };
        let text = model.generate_utterance(&request).await.unwrap();
        assert_eq!(text, "Mod (moderator) turn 1 [opening]");
        assert_eq!(model.calls().len(), 1);
        assert_eq!(model.calls()[0].kind, TurnKind::Opening);
    }

    #[test]
    fn test_model_error_display() {
        assert!(ModelError::MissingApiKey(ModelProvider::Gemini)
            .to_string()
            .contains("gemini"));
        assert!(ModelError::EmptyResponse(ModelProvider::OpenAi)
            .to_string()
            .contains("empty"));
    }
}
