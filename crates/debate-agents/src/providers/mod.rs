//! HTTP-backed [`DebateModel`] implementations, one per provider.
//!
//! Each provider module keeps its wire format in plain functions
//! (`*_body`, `parse_*`) so request building and response parsing can be
//! tested without a network.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use debate_scheduler::debate::{
    DebateModel, FinalAnalysis, ModelError, ModelProvider, ModelRegistry, ResponseLength,
    ScriptedModel,
};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::config::AgentsConfig;

pub use anthropic::AnthropicModel;
pub use gemini::GeminiModel;
pub use openai::OpenAiModel;

/// Fallback wait when a 429 carries no usable `retry-after`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Output token ceiling for an utterance of the given length.
pub fn max_tokens(length: ResponseLength) -> u32 {
    match length {
        ResponseLength::Brief => 400,
        ResponseLength::Standard => 900,
        ResponseLength::Detailed => 1600,
    }
}

/// Output token ceiling for the analysis.
pub const ANALYSIS_MAX_TOKENS: u32 = 4096;

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, ModelError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ModelError::RequestFailed(format!("failed to create HTTP client: {e}")))
}

/// POST `body` and return the decoded JSON response, mapping HTTP failures
/// onto [`ModelError`].
pub(crate) async fn post_json(
    provider: ModelProvider,
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> Result<serde_json::Value, ModelError> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| ModelError::RequestFailed(format!("{provider}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(provider, status, &body, retry_after));
    }

    response
        .json()
        .await
        .map_err(|e| ModelError::ParseError(format!("{provider}: {e}")))
}

/// Map a non-success HTTP status onto a [`ModelError`].
pub fn status_error(
    provider: ModelProvider,
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> ModelError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ModelError::RateLimited(retry_after.unwrap_or(DEFAULT_RETRY_AFTER));
    }
    let detail: String = body.chars().take(500).collect();
    ModelError::RequestFailed(format!("{provider} API error ({status}): {detail}"))
}

/// Trimmed text, or [`ModelError::EmptyResponse`] when nothing was said.
pub(crate) fn non_empty(provider: ModelProvider, text: String) -> Result<String, ModelError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(ModelError::EmptyResponse(provider))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Pull the JSON object out of a model reply that may wrap it in a code
/// fence or surround it with prose.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => &unfenced[start..=end],
        _ => unfenced,
    }
}

/// Decode a [`FinalAnalysis`] from a model reply.
pub fn parse_analysis(provider: ModelProvider, text: &str) -> Result<FinalAnalysis, ModelError> {
    let json = extract_json(text);
    if json.is_empty() {
        return Err(ModelError::EmptyResponse(provider));
    }
    let mut analysis: FinalAnalysis = serde_json::from_str(json)
        .map_err(|e| ModelError::ParseError(format!("{provider} analysis: {e}")))?;
    for metrics in &mut analysis.participants {
        metrics.logic = metrics.logic.min(10);
        metrics.evidence = metrics.evidence.min(10);
        metrics.rhetoric = metrics.rhetoric.min(10);
    }
    debug!(%provider, participants = analysis.participants.len(), "analysis parsed");
    Ok(analysis)
}

/// Register an HTTP model for every provider with an API key.
pub fn build_registry(config: &AgentsConfig) -> Result<ModelRegistry, ModelError> {
    let mut registry = ModelRegistry::new();
    for provider in config.available_providers() {
        let endpoint = config.endpoint(provider).clone();
        let model: Arc<dyn DebateModel> = match provider {
            ModelProvider::Gemini => Arc::new(GeminiModel::new(endpoint, config.request_timeout)?),
            ModelProvider::OpenAi => Arc::new(OpenAiModel::new(endpoint, config.request_timeout)?),
            ModelProvider::Anthropic => {
                Arc::new(AnthropicModel::new(endpoint, config.request_timeout)?)
            }
        };
        info!(%provider, model = %config.endpoint(provider).model, "provider registered");
        registry.register(model);
    }
    if registry.providers().is_empty() {
        warn!("no provider API keys configured");
    }
    Ok(registry)
}

/// Scripted models for every provider, for offline dry runs.
pub fn dry_run_registry(delay: Duration) -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    for provider in ModelProvider::ALL {
        registry.register(Arc::new(ScriptedModel::new(provider).with_delay(delay)));
    }
    registry
}
