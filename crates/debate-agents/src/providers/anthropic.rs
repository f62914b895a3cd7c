//! Anthropic messages provider.

use std::time::Duration;

use async_trait::async_trait;
use debate_scheduler::debate::{
    AnalysisRequest, DebateModel, FinalAnalysis, ModelError, ModelProvider, UtteranceRequest,
};
use serde_json::{json, Value};

use super::{max_tokens, non_empty, parse_analysis, post_json, ANALYSIS_MAX_TOKENS};
use crate::config::ProviderEndpoint;
use crate::prompts::{analysis_prompt, utterance_prompt, Prompt};

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicModel {
    endpoint: ProviderEndpoint,
    client: reqwest::Client,
}

impl AnthropicModel {
    pub fn new(endpoint: ProviderEndpoint, timeout: Duration) -> Result<Self, ModelError> {
        Ok(Self {
            endpoint,
            client: super::http_client(timeout)?,
        })
    }

    async fn send(&self, body: Value) -> Result<String, ModelError> {
        let key = self
            .endpoint
            .api_key
            .as_deref()
            .ok_or(ModelError::MissingApiKey(ModelProvider::Anthropic))?;
        let url = format!("{}/messages", self.endpoint.base_url.trim_end_matches('/'));
        let request = self
            .client
            .post(url)
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION);
        let response = post_json(ModelProvider::Anthropic, request, &body).await?;
        parse_text(&response)
    }
}

pub fn request_body(model: &str, prompt: &Prompt, max_tokens: u32) -> Value {
    json!({
        "model": model,
        "max_tokens": max_tokens,
        "system": prompt.system,
        "messages": [{ "role": "user", "content": prompt.user }],
    })
}

/// Concatenated text blocks of the reply.
pub fn parse_text(response: &Value) -> Result<String, ModelError> {
    let blocks = response["content"]
        .as_array()
        .ok_or(ModelError::EmptyResponse(ModelProvider::Anthropic))?;
    let text = blocks
        .iter()
        .filter(|b| b["type"] == "text")
        .filter_map(|b| b["text"].as_str())
        .collect::<Vec<_>>()
        .join("");
    non_empty(ModelProvider::Anthropic, text)
}

#[async_trait]
impl DebateModel for AnthropicModel {
    fn provider(&self) -> ModelProvider {
        ModelProvider::Anthropic
    }

    async fn generate_utterance(&self, request: &UtteranceRequest) -> Result<String, ModelError> {
        let prompt = utterance_prompt(request);
        let body = request_body(&self.endpoint.model, &prompt, max_tokens(request.config.length));
        self.send(body).await
    }

    async fn analyze_debate(&self, request: &AnalysisRequest) -> Result<FinalAnalysis, ModelError> {
        let prompt = analysis_prompt(request);
        let body = request_body(&self.endpoint.model, &prompt, ANALYSIS_MAX_TOKENS);
        let text = self.send(body).await?;
        parse_analysis(ModelProvider::Anthropic, &text)
    }
}
