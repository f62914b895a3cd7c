//! OpenAI chat completions provider.

use std::time::Duration;

use async_trait::async_trait;
use debate_scheduler::debate::{
    AnalysisRequest, DebateModel, FinalAnalysis, ModelError, ModelProvider, UtteranceRequest,
};
use serde_json::{json, Value};

use super::{max_tokens, non_empty, parse_analysis, post_json, ANALYSIS_MAX_TOKENS};
use crate::config::ProviderEndpoint;
use crate::prompts::{analysis_prompt, utterance_prompt, Prompt};

pub struct OpenAiModel {
    endpoint: ProviderEndpoint,
    client: reqwest::Client,
}

impl OpenAiModel {
    pub fn new(endpoint: ProviderEndpoint, timeout: Duration) -> Result<Self, ModelError> {
        Ok(Self {
            endpoint,
            client: super::http_client(timeout)?,
        })
    }

    async fn complete(&self, body: Value) -> Result<String, ModelError> {
        let key = self
            .endpoint
            .api_key
            .as_deref()
            .ok_or(ModelError::MissingApiKey(ModelProvider::OpenAi))?;
        let url = format!(
            "{}/chat/completions",
            self.endpoint.base_url.trim_end_matches('/')
        );
        let request = self.client.post(url).bearer_auth(key);
        let response = post_json(ModelProvider::OpenAi, request, &body).await?;
        parse_text(&response)
    }
}

pub fn request_body(model: &str, prompt: &Prompt, max_tokens: u32, json_output: bool) -> Value {
    let temperature = if json_output { 0.2 } else { 0.8 };
    let mut body = json!({
        "model": model,
        "messages": [
            { "role": "system", "content": prompt.system },
            { "role": "user", "content": prompt.user },
        ],
        "max_tokens": max_tokens,
        "temperature": temperature,
    });
    if json_output {
        body["response_format"] = json!({ "type": "json_object" });
    }
    body
}

/// Content of the first choice.
pub fn parse_text(response: &Value) -> Result<String, ModelError> {
    let choice = &response["choices"][0];
    if let Some(refusal) = choice["message"]["refusal"].as_str() {
        return Err(ModelError::RequestFailed(format!("openai refused: {refusal}")));
    }
    let text = choice["message"]["content"]
        .as_str()
        .ok_or(ModelError::EmptyResponse(ModelProvider::OpenAi))?;
    non_empty(ModelProvider::OpenAi, text.to_string())
}

#[async_trait]
impl DebateModel for OpenAiModel {
    fn provider(&self) -> ModelProvider {
        ModelProvider::OpenAi
    }

    async fn generate_utterance(&self, request: &UtteranceRequest) -> Result<String, ModelError> {
        let prompt = utterance_prompt(request);
        let body = request_body(
            &self.endpoint.model,
            &prompt,
            max_tokens(request.config.length),
            false,
        );
        self.complete(body).await
    }

    async fn analyze_debate(&self, request: &AnalysisRequest) -> Result<FinalAnalysis, ModelError> {
        let prompt = analysis_prompt(request);
        let body = request_body(&self.endpoint.model, &prompt, ANALYSIS_MAX_TOKENS, true);
        let text = self.complete(body).await?;
        parse_analysis(ModelProvider::OpenAi, &text)
    }
}
