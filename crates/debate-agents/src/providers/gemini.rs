//! Google Gemini `generateContent` provider.

use std::time::Duration;

use async_trait::async_trait;
use debate_scheduler::debate::{
    AnalysisRequest, DebateModel, FinalAnalysis, ModelError, ModelProvider, UtteranceRequest,
};
use serde_json::{json, Value};

use super::{max_tokens, non_empty, parse_analysis, post_json, ANALYSIS_MAX_TOKENS};
use crate::config::ProviderEndpoint;
use crate::prompts::{analysis_prompt, utterance_prompt, Prompt};

pub struct GeminiModel {
    endpoint: ProviderEndpoint,
    client: reqwest::Client,
}

impl GeminiModel {
    pub fn new(endpoint: ProviderEndpoint, timeout: Duration) -> Result<Self, ModelError> {
        Ok(Self {
            endpoint,
            client: super::http_client(timeout)?,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.base_url.trim_end_matches('/'),
            self.endpoint.model
        )
    }

    async fn generate(&self, body: Value) -> Result<String, ModelError> {
        let key = self
            .endpoint
            .api_key
            .as_deref()
            .ok_or(ModelError::MissingApiKey(ModelProvider::Gemini))?;
        let request = self.client.post(self.url()).header("x-goog-api-key", key);
        let response = post_json(ModelProvider::Gemini, request, &body).await?;
        parse_text(&response)
    }
}

/// Request body. `json_output` asks for a JSON reply.
pub fn request_body(prompt: &Prompt, max_output_tokens: u32, json_output: bool) -> Value {
    let temperature = if json_output { 0.2 } else { 0.8 };
    let mut generation = json!({
        "temperature": temperature,
        "maxOutputTokens": max_output_tokens,
    });
    if json_output {
        generation["responseMimeType"] = json!("application/json");
    }
    json!({
        "systemInstruction": { "parts": [{ "text": prompt.system }] },
        "contents": [{ "role": "user", "parts": [{ "text": prompt.user }] }],
        "generationConfig": generation,
    })
}

/// Concatenated text parts of the first candidate.
pub fn parse_text(response: &Value) -> Result<String, ModelError> {
    if let Some(reason) = response["promptFeedback"]["blockReason"].as_str() {
        return Err(ModelError::RequestFailed(format!(
            "gemini blocked the prompt: {reason}"
        )));
    }
    let parts = response["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or(ModelError::EmptyResponse(ModelProvider::Gemini))?;
    let text = parts
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect::<Vec<_>>()
        .join("");
    non_empty(ModelProvider::Gemini, text)
}

#[async_trait]
impl DebateModel for GeminiModel {
    fn provider(&self) -> ModelProvider {
        ModelProvider::Gemini
    }

    async fn generate_utterance(&self, request: &UtteranceRequest) -> Result<String, ModelError> {
        let prompt = utterance_prompt(request);
        let body = request_body(&prompt, max_tokens(request.config.length), false);
        self.generate(body).await
    }

    async fn analyze_debate(&self, request: &AnalysisRequest) -> Result<FinalAnalysis, ModelError> {
        let prompt = analysis_prompt(request);
        let body = request_body(&prompt, ANALYSIS_MAX_TOKENS, true);
        let text = self.generate(body).await?;
        parse_analysis(ModelProvider::Gemini, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> Prompt {
        Prompt {
            system: "sys".to_string(),
            user: "usr".to_string(),
        }
    }

    #[test]
    fn test_request_body_shape() {
        let body = request_body(&prompt(), 900, false);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "usr");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 900);
        assert!(body["generationConfig"]["responseMimeType"].is_null());

        let body = request_body(&prompt(), 4096, true);
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn test_parse_text_joins_parts() {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Hello " }, { "text": "world" }] } }]
        });
        assert_eq!(parse_text(&response).unwrap(), "Hello world");
    }

    #[test]
    fn test_parse_text_blocked_and_empty() {
        let blocked = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert!(parse_text(&blocked).unwrap_err().to_string().contains("SAFETY"));
        assert_eq!(
            parse_text(&json!({ "candidates": [] })).unwrap_err(),
            ModelError::EmptyResponse(ModelProvider::Gemini)
        );
    }

    #[test]
    fn test_url() {
        let model = GeminiModel::new(
            ProviderEndpoint {
                base_url: "https://example.test/v1beta/".to_string(),
                model: "gemini-x".to_string(),
                api_key: None,
            },
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            model.url(),
            "https://example.test/v1beta/models/gemini-x:generateContent"
        );
    }

    #[tokio::test]
    async fn test_missing_key() {
        let model = GeminiModel::new(
            ProviderEndpoint {
                base_url: "https://example.test".to_string(),
                model: "gemini-x".to_string(),
                api_key: None,
            },
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            model.generate(json!({})).await.unwrap_err(),
            ModelError::MissingApiKey(ModelProvider::Gemini)
        );
    }
}
