//! Provider endpoints from the environment and debate definitions from TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use debate_scheduler::debate::{
    DebateConfig, ModelProvider, Participant, Quality, ResponseLength, Role, Roster, RosterError,
    Seat, Tone,
};
use debate_scheduler::storage::Settings;
use serde::Deserialize;
use thiserror::Error;

/// One provider's HTTP endpoint.
#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub model: String,
    /// `None` when the key variable is unset or empty.
    pub api_key: Option<String>,
}

impl ProviderEndpoint {
    fn from_env(key_var: &str, url_var: &str, model_var: &str, url: &str, model: &str) -> Self {
        Self {
            base_url: std::env::var(url_var).unwrap_or_else(|_| url.into()),
            model: std::env::var(model_var).unwrap_or_else(|_| model.into()),
            api_key: std::env::var(key_var).ok().filter(|k| !k.trim().is_empty()),
        }
    }
}

/// Top-level runner configuration.
#[derive(Debug, Clone)]
pub struct AgentsConfig {
    pub gemini: ProviderEndpoint,
    pub openai: ProviderEndpoint,
    pub anthropic: ProviderEndpoint,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// JSON file backing history and settings.
    pub store_path: PathBuf,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            gemini: ProviderEndpoint::from_env(
                "GEMINI_API_KEY",
                "DEBATE_GEMINI_URL",
                "DEBATE_GEMINI_MODEL",
                "https://generativelanguage.googleapis.com/v1beta",
                "gemini-2.0-flash",
            ),
            openai: ProviderEndpoint::from_env(
                "OPENAI_API_KEY",
                "DEBATE_OPENAI_URL",
                "DEBATE_OPENAI_MODEL",
                "https://api.openai.com/v1",
                "gpt-4o-mini",
            ),
            anthropic: ProviderEndpoint::from_env(
                "ANTHROPIC_API_KEY",
                "DEBATE_ANTHROPIC_URL",
                "DEBATE_ANTHROPIC_MODEL",
                "https://api.anthropic.com/v1",
                "claude-sonnet-4-20250514",
            ),
            request_timeout: Duration::from_secs(
                std::env::var("DEBATE_REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            store_path: std::env::var("DEBATE_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("debate-store.json")),
        }
    }
}

impl AgentsConfig {
    pub fn endpoint(&self, provider: ModelProvider) -> &ProviderEndpoint {
        match provider {
            ModelProvider::Gemini => &self.gemini,
            ModelProvider::OpenAi => &self.openai,
            ModelProvider::Anthropic => &self.anthropic,
        }
    }

    /// Providers with an API key configured.
    pub fn available_providers(&self) -> Vec<ModelProvider> {
        ModelProvider::ALL
            .into_iter()
            .filter(|p| self.endpoint(*p).api_key.is_some())
            .collect()
    }
}

/// Errors loading a debate definition.
#[derive(Debug, Error)]
pub enum DebateFileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid debate file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0}")]
    Roster(#[from] RosterError),

    #[error("invalid starter: {0}")]
    Starter(String),
}

/// A participant as written in a debate file. Provider falls back to the
/// stored default.
#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantEntry {
    pub id: String,
    pub role: Role,
    pub name: String,
    #[serde(default)]
    pub provider: Option<ModelProvider>,
    #[serde(default)]
    pub persona: Option<String>,
}

/// A debate definition as written in TOML.
///
/// ```toml
/// topic = "Should cities ban private cars?"
/// focus_points = ["congestion", "equity"]
/// starter = "opponent"
///
/// [[participants]]
/// id = "mod"
/// role = "moderator"
/// name = "Moderator"
/// provider = "anthropic"
/// ```
///
/// Presets, turn limit, and providers left out take the stored settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DebateFile {
    pub topic: String,
    #[serde(default)]
    pub focus_points: Vec<String>,
    #[serde(default)]
    pub starter: Option<String>,
    #[serde(default)]
    pub turn_limit: Option<u32>,
    #[serde(default)]
    pub length: Option<ResponseLength>,
    #[serde(default)]
    pub quality: Option<Quality>,
    #[serde(default)]
    pub tone: Option<Tone>,
    #[serde(default)]
    pub analysis_provider: Option<ModelProvider>,
    pub participants: Vec<ParticipantEntry>,
}

impl DebateFile {
    pub fn load(path: &Path) -> Result<Self, DebateFileError> {
        let text = std::fs::read_to_string(path).map_err(|source| DebateFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, DebateFileError> {
        Ok(toml::from_str(text)?)
    }

    /// Build a config, filling gaps from `settings`. Run-level validation
    /// happens when the debate starts.
    pub fn into_config(self, settings: &Settings) -> Result<DebateConfig, DebateFileError> {
        let participants = self
            .participants
            .into_iter()
            .map(|entry| {
                let provider = entry.provider.unwrap_or(settings.default_provider);
                let participant =
                    Participant::new(&entry.id, entry.role, &entry.name, provider);
                match entry.persona {
                    Some(persona) => participant.with_persona(persona),
                    None => participant,
                }
            })
            .collect();
        let roster = Roster::from_participants(participants)?;

        let mut config = DebateConfig::new(&self.topic, roster)
            .with_turn_limit(self.turn_limit.unwrap_or(settings.turn_limit))
            .with_focus_points(self.focus_points);
        if let Some(starter) = self.starter {
            let seat = starter.parse::<Seat>().map_err(DebateFileError::Starter)?;
            config = config.with_starter(seat);
        }
        config.length = self.length.unwrap_or(settings.length);
        config.quality = self.quality.unwrap_or(settings.quality);
        config.tone = self.tone.unwrap_or(settings.tone);
        config.analysis_provider = self.analysis_provider;
        Ok(config)
    }
}
