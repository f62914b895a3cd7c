//! Persisted user defaults.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{StorageError, StoragePort};
use crate::debate::{ModelProvider, Quality, ResponseLength, Tone, DEFAULT_TURN_LIMIT};

/// Storage key for settings.
pub const SETTINGS_KEY: &str = "settings";

/// Defaults applied to new debates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_provider: ModelProvider,
    pub length: ResponseLength,
    pub quality: Quality,
    pub tone: Tone,
    pub turn_limit: u32,
    /// Delay between turns in milliseconds.
    pub pacing_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_provider: ModelProvider::Gemini,
            length: ResponseLength::default(),
            quality: Quality::default(),
            tone: Tone::default(),
            turn_limit: DEFAULT_TURN_LIMIT,
            pacing_ms: 1500,
        }
    }
}

/// Settings over a storage port.
#[derive(Clone)]
pub struct SettingsStore {
    store: Arc<dyn StoragePort>,
}

impl SettingsStore {
    pub fn new(store: Arc<dyn StoragePort>) -> Self {
        Self { store }
    }

    /// Load settings, falling back to defaults when nothing is stored.
    pub fn load(&self) -> Result<Settings, StorageError> {
        match self.store.get(SETTINGS_KEY)? {
            None => Ok(Settings::default()),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| StorageError::Serialization(e.to_string())),
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<(), StorageError> {
        let value = serde_json::to_value(settings)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.store.set(SETTINGS_KEY, value)
    }

    /// Load, modify, and save in one step.
    pub fn update<F>(&self, f: F) -> Result<Settings, StorageError>
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = self.load()?;
        f(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }
}
