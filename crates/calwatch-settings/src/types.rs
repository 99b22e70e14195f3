//! Settings sections. Every section fills missing keys from its `Default`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use calwatch_engine::WindowPolicy;

/// Root of `~/.calwatch/settings.json`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalwatchSettings {
    pub window: WindowSettings,
    pub extraction: ExtractionSettings,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WindowSettings {
    /// Messages buffered per conversation before a pass runs.
    pub capacity: usize,
    pub policy: WindowPolicy,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            capacity: 2,
            policy: WindowPolicy::Drain,
        }
    }
}

/// Chat-completions endpoint used for extraction. The API key is not part
/// of the settings file; it comes from `CALWATCH_API_KEY`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractionSettings {
    pub base_url: String,
    pub model: String,
    pub timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_ms: 30_000,
            temperature: Some(0.0),
            max_tokens: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Confirmations buffered per WebSocket subscriber before lagging.
    pub outbound_buffer: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            outbound_buffer: 256,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    /// Per-module level overrides, e.g. `{"calwatch_llm": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            modules: BTreeMap::new(),
        }
    }
}
