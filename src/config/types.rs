//! Core configuration types
//!
//! This module contains `AppConfig` and its sections. Every field has a
//! default so a partial JSON file (or none at all) is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::utils::{DEFAULT_MAX_ROUNDS, DEFAULT_PROXY_BASE};

/// Wire style used to talk to the reasoning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WireStyle {
    /// OpenAI-compatible client: `{base_url}/chat/completions` with a bearer key.
    #[default]
    Sdk,
    /// Raw HTTP POST to a fully specified endpoint.
    RawHttp,
}

/// Which web search backend the verification loop uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchProvider {
    /// JSON search API at `search.endpoint`.
    #[default]
    Api,
    /// DuckDuckGo through the shared browser session.
    Duckduckgo,
    /// Every search request fails (the loop degrades gracefully).
    Disabled,
}

/// Top-level configuration object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub reasoning: ReasoningSettings,
    pub search: SearchSettings,
    pub acquisition: AcquisitionSettings,
}

/// Reasoning service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningSettings {
    pub wire_style: WireStyle,
    pub api_key: Option<String>,
    /// Base URL for the SDK style; `/chat/completions` is appended.
    pub base_url: String,
    /// Full endpoint for the raw HTTP style.
    pub endpoint: Option<String>,
    /// Header carrying the key in the raw HTTP style.
    pub auth_header: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Total reasoning calls per verification.
    pub max_rounds: u32,
}

impl Default for ReasoningSettings {
    fn default() -> Self {
        Self {
            wire_style: WireStyle::Sdk,
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            endpoint: None,
            auth_header: "Authorization".to_string(),
            model: "gpt-4o".to_string(),
            temperature: 0.2,
            timeout_secs: 120,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

/// Web search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub provider: SearchProvider,
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Results requested per query.
    pub count: usize,
    pub timeout_secs: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            provider: SearchProvider::Api,
            endpoint: "https://api.bochaai.com/v1/web-search".to_string(),
            api_key: None,
            count: 8,
            timeout_secs: 20,
        }
    }
}

/// Page acquisition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    pub headless: bool,
    /// Soft timeout for the main navigation.
    pub navigation_timeout_secs: u64,
    /// Fixed wait used when navigation does not settle in time.
    pub fallback_wait_ms: u64,
    /// Block image requests in the browser (media, fonts and websockets are
    /// always blocked).
    pub block_images: bool,
    /// Idle time after which the shared browser session is torn down.
    pub session_idle_secs: u64,
    /// Directory for anomaly metadata and raw-page snapshots.
    pub anomaly_dir: PathBuf,
    /// Same-origin image proxy path prefix.
    pub proxy_base: String,
    /// Timeout for a single image probe.
    pub probe_timeout_secs: u64,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        let anomaly_dir = dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("kodegen")
            .join("veracity")
            .join("anomalies");

        Self {
            headless: true,
            navigation_timeout_secs: 20,
            fallback_wait_ms: 2_000,
            block_images: true,
            session_idle_secs: 30,
            anomaly_dir,
            proxy_base: DEFAULT_PROXY_BASE.to_string(),
            probe_timeout_secs: 5,
        }
    }
}
