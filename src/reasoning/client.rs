//! Chat-completion clients for the two wire styles.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::ReasoningService;
use super::types::ChatMessage;
use crate::config::{ConfigHandle, ReasoningSettings, WireStyle};
use crate::utils::truncate_chars;

#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("Reasoning service is not configured: {0}")]
    NotConfigured(&'static str),

    #[error("Reasoning request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Reasoning service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Reasoning response is not JSON: {0}")]
    InvalidJson(String),

    #[error("Reasoning service returned no assistant text")]
    EmptyResponse,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

/// Assistant text from a completion body.
///
/// Understands `choices[0].message.content` (string or parts),
/// `choices[0].text`, and top-level `output_text`/`response` as used by
/// some self-hosted gateways.
pub fn extract_assistant_text(root: &Value) -> Option<String> {
    let choice = root.get("choices").and_then(|c| c.get(0));
    let from_message = choice
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|content| match content {
            Value::String(s) => Some(s.clone()),
            Value::Array(parts) => Some(
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect::<String>(),
            ),
            _ => None,
        });

    from_message
        .or_else(|| choice.and_then(|c| c.get("text")).and_then(Value::as_str).map(str::to_string))
        .or_else(|| root.get("output_text").and_then(Value::as_str).map(str::to_string))
        .or_else(|| root.get("response").and_then(Value::as_str).map(str::to_string))
        .filter(|s| !s.trim().is_empty())
}

async fn read_completion(response: reqwest::Response) -> Result<String, ReasoningError> {
    let status = response.status();
    let body = response.text().await?;
    debug!(status = %status, bytes = body.len(), "Reasoning response");

    if !status.is_success() {
        return Err(ReasoningError::Status {
            status: status.as_u16(),
            body: truncate_chars(&body, 500, "…"),
        });
    }

    let root: Value =
        serde_json::from_str(&body).map_err(|e| ReasoningError::InvalidJson(e.to_string()))?;
    extract_assistant_text(&root).ok_or(ReasoningError::EmptyResponse)
}

fn api_key(settings: &ReasoningSettings) -> Option<&str> {
    settings.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
}

/// OpenAI-compatible client: `{base_url}/chat/completions` with a bearer key.
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    config: Arc<ConfigHandle>,
}

impl ChatCompletionsClient {
    pub fn new(config: Arc<ConfigHandle>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn send(&self, messages: &[ChatMessage]) -> Result<String, ReasoningError> {
        let config = self.config.get();
        let settings = &config.reasoning;
        let key = api_key(settings).ok_or(ReasoningError::NotConfigured("missing API key"))?;
        let endpoint = format!("{}/chat/completions", settings.base_url.trim_end_matches('/'));

        let body = ChatRequest {
            model: &settings.model,
            messages,
            temperature: settings.temperature,
            stream: false,
            response_format: Some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        debug!(endpoint = %endpoint, messages = messages.len(), "Chat completion request");
        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(key)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .json(&body)
            .send()
            .await?;
        read_completion(response).await
    }
}

#[async_trait]
impl ReasoningService for ChatCompletionsClient {
    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        Ok(self.send(messages).await?)
    }

    fn check_ready(&self) -> Result<(), String> {
        match api_key(&self.config.get().reasoning) {
            Some(_) => Ok(()),
            None => Err("reasoning API key is not set".to_string()),
        }
    }
}

/// Raw HTTP POST to a configured endpoint, key in a configurable header.
pub struct RawHttpClient {
    client: reqwest::Client,
    config: Arc<ConfigHandle>,
}

impl RawHttpClient {
    pub fn new(config: Arc<ConfigHandle>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn send(&self, messages: &[ChatMessage]) -> Result<String, ReasoningError> {
        let config = self.config.get();
        let settings = &config.reasoning;
        let endpoint = settings
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(ReasoningError::NotConfigured("missing raw endpoint"))?;

        let body = ChatRequest {
            model: &settings.model,
            messages,
            temperature: settings.temperature,
            stream: false,
            response_format: None,
        };

        let mut request = self
            .client
            .post(endpoint)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .json(&body);
        if let Some(key) = api_key(settings) {
            let value = if settings.auth_header.eq_ignore_ascii_case("authorization") {
                format!("Bearer {key}")
            } else {
                key.to_string()
            };
            request = request.header(settings.auth_header.as_str(), value);
        }

        debug!(endpoint = %endpoint, messages = messages.len(), "Raw reasoning request");
        read_completion(request.send().await?).await
    }
}

#[async_trait]
impl ReasoningService for RawHttpClient {
    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        Ok(self.send(messages).await?)
    }

    fn check_ready(&self) -> Result<(), String> {
        match &self.config.get().reasoning.endpoint {
            Some(e) if !e.trim().is_empty() => Ok(()),
            _ => Err("raw reasoning endpoint is not set".to_string()),
        }
    }
}

/// Picks the wire style from the current configuration on every call.
pub struct ConfiguredReasoning {
    config: Arc<ConfigHandle>,
    sdk: ChatCompletionsClient,
    raw: RawHttpClient,
}

impl ConfiguredReasoning {
    pub fn new(config: Arc<ConfigHandle>) -> Self {
        Self {
            sdk: ChatCompletionsClient::new(Arc::clone(&config)),
            raw: RawHttpClient::new(Arc::clone(&config)),
            config,
        }
    }

    fn active(&self) -> &dyn ReasoningService {
        match self.config.get().reasoning.wire_style {
            WireStyle::Sdk => &self.sdk,
            WireStyle::RawHttp => &self.raw,
        }
    }
}

#[async_trait]
impl ReasoningService for ConfiguredReasoning {
    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        self.active().complete(messages).await
    }

    fn check_ready(&self) -> Result<(), String> {
        self.active().check_ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assistant_text_shapes() {
        assert_eq!(
            extract_assistant_text(&json!({"choices":[{"message":{"content":"{\"a\":1}"}}]})),
            Some("{\"a\":1}".to_string())
        );
        assert_eq!(
            extract_assistant_text(
                &json!({"choices":[{"message":{"content":[{"type":"text","text":"ab"},{"type":"text","text":"c"}]}}]})
            ),
            Some("abc".to_string())
        );
        assert_eq!(
            extract_assistant_text(&json!({"output_text": "x"})),
            Some("x".to_string())
        );
        assert_eq!(
            extract_assistant_text(&json!({"choices":[{"message":{"content":""}}]})),
            None
        );
    }
}
