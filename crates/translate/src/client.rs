#![forbid(unsafe_code)]

use crate::TranslateError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_ERROR_BODY_CHARS: usize = 2_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// The external text-in/text-out model call.
pub trait CompletionClient: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, TranslateError>;
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.anthropic.com".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Blocking client for the Anthropic messages endpoint.
pub struct AnthropicClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
}

impl AnthropicClient {
    pub fn new(config: ClientConfig) -> Result<Self, TranslateError> {
        if config.api_key.trim().is_empty() {
            return Err(TranslateError::NotConfigured);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| TranslateError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: messages_endpoint(&config.base_url),
            api_key: config.api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl CompletionClient for AnthropicClient {
    fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, TranslateError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .map_err(|err| TranslateError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "translation service returned an error");
            return Err(TranslateError::Status {
                status: status.as_u16(),
                body: truncate_chars(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        response
            .json::<CompletionResponse>()
            .map_err(|err| TranslateError::Malformed(err.to_string()))
    }
}

fn messages_endpoint(base_url: &str) -> String {
    format!("{}/v1/messages", base_url.trim().trim_end_matches('/'))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out = text.chars().take(max_chars.saturating_sub(1)).collect::<String>();
    out.push('\u{2026}');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_normalizes_trailing_slash() {
        assert_eq!(
            messages_endpoint("https://api.anthropic.com/"),
            "https://api.anthropic.com/v1/messages"
        );
        assert_eq!(
            messages_endpoint("http://localhost:9000"),
            "http://localhost:9000/v1/messages"
        );
    }

    #[test]
    fn missing_key_is_not_configured() {
        let err = AnthropicClient::new(ClientConfig::default()).err();
        assert!(matches!(err, Some(TranslateError::NotConfigured)));
    }

    #[test]
    fn request_wire_shape() {
        let request = CompletionRequest {
            model: "m".to_string(),
            max_tokens: 1000,
            messages: vec![Message::user("hi")],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "model": "m",
                "max_tokens": 1000,
                "messages": [{"role": "user", "content": "hi"}]
            })
        );
    }

    #[test]
    fn response_ignores_unrelated_fields() {
        let raw = r#"{"id":"msg_1","type":"message","content":[{"type":"text","text":"{\"sql\":\"SELECT 1\"}"}],"usage":{"input_tokens":1}}"#;
        let parsed: CompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.content.len(), 1);
        assert_eq!(parsed.content[0].text.as_deref(), Some("{\"sql\":\"SELECT 1\"}"));
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(5_000);
        let out = truncate_chars(&body, 10);
        assert_eq!(out.chars().count(), 10);
        assert!(out.ends_with('\u{2026}'));
    }

    #[test]
    fn unreachable_service_is_a_transport_failure() {
        let client = AnthropicClient::new(ClientConfig {
            api_key: "k".to_string(),
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
        })
        .unwrap();
        let request = CompletionRequest {
            model: "m".to_string(),
            max_tokens: 1,
            messages: vec![Message::user("q")],
        };
        assert!(matches!(
            client.complete(&request),
            Err(TranslateError::Transport(_))
        ));
    }
}
