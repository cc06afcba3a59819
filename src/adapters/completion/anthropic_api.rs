//! Anthropic Messages API completion backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CompletionRequest, CompletionResponse};
use crate::domain::ports::CompletionService;

/// Configuration for the Anthropic API backend.
#[derive(Debug, Clone)]
pub struct AnthropicApiConfig {
    /// API key (will be read from ANTHROPIC_API_KEY env if not set).
    pub api_key: Option<String>,
    /// API base URL.
    pub base_url: String,
    /// Model to use.
    pub model: String,
    /// API version header.
    pub api_version: String,
    /// Max tokens to generate.
    pub max_tokens: u32,
}

impl Default for AnthropicApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            api_version: "2023-06-01".to_string(),
            max_tokens: 4096,
        }
    }
}

impl AnthropicApiConfig {
    /// Get API key from config or environment.
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Completion backend calling the Messages API over HTTP.
pub struct AnthropicApiCompletion {
    config: AnthropicApiConfig,
    client: Client,
}

impl AnthropicApiCompletion {
    pub fn new(config: AnthropicApiConfig) -> DomainResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| DomainError::ValidationFailed(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl CompletionService for AnthropicApiCompletion {
    fn name(&self) -> &'static str {
        "anthropic_api"
    }

    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn complete(&self, request: CompletionRequest) -> DomainResult<CompletionResponse> {
        let api_key = self
            .config
            .get_api_key()
            .ok_or_else(|| DomainError::ValidationFailed("ANTHROPIC_API_KEY not set".to_string()))?;

        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            system: request.system_prompt.as_deref().filter(|s| !s.is_empty()),
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
        };

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url.trim_end_matches('/')))
            .header("content-type", "application/json")
            .header("x-api-key", &api_key)
            .header("anthropic-version", &self.config.api_version)
            .timeout(Duration::from_millis(request.timeout_ms))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!(timeout_ms = request.timeout_ms, "Anthropic API completion timed out");
                    DomainError::CompletionTimeout(request.timeout_ms)
                } else {
                    DomainError::CompletionFailed(format!("Anthropic API request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::CompletionFailed(format!("Anthropic API error {status}: {body}")));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| DomainError::CompletionFailed(format!("Failed to parse API response: {e}")))?;

        let text = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if text.is_empty() {
            return Err(DomainError::CompletionFailed("API returned no text content".to_string()));
        }

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = started.elapsed().as_millis() as u64;
        debug!(duration_ms, chars = text.len(), "Anthropic API completion finished");
        Ok(CompletionResponse { text, duration_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base_url: String) -> AnthropicApiCompletion {
        AnthropicApiCompletion::new(AnthropicApiConfig {
            api_key: Some("test-key".to_string()),
            base_url,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_extracts_text_blocks() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "test-key")
            .match_header("anthropic-version", "2023-06-01")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id":"msg_1","type":"message","content":[{"type":"text","text":"{\"ok\":true}"},{"type":"tool_use","id":"t","name":"x","input":{}}]}"#,
            )
            .create_async()
            .await;

        let response = backend(server.url())
            .complete(CompletionRequest::new("hello").with_system_prompt("json only"))
            .await
            .unwrap();

        assert_eq!(response.text, r#"{"ok":true}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_is_completion_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(529)
            .with_body("overloaded")
            .create_async()
            .await;

        let err = backend(server.url())
            .complete(CompletionRequest::new("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::CompletionFailed(msg) if msg.contains("overloaded")));
    }

    #[tokio::test]
    async fn test_empty_content_is_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_body(r#"{"content":[]}"#)
            .create_async()
            .await;

        assert!(backend(server.url()).complete(CompletionRequest::new("hello")).await.is_err());
    }
}
