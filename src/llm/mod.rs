//! Language-model client abstraction and the llama.cpp adapter.
//!
//! The client speaks the OpenAI-compatible chat API exposed by `llama-server`. Transport
//! failures are reported as [`LlmClientError::Unavailable`] and are never confused with
//! malformed model output, which is the concern of [`structured`].

pub mod structured;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors raised while talking to a language-model server.
#[derive(Debug, Error)]
pub enum LlmClientError {
    /// Server could not be reached or the request timed out.
    #[error("Language model unavailable: {0}")]
    Unavailable(String),
    /// Server answered with a non-success status.
    #[error("Completion request failed: {0}")]
    RequestFailed(String),
    /// Server response body could not be decoded.
    #[error("Malformed completion response: {0}")]
    InvalidResponse(String),
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions framing the conversation.
    System,
    /// Caller-supplied prompt.
    User,
    /// Model reply.
    Assistant,
}

/// Single chat message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Message author.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Build a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Build a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Sampling options forwarded with each completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    /// Optional model name; llama.cpp serves a single model and ignores it.
    pub model: Option<String>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

/// Interface implemented by chat-completion backends.
#[async_trait]
pub trait LanguageModelClient: Send + Sync {
    /// Report whether the server is reachable and ready.
    async fn check_status(&self) -> bool;

    /// Send a conversation and return the model's raw reply text.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, LlmClientError>;
}

/// Client for a llama.cpp server's OpenAI-compatible endpoints.
pub struct LlamaCppClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl LlamaCppClient {
    /// Build a client for the server at `base_url`.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, LlmClientError> {
        let http = Client::builder()
            .user_agent("privascan/0.1")
            .timeout(COMPLETION_TIMEOUT)
            .build()
            .map_err(|error| LlmClientError::Unavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) if !key.is_empty() => request.bearer_auth(key),
            _ => request,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LanguageModelClient for LlamaCppClient {
    async fn check_status(&self) -> bool {
        let request = self
            .authorize(self.http.get(self.endpoint("health")))
            .timeout(HEALTH_TIMEOUT);
        match request.send().await {
            Ok(response) => {
                let healthy = response.status().is_success();
                tracing::debug!(status = %response.status(), healthy, "Language model health check");
                healthy
            }
            Err(error) => {
                tracing::warn!(url = %self.base_url, error = %error, "Language model unreachable");
                false
            }
        }
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, LlmClientError> {
        let mut payload = json!({
            "messages": messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "stream": false,
        });
        if let Some(model) = options.model.as_deref()
            && let Some(object) = payload.as_object_mut()
        {
            object.insert("model".into(), model.into());
        }

        let response = self
            .authorize(self.http.post(self.endpoint("v1/chat/completions")))
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                LlmClientError::Unavailable(format!(
                    "failed to reach llama.cpp at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmClientError::RequestFailed(format!(
                "llama.cpp returned {status}: {body}"
            )));
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|error| {
            LlmClientError::InvalidResponse(format!("failed to decode completion: {error}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmClientError::InvalidResponse("completion had no choices".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{GET, POST},
        MockServer,
    };

    fn client_for(server: &MockServer) -> LlamaCppClient {
        LlamaCppClient::new(server.base_url(), None).expect("client")
    }

    #[tokio::test]
    async fn health_check_reports_ready_server() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(200).json_body(json!({ "status": "ok" }));
            })
            .await;

        assert!(client_for(&server).check_status().await);
        mock.assert();
    }

    #[tokio::test]
    async fn health_check_fails_on_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(503).body("loading model");
            })
            .await;

        assert!(!client_for(&server).check_status().await);
    }

    #[tokio::test]
    async fn health_check_fails_when_unreachable() {
        let client = LlamaCppClient::new("http://127.0.0.1:9", None).expect("client");
        assert!(!client.check_status().await);
    }

    #[tokio::test]
    async fn complete_returns_first_choice() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .body_contains("\"role\":\"system\"")
                    .body_contains("\"max_tokens\":1500");
                then.status(200).json_body(json!({
                    "choices": [
                        { "message": { "role": "assistant", "content": "{\"ok\":true}" } }
                    ]
                }));
            })
            .await;

        let reply = client_for(&server)
            .complete(
                &[ChatMessage::system("be terse"), ChatMessage::user("hi")],
                &CompletionOptions {
                    model: None,
                    temperature: 0.3,
                    max_tokens: 1500,
                },
            )
            .await
            .expect("completion");

        mock.assert();
        assert_eq!(reply, "{\"ok\":true}");
    }

    #[tokio::test]
    async fn complete_maps_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(500).body("boom");
            })
            .await;

        let error = client_for(&server)
            .complete(&[ChatMessage::user("hi")], &CompletionOptions::default())
            .await
            .expect_err("error response");

        assert!(matches!(error, LlmClientError::RequestFailed(message) if message.contains("500")));
    }

    #[tokio::test]
    async fn complete_rejects_empty_choices() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = client_for(&server)
            .complete(&[ChatMessage::user("hi")], &CompletionOptions::default())
            .await
            .expect_err("empty choices");

        assert!(matches!(error, LlmClientError::InvalidResponse(_)));
    }
}
