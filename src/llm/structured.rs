//! Coerce free-form model replies into typed values.
//!
//! Models wrap JSON in markdown fences or surround it with prose. [`extract_structured`] peels
//! those layers off; [`query_with_retry`] re-asks the model with a corrective directive when a
//! reply still fails to parse, up to a fixed number of retries and without any delay.

use super::{ChatMessage, CompletionOptions, LanguageModelClient, LlmClientError};
use serde::de::DeserializeOwned;
use thiserror::Error;

const FENCE: &str = "```";

/// Directive appended to the prompt on every retry after a malformed reply.
pub const CORRECTIVE_DIRECTIVE: &str =
    "\n\nIMPORTANT: Respond ONLY with valid JSON, no markdown or extra text.";

/// A reply that could not be parsed into the expected shape.
#[derive(Debug, Error)]
#[error("failed to parse structured response: {source}")]
pub struct ParseError {
    /// Reply text exactly as the model produced it.
    pub raw: String,
    /// Underlying deserialization failure.
    #[source]
    pub source: serde_json::Error,
}

/// Why [`query_with_retry`] gave up.
#[derive(Debug, Error)]
pub enum QueryFailure {
    /// Every attempt produced output that would not parse.
    #[error("model returned malformed output after {attempts} attempts: {detail}")]
    MalformedResponse {
        /// Number of completions requested.
        attempts: usize,
        /// Last reply received.
        raw_response: String,
        /// Parse failure of the last reply.
        detail: String,
    },
    /// The language model itself failed; not retried.
    #[error(transparent)]
    Transport(#[from] LlmClientError),
}

/// Parse a model reply into `T`, tolerating code fences and surrounding prose.
pub fn extract_structured<T: DeserializeOwned>(raw: &str) -> Result<T, ParseError> {
    let stripped = strip_fences(raw);

    let error = match serde_json::from_str(stripped) {
        Ok(value) => return Ok(value),
        Err(error) => error,
    };

    match outermost_span(stripped) {
        Some(span) => serde_json::from_str(span).map_err(|source| ParseError {
            raw: raw.to_string(),
            source,
        }),
        None => Err(ParseError {
            raw: raw.to_string(),
            source: error,
        }),
    }
}

/// Ask the model and parse its reply, retrying malformed replies up to `max_retries` times.
///
/// The model is called at most `max_retries + 1` times. Transport failures return at once.
pub async fn query_with_retry<T: DeserializeOwned>(
    client: &dyn LanguageModelClient,
    prompt: &str,
    system_prompt: Option<&str>,
    max_retries: usize,
    options: &CompletionOptions,
) -> Result<T, QueryFailure> {
    let corrected = format!("{prompt}{CORRECTIVE_DIRECTIVE}");
    let mut last_failure: Option<ParseError> = None;

    for attempt in 0..=max_retries {
        let user_prompt = if attempt == 0 { prompt } else { corrected.as_str() };
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(user_prompt));

        let raw = client.complete(&messages, options).await?;
        match extract_structured(&raw) {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(attempt, "Structured response recovered after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                tracing::warn!(attempt, error = %error, "Model reply was not valid JSON");
                last_failure = Some(error);
            }
        }
    }

    let (raw_response, detail) = last_failure
        .map(|failure| (failure.raw, failure.source.to_string()))
        .unwrap_or_default();
    Err(QueryFailure::MalformedResponse {
        attempts: max_retries + 1,
        raw_response,
        detail,
    })
}

fn strip_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix(FENCE) {
        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        text = &rest[tag_len..];
    }
    if let Some(rest) = text.trim_end().strip_suffix(FENCE) {
        text = rest;
    }
    text.trim()
}

/// Leftmost `{` or `[` through the rightmost matching closer.
fn outermost_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let closer = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(closer).filter(|&end| end > start)?;
    Some(&text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<String, LlmClientError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<String, LlmClientError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModelClient for ScriptedClient {
        async fn check_status(&self) -> bool {
            true
        }

        async fn complete(
            &self,
            messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> Result<String, LlmClientError> {
            let user = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            self.prompts.lock().unwrap().push(user);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("still not json".into()))
        }
    }

    fn expected() -> Value {
        json!({ "risk_level": "high" })
    }

    #[test]
    fn extracts_bare_json() {
        let value: Value = extract_structured(r#"{"risk_level":"high"}"#).unwrap();
        assert_eq!(value, expected());
    }

    #[test]
    fn extracts_tagged_fence() {
        let raw = "```json\n{\"risk_level\":\"high\"}\n```";
        let value: Value = extract_structured(raw).unwrap();
        assert_eq!(value, expected());
    }

    #[test]
    fn extracts_untagged_fence() {
        let raw = "```\n{\"risk_level\":\"high\"}\n```\n";
        let value: Value = extract_structured(raw).unwrap();
        assert_eq!(value, expected());
    }

    #[test]
    fn extracts_from_surrounding_prose() {
        let raw = r#"Here is the data: {"risk_level":"high"} - done"#;
        let value: Value = extract_structured(raw).unwrap();
        assert_eq!(value, expected());
    }

    #[test]
    fn extracts_arrays() {
        let value: Vec<u32> = extract_structured("numbers: [1, 2, 3].").unwrap();
        assert_eq!(value, vec![1, 2, 3]);
    }

    #[test]
    fn parse_error_keeps_raw_text() {
        let error = extract_structured::<Value>("no structure here").unwrap_err();
        assert_eq!(error.raw, "no structure here");

        let error = extract_structured::<Value>("broken {\"a\": }").unwrap_err();
        assert!(error.source.is_syntax());
    }

    #[tokio::test]
    async fn retry_is_bounded_and_returns_typed_error() {
        let client = ScriptedClient::new(vec![]);
        let result = query_with_retry::<Value>(
            &client,
            "analyze",
            Some("system"),
            2,
            &CompletionOptions::default(),
        )
        .await;

        assert_eq!(client.calls(), 3);
        match result {
            Err(QueryFailure::MalformedResponse {
                attempts,
                raw_response,
                ..
            }) => {
                assert_eq!(attempts, 3);
                assert_eq!(raw_response, "still not json");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn retry_appends_corrective_directive() {
        let client = ScriptedClient::new(vec![
            Ok("Sorry, I cannot format that.".into()),
            Ok(r#"{"risk_level":"high"}"#.into()),
        ]);

        let value: Value =
            query_with_retry(&client, "analyze", None, 2, &CompletionOptions::default())
                .await
                .unwrap();

        assert_eq!(value, expected());
        let prompts = client.prompts.lock().unwrap();
        assert_eq!(prompts[0], "analyze");
        assert_eq!(prompts[1], format!("analyze{CORRECTIVE_DIRECTIVE}"));
    }

    #[tokio::test]
    async fn transport_failures_are_not_retried() {
        let client = ScriptedClient::new(vec![Err(LlmClientError::Unavailable("down".into()))]);

        let result =
            query_with_retry::<Value>(&client, "analyze", None, 2, &CompletionOptions::default())
                .await;

        assert_eq!(client.calls(), 1);
        assert!(matches!(
            result,
            Err(QueryFailure::Transport(LlmClientError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn zero_retries_means_single_attempt() {
        let client = ScriptedClient::new(vec![]);
        let result =
            query_with_retry::<Value>(&client, "analyze", None, 0, &CompletionOptions::default())
                .await;

        assert_eq!(client.calls(), 1);
        assert!(matches!(
            result,
            Err(QueryFailure::MalformedResponse { attempts: 1, .. })
        ));
    }
}
