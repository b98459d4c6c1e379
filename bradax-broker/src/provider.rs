//! Provider adapter.
//!
//! The adapter is the only component that speaks to the upstream model
//! service; the orchestrator depends solely on the [`ProviderAdapter`]
//! contract and treats every failure as a structured error it can render
//! fail-soft. [`OpenAiCompatAdapter`] targets the chat-completions wire
//! shape and keeps the raw response JSON so error and blocked outcomes can
//! be captured verbatim.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::reason;

// ── Wire shapes ────────────────────────────────────────────────────────

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user`, or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Convenience constructor for a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Tunables forwarded to the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct InvocationParams {
    /// Completion token cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt-side tokens.
    pub prompt_tokens: u64,
    /// Completion-side tokens.
    pub completion_tokens: u64,
    /// Total tokens.
    pub total_tokens: u64,
}

/// Normalized provider reply.
#[derive(Debug, Clone)]
pub struct ProviderReply {
    /// Assistant text.
    pub content: String,
    /// Token accounting when the provider supplied it.
    pub usage: Option<TokenUsage>,
    /// The raw response body, retained for the raw-response store.
    pub raw: Value,
}

// ── ProviderError ──────────────────────────────────────────────────────

/// Structured upstream failures.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network-level failure reaching the provider.
    #[error("provider transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The configured deadline elapsed.
    #[error("provider call exceeded {seconds}s deadline")]
    Timeout {
        /// The configured deadline.
        seconds: u64,
    },

    /// The provider answered with a non-success status.
    #[error("provider returned status {status}")]
    Remote {
        /// HTTP status code.
        status: u16,
        /// Raw response body, retained for the raw-response store.
        raw: Value,
    },

    /// The response parsed but is missing required fields.
    #[error("provider response malformed: {detail}")]
    InvalidResponse {
        /// What was missing.
        detail: String,
        /// Raw response body.
        raw: Value,
    },
}

impl ProviderError {
    /// Stable fail-soft reason code.
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => reason::PROVIDER_TIMEOUT,
            _ => reason::PROVIDER_ERROR,
        }
    }

    /// Raw body to capture, when one exists.
    #[must_use]
    pub fn raw(&self) -> Option<&Value> {
        match self {
            Self::Remote { raw, .. } | Self::InvalidResponse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

// ── ProviderAdapter ────────────────────────────────────────────────────

/// Contract consumed by the orchestrator.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Invoke `model_id` with the given messages and parameters.
    async fn invoke(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        params: &InvocationParams,
    ) -> Result<ProviderReply, ProviderError>;
}

// ── OpenAiCompatAdapter ────────────────────────────────────────────────

/// Chat-completions adapter for OpenAI-compatible endpoints.
pub struct OpenAiCompatAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl OpenAiCompatAdapter {
    /// Build the adapter. `timeout` bounds each HTTP call at the transport
    /// layer; the orchestrator enforces the same deadline one level up.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transport`] when the client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatAdapter {
    async fn invoke(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        params: &InvocationParams,
    ) -> Result<ProviderReply, ProviderError> {
        let url = format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        );
        let body = ChatCompletionRequest {
            model: model_id,
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let raw: Value = response.json().await?;
        if !status.is_success() {
            return Err(ProviderError::Remote {
                status: status.as_u16(),
                raw,
            });
        }

        let content = raw
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c0| c0.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::InvalidResponse {
                detail: "missing choices[0].message.content".into(),
                raw: raw.clone(),
            })?
            .to_string();

        let usage = raw.get("usage").and_then(|u| {
            Some(TokenUsage {
                prompt_tokens: u.get("prompt_tokens")?.as_u64()?,
                completion_tokens: u.get("completion_tokens")?.as_u64()?,
                total_tokens: u.get("total_tokens")?.as_u64()?,
            })
        });

        Ok(ProviderReply {
            content,
            usage,
            raw,
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn params() -> InvocationParams {
        InvocationParams {
            max_tokens: Some(64),
            temperature: Some(0.2),
        }
    }

    #[tokio::test]
    async fn normalizes_chat_completion_reply() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .json_body_partial(r#"{"model": "gpt-4.1-nano"}"#);
                then.status(200).json_body(serde_json::json!({
                    "id": "cmpl-1",
                    "choices": [{"message": {"role": "assistant", "content": "hello"},
                                 "finish_reason": "stop"}],
                    "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
                }));
            })
            .await;

        let adapter = OpenAiCompatAdapter::new(
            server.base_url(),
            "sk-test",
            std::time::Duration::from_secs(5),
        )
        .unwrap();
        let reply = adapter
            .invoke("gpt-4.1-nano", &[ChatMessage::user("hi")], &params())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(reply.content, "hello");
        assert_eq!(
            reply.usage,
            Some(TokenUsage {
                prompt_tokens: 3,
                completion_tokens: 2,
                total_tokens: 5
            })
        );
        assert_eq!(reply.raw["id"], "cmpl-1");
    }

    #[tokio::test]
    async fn remote_error_keeps_raw_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(503)
                    .json_body(serde_json::json!({"error": "overloaded"}));
            })
            .await;

        let adapter = OpenAiCompatAdapter::new(
            server.base_url(),
            "sk-test",
            std::time::Duration::from_secs(5),
        )
        .unwrap();
        let err = adapter
            .invoke("gpt-4.1-nano", &[ChatMessage::user("hi")], &params())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Remote { status: 503, .. }));
        assert_eq!(err.reason_code(), "provider_error");
        assert_eq!(err.raw().unwrap()["error"], "overloaded");
    }

    #[tokio::test]
    async fn missing_content_is_invalid_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(serde_json::json!({"choices": []}));
            })
            .await;

        let adapter = OpenAiCompatAdapter::new(
            server.base_url(),
            "sk-test",
            std::time::Duration::from_secs(5),
        )
        .unwrap();
        let err = adapter
            .invoke("gpt-4.1-nano", &[ChatMessage::user("hi")], &params())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse { .. }));
    }

    #[test]
    fn timeout_reason_code() {
        let err = ProviderError::Timeout { seconds: 180 };
        assert_eq!(err.reason_code(), "provider_timeout");
        assert!(err.raw().is_none());
    }
}
