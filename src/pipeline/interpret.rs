//! Field interpretation: extraction prompt → model reply.
//!
//! The language model is the second black-box collaborator, behind the
//! [`FieldInterpreter`] trait. The shipped [`ChatCompletionsInterpreter`]
//! speaks the OpenAI-compatible `/chat/completions` protocol, which covers
//! the NVIDIA integrate endpoint this service was built against as well as
//! any other compatible host.
//!
//! The reply is returned as-is; trimming, the blank-reply check, and fenced
//! JSON recovery are the orchestrator's and parser's business. Keeping this
//! module thin means prompt changes and reply-format changes never touch
//! transport code.

use crate::error::ScanError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Capability seam for the completion model.
#[async_trait]
pub trait FieldInterpreter: Send + Sync {
    /// Run one completion over `prompt` and return the raw reply text.
    async fn complete(&self, prompt: &str) -> Result<String, ScanError>;
}

/// REST binding for an OpenAI-compatible chat-completions endpoint.
pub struct ChatCompletionsInterpreter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    top_p: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    top_p: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl ChatCompletionsInterpreter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        top_p: f32,
        max_tokens: usize,
        timeout: Duration,
    ) -> Result<Self, ScanError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScanError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
            top_p,
            max_tokens,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl FieldInterpreter for ChatCompletionsInterpreter {
    async fn complete(&self, prompt: &str) -> Result<String, ScanError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let detail = if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                };
                ScanError::CompletionFailed { detail }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScanError::CompletionFailed {
                detail: format!("HTTP {status}: {}", snippet(&body)),
            });
        }

        let parsed: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| ScanError::CompletionFailed {
                    detail: format!("unexpected completion reply: {e}"),
                })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ScanError::CompletionFailed {
                detail: "reply contained no choices".to_string(),
            })?;

        debug!(
            "Completion reply: {} chars from model {}",
            choice.message.content.len(),
            self.model
        );
        Ok(choice.message.content)
    }
}

/// Truncate an error body so a huge HTML error page does not flood the log.
fn snippet(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialises_expected_shape() {
        let request = ChatRequest {
            model: "mistralai/mixtral-8x22b-instruct-v0.1".into(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: "hello".into(),
            }],
            temperature: 0.1,
            top_p: 0.7,
            max_tokens: 1500,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "mistralai/mixtral-8x22b-instruct-v0.1");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
        assert!((json["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
        assert!((json["top_p"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(json["max_tokens"], 1500);
    }

    #[test]
    fn response_deserialises_first_choice() {
        let raw = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"the reply"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "the reply");
    }

    #[test]
    fn completions_url_joins_base() {
        let it = ChatCompletionsInterpreter::new(
            "https://llm.example/v1/",
            "key",
            "m",
            0.1,
            0.7,
            100,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(it.completions_url(), "https://llm.example/v1/chat/completions");
    }

    #[test]
    fn snippet_truncates_long_bodies() {
        let long = "x".repeat(500);
        let s = snippet(&long);
        assert!(s.chars().count() <= 201);
        assert!(s.ends_with('…'));
        assert_eq!(snippet("short"), "short");
    }
}
