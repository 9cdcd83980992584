//! LLM API interaction with typed errors and exponential backoff.
//!
//! This module talks to an OpenAI-compatible chat-completions endpoint and
//! wraps the call with the shared [`RetryPolicy`](crate::retry::RetryPolicy).
//!
//! # Architecture
//!
//! The module uses a trait-based design for flexibility:
//! - [`AskAsync`]: core trait defining async LLM interaction
//! - [`ChatClient`]: the `reqwest`-backed implementation
//! - [`RetryAsk`]: decorator that adds retry logic to any `AskAsync`
//!
//! # Error taxonomy
//!
//! [`LlmError`] separates transient failures (rate limiting, connection
//! problems, server-side 5xx, wall-clock timeout) from terminal ones
//! (malformed request, empty or undecodable response). Only transient
//! errors are retried; a malformed prompt will not get better by asking
//! again.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, instrument, warn};

/// Failure categories for an LLM call.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("connection failure: {0}")]
    Connection(String),
    #[error("server error: HTTP {status}")]
    Server { status: u16 },
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed request: HTTP {status}: {message}")]
    MalformedRequest { status: u16, message: String },
    #[error("response has no content")]
    NoContent,
    #[error("undecodable response: {0}")]
    Decode(String),
}

impl LlmError {
    /// Whether the failure is worth retrying under the backoff policy.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited(_)
                | LlmError::Connection(_)
                | LlmError::Server { .. }
                | LlmError::Timeout(_)
        )
    }
}

/// Trait for async LLM interaction.
///
/// `instructions` is the system prompt selecting the extraction behavior;
/// `content` is the prepared article material.
pub trait AskAsync {
    async fn ask(&self, instructions: &str, content: &str) -> Result<String, LlmError>;
}

/// OpenAI-compatible chat client.
///
/// One instance is built at startup from configuration and carried in the
/// run context; the inner `reqwest::Client` is shared and cheap to clone.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    /// Wall-clock budget per call; a hung call is aborted and reported as
    /// [`LlmError::Timeout`], which counts as transient.
    call_timeout: Duration,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

impl ChatClient {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        call_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("coincal/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(ChatClient {
            http,
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
            call_timeout,
        })
    }

    async fn chat(&self, instructions: &str, content: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: instructions,
                },
                ChatMessage {
                    role: "user",
                    content,
                },
            ],
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited(status.to_string()));
        }
        if status.is_server_error() {
            return Err(LlmError::Server {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::MalformedRequest {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;
        let text = envelope
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(LlmError::NoContent);
        }
        Ok(text)
    }
}

impl AskAsync for ChatClient {
    #[instrument(level = "info", skip_all)]
    async fn ask(&self, instructions: &str, content: &str) -> Result<String, LlmError> {
        let t0 = Instant::now();
        let res = match tokio::time::timeout(self.call_timeout, self.chat(instructions, content))
            .await
        {
            Ok(inner) => inner,
            Err(_) => Err(LlmError::Timeout(self.call_timeout)),
        };
        if let Err(e) = &res {
            warn!(elapsed_ms = t0.elapsed().as_millis() as u64, error = %e, "API call failed");
        }
        res
    }
}

/// Wrapper that adds backoff retry logic to any [`AskAsync`] implementation.
///
/// Transient errors are retried up to the policy's attempt budget; terminal
/// errors are returned immediately.
#[derive(Debug)]
pub struct RetryAsk<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        RetryAsk { inner, policy }
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync,
{
    #[instrument(level = "info", skip_all)]
    async fn ask(&self, instructions: &str, content: &str) -> Result<String, LlmError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            match self.inner.ask(instructions, content).await {
                Ok(resp) => return Ok(resp),
                Err(e) if !e.is_transient() => {
                    error!(attempt, error = %e, "ask() terminal failure; not retrying");
                    return Err(e);
                }
                Err(e) => {
                    if attempt >= self.policy.max_retries {
                        error!(
                            attempt,
                            max = self.policy.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }
                    let delay = self.policy.jittered_delay(attempt);
                    warn!(
                        attempt,
                        max = self.policy.max_retries,
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
