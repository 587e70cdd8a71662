//! LLM provider seam consumed by [`ProviderJudge`](crate::judges::ProviderJudge).
//!
//! No concrete provider ships with this crate. Implement [`LlmProvider`] over
//! whichever client the deployment uses; a judge call is always one system
//! message plus one user message, answered with a JSON verdict.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::judges::JudgeError;

/// Errors from LLM providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("transport failed: {0}")]
    Transport(String),

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("completion could not be read: {0}")]
    MalformedOutput(String),

    #[error("credentials rejected")]
    Unauthorized,

    #[error("no completion within {0:?}")]
    Timeout(Duration),
}

impl From<ProviderError> for JudgeError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Timeout(_) => JudgeError::Timeout,
            ProviderError::MalformedOutput(msg) => JudgeError::InvalidResponse(msg),
            other => JudgeError::Transport(other.to_string()),
        }
    }
}

/// Knobs for one judge completion.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub model: String,

    /// Verdicts are short; this caps runaway completions
    pub max_tokens: u32,

    pub temperature: f32,

    /// Upper bound on one request; the judge deadline may cut it shorter
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "judge-default".to_string(),
            max_tokens: 300,
            temperature: 0.0,
            timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// What a provider hands back for one completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,

    /// Model that actually answered
    pub model: String,

    pub stop_reason: Option<String>,
}

/// A chat-completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    async fn health_check(&self) -> bool;

    /// Provider name for logs.
    fn name(&self) -> &str;
}
