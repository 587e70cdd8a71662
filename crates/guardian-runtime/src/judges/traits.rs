//! Judge trait and common types.

use async_trait::async_trait;
use guardian_core::{JudgeKind, JudgeVerdict};
use thiserror::Error;
use tokio::time::Instant;

/// Why a judge call produced no verdict.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JudgeError {
    #[error("judge call timed out")]
    Timeout,

    #[error("transport failed: {0}")]
    Transport(String),

    #[error("invalid judge response: {0}")]
    InvalidResponse(String),

    #[error("circuit open for {0} judge")]
    CircuitOpen(JudgeKind),
}

/// One judge call.
#[derive(Debug, Clone)]
pub struct JudgeRequest {
    pub kind: JudgeKind,

    /// Text under judgment
    pub text: String,

    /// Supporting context, e.g. the original query for hallucination checks
    pub context: Option<String>,

    /// Shared deadline of the dispatch this call belongs to
    pub deadline: Instant,
}

impl JudgeRequest {
    pub fn new(kind: JudgeKind, text: impl Into<String>, deadline: Instant) -> Self {
        Self {
            kind,
            text: text.into(),
            context: None,
            deadline,
        }
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }
}

/// A source of verdicts for the toxicity, hallucination and tone checks.
///
/// # Isolation Contract
/// - A call sees only its own request
/// - Calls for different kinds may run concurrently on the same judge
/// - The deadline is advisory; the dispatcher enforces it regardless
#[async_trait]
pub trait Judge: Send + Sync {
    /// Judge name for logs.
    fn name(&self) -> &str;

    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeVerdict, JudgeError>;
}
