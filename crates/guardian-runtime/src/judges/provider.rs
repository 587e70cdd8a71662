//! Judge backed by an [`LlmProvider`].

use async_trait::async_trait;
use guardian_core::JudgeVerdict;
use serde::Deserialize;
use std::sync::Arc;
use tokio::time::Instant;

use crate::prompts::{system_prompt, user_prompt};
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider};

use super::{Judge, JudgeError, JudgeRequest};

/// Verdict as models tend to return it.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    violation: bool,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default, alias = "reasoning", alias = "reason")]
    detail: Option<String>,
}

/// Extract and parse the JSON verdict from a completion.
///
/// Tolerates markdown code fences and prose around the object.
pub fn parse_verdict(content: &str) -> Result<JudgeVerdict, JudgeError> {
    let start = content
        .find('{')
        .ok_or_else(|| JudgeError::InvalidResponse("no JSON object in response".to_string()))?;
    let end = content
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| JudgeError::InvalidResponse("unterminated JSON object".to_string()))?;

    let raw: RawVerdict = serde_json::from_str(&content[start..=end])
        .map_err(|e| JudgeError::InvalidResponse(e.to_string()))?;

    if let Some(score) = raw.score {
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(JudgeError::InvalidResponse(format!("score {} outside [0, 1]", score)));
        }
    }

    Ok(JudgeVerdict {
        violation: raw.violation,
        score: raw.score,
        detail: raw.detail.unwrap_or_default(),
    })
}

/// Judge that prompts an LLM for each call.
pub struct ProviderJudge {
    provider: Arc<dyn LlmProvider>,
    config: CompletionConfig,
}

impl ProviderJudge {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self::with_config(provider, CompletionConfig::default())
    }

    pub fn with_config(provider: Arc<dyn LlmProvider>, config: CompletionConfig) -> Self {
        Self { provider, config }
    }
}

#[async_trait]
impl Judge for ProviderJudge {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeVerdict, JudgeError> {
        let remaining = request.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(JudgeError::Timeout);
        }
        let mut config = self.config.clone();
        config.timeout = config.timeout.min(remaining);

        let messages = vec![
            ChatMessage::system(system_prompt(request.kind)),
            ChatMessage::user(user_prompt(&request.text, request.context.as_deref())),
        ];

        let response = self.provider.complete(messages, &config).await?;

        parse_verdict(&response.content)
    }
}
