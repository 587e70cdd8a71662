//! Deterministic judge backed by the lexicons in `guardian-core`.

use async_trait::async_trait;
use guardian_core::heuristics;
use guardian_core::JudgeVerdict;

use super::{Judge, JudgeError, JudgeRequest};

/// Lexicon-based judge. Used when no LLM provider is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicJudge;

impl HeuristicJudge {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Judge for HeuristicJudge {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeVerdict, JudgeError> {
        Ok(heuristics::judge(request.kind, &request.text))
    }
}
