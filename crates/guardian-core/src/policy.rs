//! Moderation-mode policy: what blocks, and what a failed judge call means.
//!
//! | Mode | Blocks after judging when | Failed judge call resolves to |
//! |------|---------------------------|-------------------------------|
//! | strict | toxicity > strict threshold, hallucination, or off-tone | violation |
//! | moderate | toxicity > moderate threshold, or hallucination | pass |
//! | relaxed | toxicity > relaxed threshold | pass |
//! | raw | never | pass |
//!
//! With thresholds ordered strict <= moderate <= relaxed, anything blocked in a
//! looser mode is also blocked in every stricter one.

use crate::config::ToxicityThresholds;
use crate::types::{JudgeKind, JudgeVerdict, ModerationMode};

pub const REASON_TOXICITY: &str = "toxicity_threshold_exceeded";
pub const REASON_HALLUCINATION: &str = "hallucination_detected";
pub const REASON_TONE: &str = "tone_violation";
pub const REASON_PII: &str = "pii_exposure";

/// Detail attached to a verdict that was substituted for a failed call.
pub const JUDGE_UNAVAILABLE: &str = "judge unavailable";

/// Judged outcomes the blocking decision looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JudgedOutcome {
    pub toxicity_score: Option<f64>,
    pub hallucination_detected: Option<bool>,
    pub tone_compliant: Option<bool>,
}

/// Whether a failed judge call should be treated as a violation.
pub fn fails_closed(mode: ModerationMode) -> bool {
    matches!(mode, ModerationMode::Strict)
}

/// Verdict substituted for a judge call that errored or timed out.
pub fn fallback_verdict(mode: ModerationMode, kind: JudgeKind) -> JudgeVerdict {
    let detail = format!("{} ({} judge)", JUDGE_UNAVAILABLE, kind);
    if fails_closed(mode) {
        JudgeVerdict::violation(1.0, detail)
    } else {
        JudgeVerdict::pass(detail)
    }
}

/// Decide whether judged outcomes block the response under `mode`.
///
/// Returns the block reason, checking toxicity, then hallucination, then tone.
pub fn judge_block_reason(
    mode: ModerationMode,
    thresholds: &ToxicityThresholds,
    outcome: &JudgedOutcome,
) -> Option<&'static str> {
    let toxic = match (thresholds.for_mode(mode), outcome.toxicity_score) {
        (Some(limit), Some(score)) => score > limit,
        _ => false,
    };
    if toxic {
        return Some(REASON_TOXICITY);
    }

    let hallucinated = outcome.hallucination_detected == Some(true);
    let off_tone = outcome.tone_compliant == Some(false);

    match mode {
        ModerationMode::Strict if hallucinated => Some(REASON_HALLUCINATION),
        ModerationMode::Strict if off_tone => Some(REASON_TONE),
        ModerationMode::Moderate if hallucinated => Some(REASON_HALLUCINATION),
        _ => None,
    }
}
