//! Folds a finished [`PipelineState`] into the final [`ValidationResponse`].

use chrono::Utc;
use std::time::Duration;

use crate::checks::CheckError;
use crate::codec::Codec;
use crate::config::StageConfig;
use crate::state::PipelineState;
use crate::types::{ValidationMetrics, ValidationResponse};

/// Builds the response at END.
pub struct MetricsAggregator;

impl MetricsAggregator {
    /// Fix the validated text and build the response.
    ///
    /// Blocked state yields `validated_response: None`. When the input was
    /// decoded from a condensed format and the service asks for it, the
    /// final text is encoded back; a failed re-encode keeps the canonical
    /// text and records a warning.
    pub fn aggregate(
        mut state: PipelineState,
        config: &StageConfig,
        codec: &dyn Codec,
        elapsed: Duration,
    ) -> Result<ValidationResponse, CheckError> {
        if !state.is_blocked() {
            let mut text = state.working_text.clone();
            if config.reencode_toon_output && state.was_toon {
                match codec.encode(&text) {
                    Ok(encoded) => text = encoded,
                    Err(e) => state.warn(format!("{} re-encode failed, returning canonical text: {}", codec.name(), e)),
                }
            }
            state.set_validated_text(text)?;
        }

        let metrics = ValidationMetrics {
            hallucination_detected: state.hallucination_detected(),
            hallucination_details: state.hallucination_details().map(String::from),
            citations_verified: state.citations_verified(),
            fake_citations: state.fake_citations().map(<[String]>::to_vec),
            tone_compliant: state.tone_compliant(),
            tone_violation_reason: state.tone_violation_reason().map(String::from),
            disclaimer_injected: state.disclaimer_injected(),
            disclaimer_text: state.disclaimer_text().map(String::from),
            false_refusal_detected: state.false_refusal_detected(),
            toxicity_score: state.toxicity_score(),
            toxicity_details: state.toxicity_details().map(String::from),
            warnings_count: state.warnings.len(),
            pii_leaks_count: state.pii_leaks.len(),
            moderation_mode: state.moderation_mode.as_str().to_string(),
            processing_time_ms: elapsed.as_micros() as f64 / 1000.0,
        };

        let blocked = state.is_blocked();
        Ok(ValidationResponse {
            validated_response: state.validated_text().map(String::from),
            validation_passed: !blocked,
            content_blocked: blocked,
            content_block_reason: state.block_reason().map(String::from),
            content_warnings: (!state.warnings.is_empty()).then(|| state.warnings.clone()),
            output_pii_leaks: (!state.pii_leaks.is_empty()).then(|| state.pii_leaks.clone()),
            output_redacted: state.output_redacted,
            was_toon: state.was_toon,
            metrics,
            validated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::test_support::{config, state};
    use crate::codec::ToonCodec;
    use crate::types::{ModerationMode, PiiKind, PiiLeak, Span};

    #[test]
    fn test_passing_state() {
        let cfg = config(ModerationMode::Relaxed);
        let s = state("All good.", &cfg);
        let response = MetricsAggregator::aggregate(s, &cfg, &ToonCodec::new(), Duration::from_millis(12)).unwrap();

        assert!(response.validation_passed);
        assert!(!response.content_blocked);
        assert_eq!(response.validated_response.as_deref(), Some("All good."));
        assert!(response.content_warnings.is_none());
        assert!(response.output_pii_leaks.is_none());
        assert_eq!(response.metrics.moderation_mode, "relaxed");
        assert_eq!(response.metrics.processing_time_ms, 12.0);
    }

    #[test]
    fn test_blocked_state_has_no_text() {
        let cfg = config(ModerationMode::Moderate);
        let mut s = state("bad", &cfg);
        s.warn("something odd");
        s.block("toxic_language").unwrap();
        let response = MetricsAggregator::aggregate(s, &cfg, &ToonCodec::new(), Duration::ZERO).unwrap();

        assert!(!response.validation_passed);
        assert!(response.validated_response.is_none());
        assert_eq!(response.content_block_reason.as_deref(), Some("toxic_language"));
        assert_eq!(response.content_warnings.unwrap(), vec!["something odd".to_string()]);
        assert_eq!(response.metrics.warnings_count, 1);
    }

    #[test]
    fn test_leak_count_matches_metrics() {
        let cfg = config(ModerationMode::Moderate);
        let mut s = state("x", &cfg);
        s.pii_leaks.push(PiiLeak {
            kind: PiiKind::Email,
            location: Span::new(0, 1),
            redacted_value: "x***".to_string(),
        });
        let response = MetricsAggregator::aggregate(s, &cfg, &ToonCodec::new(), Duration::ZERO).unwrap();
        assert_eq!(response.output_pii_leaks.unwrap().len(), response.metrics.pii_leaks_count);
    }

    #[test]
    fn test_reencode_toon_output() {
        let mut cfg = config(ModerationMode::Moderate);
        cfg.reencode_toon_output = true;
        let mut s = state(r#"{"a":1,"b":["x","y"]}"#, &cfg);
        s.was_toon = true;
        let response = MetricsAggregator::aggregate(s, &cfg, &ToonCodec::new(), Duration::ZERO).unwrap();
        assert_eq!(response.validated_response.as_deref(), Some("a: 1\nb[2]: x,y"));
        assert!(response.was_toon);
    }

    #[test]
    fn test_failed_reencode_warns_and_keeps_text() {
        let mut cfg = config(ModerationMode::Moderate);
        cfg.reencode_toon_output = true;
        let text = "{\"a\":1}\n\nDisclaimer: not financial advice.";
        let mut s = state(text, &cfg);
        s.was_toon = true;
        let response = MetricsAggregator::aggregate(s, &cfg, &ToonCodec::new(), Duration::ZERO).unwrap();
        assert_eq!(response.validated_response.as_deref(), Some(text));
        assert_eq!(response.metrics.warnings_count, 1);
    }
}
