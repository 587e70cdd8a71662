//! End-to-end runs of the Guardian engine.

use async_trait::async_trait;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use guardian_core::policy;
use guardian_core::{
    GuardianError, GuardianSettings, JudgeKind, JudgeVerdict, ModerationMode, OutputFormat, PiiKind,
    StageId, ValidateConfig, ValidationRequest,
};
use guardian_runtime::{CancellationToken, Guardian, Judge, JudgeError, JudgeRequest};

/// Judge with a fixed toxicity score, an optional delay per kind, and kinds that always fail.
struct StubJudge {
    toxicity: f64,
    delays: Vec<(JudgeKind, Duration)>,
    failing: Vec<JudgeKind>,
}

impl StubJudge {
    fn clean() -> Self {
        Self {
            toxicity: 0.0,
            delays: Vec::new(),
            failing: Vec::new(),
        }
    }

    fn with_toxicity(score: f64) -> Self {
        Self {
            toxicity: score,
            ..Self::clean()
        }
    }
}

#[async_trait]
impl Judge for StubJudge {
    fn name(&self) -> &str {
        "stub"
    }

    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeVerdict, JudgeError> {
        if let Some((_, delay)) = self.delays.iter().find(|(kind, _)| *kind == request.kind) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&request.kind) {
            return Err(JudgeError::Transport("upstream 503".to_string()));
        }
        match request.kind {
            JudgeKind::Toxicity if self.toxicity > 0.0 => Ok(JudgeVerdict::violation(self.toxicity, "hostile wording")),
            _ => Ok(JudgeVerdict::pass("")),
        }
    }
}

fn guardian_with(judge: StubJudge) -> Guardian {
    Guardian::builder().judge(Arc::new(judge)).build().unwrap()
}

fn judges_enabled() -> ValidateConfig {
    ValidateConfig {
        enable_content_filter: Some(true),
        enable_hallucination_detector: Some(true),
        enable_tone_checker: Some(true),
        ..Default::default()
    }
}

proptest! {
    #[test]
    fn prop_all_stages_off_is_passthrough(text in ".*") {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let guardian = Guardian::new().unwrap();
        let request = ValidationRequest::new(text.clone()).with_config(ValidateConfig::all_disabled());

        let response = runtime.block_on(guardian.validate(&request)).unwrap();
        prop_assert!(response.validation_passed);
        prop_assert_eq!(response.validated_response, Some(text));
        prop_assert!(response.content_warnings.is_none());
    }
}

#[tokio::test]
async fn test_content_filter_short_circuits() {
    let guardian = Guardian::new().unwrap();
    let request = ValidationRequest::new("I will kill you if you say that again. [1]")
        .with_query("What's the weather?")
        .with_config(ValidateConfig::all_enabled());

    let run = guardian.run(&request, CancellationToken::new()).await.unwrap();
    let response = run.response;

    assert!(response.content_blocked);
    assert!(!response.validation_passed);
    assert!(response.validated_response.is_none());
    assert_eq!(run.stages_executed, vec![StageId::ContentFilter]);
    assert!(response.metrics.citations_verified.is_none());
    assert!(response.metrics.false_refusal_detected.is_none());
    assert!(response.metrics.disclaimer_injected.is_none());
    assert!(response.metrics.toxicity_score.is_none());
}

#[tokio::test]
async fn test_email_is_redacted() {
    let guardian = Guardian::new().unwrap();
    let request = ValidationRequest::new("Contact me at a@b.com")
        .with_mode(ModerationMode::Moderate)
        .with_config(ValidateConfig {
            enable_pii_scanner: Some(true),
            ..Default::default()
        });

    let response = guardian.validate(&request).await.unwrap();
    assert!(response.validation_passed);
    assert!(response.output_redacted);

    let text = response.validated_response.unwrap();
    assert!(text.contains("[REDACTED:email]"));
    assert!(!text.contains("a@b.com"));

    let leaks = response.output_pii_leaks.unwrap();
    assert_eq!(leaks.len(), 1);
    assert_eq!(leaks[0].kind, PiiKind::Email);
    assert_eq!(response.metrics.pii_leaks_count, 1);
}

#[tokio::test]
async fn test_strict_pii_volume_blocks_before_judges() {
    let guardian = guardian_with(StubJudge::clean());
    let request = ValidationRequest::new("a@b.com, c@d.com, e@f.com, g@h.com")
        .with_mode(ModerationMode::Strict)
        .with_config(ValidateConfig {
            enable_pii_scanner: Some(true),
            enable_tone_checker: Some(true),
            ..Default::default()
        });

    let run = guardian.run(&request, CancellationToken::new()).await.unwrap();
    assert_eq!(run.response.content_block_reason.as_deref(), Some(policy::REASON_PII));
    assert_eq!(run.stages_executed, vec![StageId::PiiScanner]);
    assert!(run.response.metrics.tone_compliant.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_judge_latency_is_not_summed() {
    let mut judge = StubJudge::clean();
    judge.delays = JudgeKind::ALL.iter().map(|k| (*k, Duration::from_secs(1))).collect();
    let guardian = guardian_with(judge);
    let request = ValidationRequest::new("Thanks for asking.").with_config(judges_enabled());

    let run = guardian.run(&request, CancellationToken::new()).await.unwrap();
    assert!(run.response.validation_passed);
    assert!(run.elapsed >= Duration::from_secs(1));
    assert!(run.elapsed < Duration::from_millis(1100));
    assert!(run.response.content_warnings.is_none());
}

#[tokio::test]
async fn test_mode_monotonicity_at_high_toxicity() {
    let guardian = guardian_with(StubJudge::with_toxicity(0.9));
    let mut blocked = Vec::new();
    for mode in ModerationMode::ALL {
        let request = ValidationRequest::new("Thanks for asking.")
            .with_mode(mode)
            .with_config(ValidateConfig {
                enable_content_filter: Some(true),
                ..Default::default()
            });
        let response = guardian.validate(&request).await.unwrap();
        assert_eq!(response.metrics.toxicity_score, Some(0.9));
        blocked.push(response.content_blocked);
    }

    assert_eq!(blocked, vec![true, true, true, false]);
    for pair in blocked.windows(2) {
        assert!(pair[0] || !pair[1]);
    }
}

#[tokio::test]
async fn test_false_refusal_is_advisory() {
    let guardian = Guardian::new().unwrap();
    let request = ValidationRequest::new("I cannot help with that.")
        .with_query("What's 2+2?")
        .with_config(ValidateConfig {
            enable_refusal_detector: Some(true),
            ..Default::default()
        });

    let response = guardian.validate(&request).await.unwrap();
    assert_eq!(response.metrics.false_refusal_detected, Some(true));
    assert!(response.validation_passed);
}

#[tokio::test(start_paused = true)]
async fn test_one_judge_timing_out_degrades_under_moderate() {
    let mut judge = StubJudge::clean();
    judge.delays = vec![(JudgeKind::Tone, Duration::from_secs(30))];
    let guardian = guardian_with(judge);
    let request = ValidationRequest::new("Thanks for asking.")
        .with_mode(ModerationMode::Moderate)
        .with_config(judges_enabled());

    let response = guardian.validate(&request).await.unwrap();
    assert!(response.validation_passed);
    assert_eq!(response.metrics.tone_compliant, Some(true));
    assert_eq!(response.metrics.hallucination_detected, Some(false));
    assert_eq!(response.metrics.warnings_count, 1);
    assert!(response.content_warnings.unwrap()[0].starts_with("tone judge unavailable"));
}

#[tokio::test]
async fn test_failed_judges_block_in_strict() {
    let mut judge = StubJudge::clean();
    judge.failing = JudgeKind::ALL.to_vec();
    let guardian = guardian_with(judge);
    let request = ValidationRequest::new("Thanks for asking.")
        .with_mode(ModerationMode::Strict)
        .with_config(judges_enabled());

    let response = guardian.validate(&request).await.unwrap();
    assert!(response.content_blocked);
    assert_eq!(response.content_block_reason.as_deref(), Some(policy::REASON_TOXICITY));
    assert_eq!(response.metrics.warnings_count, 3);
}

#[tokio::test]
async fn test_precancelled_run_returns_cancelled() {
    let guardian = Guardian::new().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = guardian
        .validate_with_cancellation(&ValidationRequest::new("hello"), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, GuardianError::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_judges_returns_cancelled() {
    let mut judge = StubJudge::clean();
    judge.delays = vec![(JudgeKind::Toxicity, Duration::from_secs(10))];
    let guardian = guardian_with(judge);
    let request = ValidationRequest::new("Thanks for asking.").with_config(judges_enabled());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let err = guardian
        .validate_with_cancellation(&request, cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, GuardianError::Cancelled));
}

#[tokio::test]
async fn test_unknown_mode_is_rejected() {
    let guardian = Guardian::new().unwrap();
    let mut request = ValidationRequest::new("hello");
    request.moderation_mode = "lenient".to_string();

    let err = guardian.validate(&request).await.unwrap_err();
    assert!(matches!(err, GuardianError::InvalidConfig(_)));
    assert!(err.is_client_error());
}

#[tokio::test]
async fn test_disabled_stages_are_not_recorded() {
    let guardian = Guardian::new().unwrap();
    let request = ValidationRequest::new("See [1] for details.\n\n[1] Internal wiki")
        .with_config(ValidateConfig {
            enable_citation_verifier: Some(true),
            enable_disclaimer_injector: Some(true),
            ..Default::default()
        });

    let run = guardian.run(&request, CancellationToken::new()).await.unwrap();
    assert_eq!(
        run.stages_executed,
        vec![StageId::CitationVerifier, StageId::DisclaimerInjector]
    );
    assert_eq!(run.response.metrics.citations_verified, Some(true));
    assert_eq!(run.response.metrics.disclaimer_injected, Some(false));
    assert!(run.response.metrics.tone_compliant.is_none());
}

#[tokio::test]
async fn test_toon_response_is_decoded() {
    let guardian = Guardian::new().unwrap();
    let request = ValidationRequest::new("name: Ada\nlanguages[2]: en,fr")
        .with_format(OutputFormat::Toon)
        .with_config(ValidateConfig {
            enable_toon_decoder: Some(true),
            ..Default::default()
        });

    let response = guardian.validate(&request).await.unwrap();
    assert!(response.was_toon);
    assert_eq!(
        response.validated_response.as_deref(),
        Some(r#"{"name":"Ada","languages":["en","fr"]}"#)
    );
}

#[tokio::test]
async fn test_escaped_email_in_toon_is_redacted_after_decoding() {
    let guardian = Guardian::new().unwrap();
    let request = ValidationRequest::new(r#"contact: "a\u0040b.com""#)
        .with_format(OutputFormat::Toon)
        .with_config(ValidateConfig {
            enable_pii_scanner: Some(true),
            enable_toon_decoder: Some(true),
            ..Default::default()
        });

    let response = guardian.validate(&request).await.unwrap();
    assert!(response.was_toon);
    assert!(response.output_redacted);
    let text = response.validated_response.unwrap();
    assert!(!text.contains("a@b.com"));
    assert_eq!(text, r#"{"contact":"[REDACTED:email]"}"#);
    assert_eq!(response.metrics.pii_leaks_count, 1);
}

#[tokio::test]
async fn test_toon_output_reencoded_when_configured() {
    let settings = GuardianSettings {
        reencode_toon_output: true,
        ..Default::default()
    };
    let guardian = Guardian::builder().settings(settings).build().unwrap();
    let request = ValidationRequest::new("name: Ada\nlanguages[2]: en,fr")
        .with_format(OutputFormat::Toon)
        .with_config(ValidateConfig {
            enable_toon_decoder: Some(true),
            ..Default::default()
        });

    let response = guardian.validate(&request).await.unwrap();
    assert_eq!(
        response.validated_response.as_deref(),
        Some("name: Ada\nlanguages[2]: en,fr")
    );
}

#[tokio::test]
async fn test_financial_disclaimer_appended() {
    let guardian = Guardian::new().unwrap();
    let request = ValidationRequest::new("Index funds make a simple portfolio.").with_config(ValidateConfig {
        enable_disclaimer_injector: Some(true),
        ..Default::default()
    });

    let response = guardian.validate(&request).await.unwrap();
    let disclaimer = response.metrics.disclaimer_text.clone().unwrap();
    assert_eq!(response.metrics.disclaimer_injected, Some(true));
    assert!(response.validated_response.unwrap().ends_with(&disclaimer));
}

#[tokio::test]
async fn test_cached_judge_serves_repeat_requests() {
    let settings = GuardianSettings {
        cache: guardian_core::CacheSettings {
            enabled: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let guardian = Guardian::builder().settings(settings).build().unwrap();
    let request = ValidationRequest::new("You idiot.")
        .with_mode(ModerationMode::Raw)
        .with_config(ValidateConfig {
            enable_tone_checker: Some(true),
            ..Default::default()
        });

    let first = guardian.validate(&request).await.unwrap();
    let second = guardian.validate(&request).await.unwrap();
    assert_eq!(first.metrics.tone_compliant, second.metrics.tone_compliant);
    assert_eq!(guardian.dispatcher().judge().name(), "heuristic");
}
