//! Judge dispatcher: the one concurrent stage of the pipeline.
//!
//! Up to three judge calls (toxicity, hallucination, tone) fan out against
//! the working text and share a single deadline. A call that fails or misses
//! the deadline never fails the others; it resolves to the mode's fallback
//! verdict and leaves a warning. After the join the verdicts are written to
//! state and the moderation policy decides whether to block.

use futures::future::OptionFuture;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use guardian_core::policy::{self, JudgedOutcome};
use guardian_core::{
    CheckError, GuardianError, JudgeKind, JudgeVerdict, PipelineState, StageConfig, StageId,
};

use crate::judges::{Judge, JudgeError, JudgeRequest};
use crate::resilience::CircuitBreaker;

pub struct JudgeDispatcher {
    judge: Arc<dyn Judge>,
    breaker: CircuitBreaker,
}

impl JudgeDispatcher {
    pub fn new(judge: Arc<dyn Judge>, breaker: CircuitBreaker) -> Self {
        Self { judge, breaker }
    }

    pub fn judge(&self) -> &Arc<dyn Judge> {
        &self.judge
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Whether any judge call would be dispatched for this config.
    pub fn is_enabled(&self, config: &StageConfig) -> bool {
        config.any_judge_enabled()
    }

    /// Fan out the enabled judges, join under the deadline, write verdicts.
    ///
    /// Returns [`GuardianError::Cancelled`] as soon as `cancel` fires;
    /// outstanding calls are dropped and state is left untouched.
    pub async fn run(
        &self,
        state: &mut PipelineState,
        config: &StageConfig,
        cancel: &CancellationToken,
    ) -> Result<(), GuardianError> {
        let deadline = Instant::now() + config.judge_deadline;
        let flags = config.flags;
        let text = state.working_text.clone();

        let toxicity = OptionFuture::from(
            flags
                .content_filter
                .then(|| self.call(JudgeRequest::new(JudgeKind::Toxicity, text.clone(), deadline))),
        );
        let hallucination = OptionFuture::from(flags.hallucination_detector.then(|| {
            self.call(
                JudgeRequest::new(JudgeKind::Hallucination, text.clone(), deadline)
                    .with_context(hallucination_context(state)),
            )
        }));
        let tone = OptionFuture::from(
            flags
                .tone_checker
                .then(|| self.call(JudgeRequest::new(JudgeKind::Tone, text.clone(), deadline))),
        );

        let (toxicity, hallucination, tone) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GuardianError::Cancelled),
            joined = async { tokio::join!(toxicity, hallucination, tone) } => joined,
        };

        let mode = config.moderation_mode;
        let mut outcome = JudgedOutcome::default();
        let failed = |source: CheckError| GuardianError::StageFailed {
            stage: StageId::JudgeDispatcher,
            source,
        };

        if let Some(verdict) = resolve(state, config, JudgeKind::Toxicity, toxicity) {
            let score = verdict.normalized_score();
            state
                .set_toxicity(score, non_empty(verdict.detail))
                .map_err(failed)?;
            outcome.toxicity_score = Some(score);
        }
        if let Some(verdict) = resolve(state, config, JudgeKind::Hallucination, hallucination) {
            state
                .set_hallucination(verdict.violation, non_empty(verdict.detail))
                .map_err(failed)?;
            outcome.hallucination_detected = Some(verdict.violation);
        }
        if let Some(verdict) = resolve(state, config, JudgeKind::Tone, tone) {
            let reason = if verdict.violation { non_empty(verdict.detail) } else { None };
            state.set_tone(!verdict.violation, reason).map_err(failed)?;
            outcome.tone_compliant = Some(!verdict.violation);
        }

        if let Some(reason) = policy::judge_block_reason(mode, &config.thresholds, &outcome) {
            state.block(reason).map_err(failed)?;
        }
        Ok(())
    }

    /// One judge call: circuit check, deadline, breaker bookkeeping.
    async fn call(&self, request: JudgeRequest) -> Result<JudgeVerdict, JudgeError> {
        let kind = request.kind;
        if self.breaker.is_open(kind) {
            return Err(JudgeError::CircuitOpen(kind));
        }

        let started = Instant::now();
        let result = match tokio::time::timeout_at(request.deadline, self.judge.judge(&request)).await {
            Ok(result) => result,
            Err(_) => Err(JudgeError::Timeout),
        };

        match &result {
            Ok(_) => {
                self.breaker.record_success(kind);
                tracing::debug!(
                    kind = %kind,
                    judge = self.judge.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Judge returned"
                );
            }
            Err(_) => self.breaker.record_failure(kind),
        }
        result
    }
}

/// Turn a call outcome into a verdict. `None` means the judge was not dispatched.
fn resolve(
    state: &mut PipelineState,
    config: &StageConfig,
    kind: JudgeKind,
    outcome: Option<Result<JudgeVerdict, JudgeError>>,
) -> Option<JudgeVerdict> {
    match outcome? {
        Ok(verdict) => Some(verdict),
        Err(e) => {
            state.warn(format!("{} judge unavailable: {}", kind, e));
            Some(policy::fallback_verdict(config.moderation_mode, kind))
        }
    }
}

fn non_empty(detail: String) -> Option<String> {
    (!detail.is_empty()).then_some(detail)
}

/// Query and sources, as the hallucination judge sees them.
fn hallucination_context(state: &PipelineState) -> Option<String> {
    let mut context = String::new();
    if let Some(query) = &state.original_query {
        context.push_str("Query: ");
        context.push_str(query);
    }
    if let Some(sources) = state.sources.as_deref().filter(|s| !s.is_empty()) {
        if !context.is_empty() {
            context.push_str("\n\n");
        }
        context.push_str("Sources:");
        for (i, source) in sources.iter().enumerate() {
            context.push_str(&format!("\n[{}] {}", i + 1, source));
        }
    }
    (!context.is_empty()).then_some(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use guardian_core::{
        CircuitBreakerSettings, GuardianSettings, ModerationMode, ValidateConfig, ValidationRequest,
    };
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Returns a fixed verdict per kind, or an error for kinds listed in `failing`.
    struct ScriptedJudge {
        toxicity: f64,
        hallucination: bool,
        tone_violation: bool,
        failing: Vec<JudgeKind>,
        delay: Duration,
        contexts: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedJudge {
        fn clean() -> Self {
            Self {
                toxicity: 0.0,
                hallucination: false,
                tone_violation: false,
                failing: Vec::new(),
                delay: Duration::ZERO,
                contexts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Judge for ScriptedJudge {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn judge(&self, request: &JudgeRequest) -> Result<JudgeVerdict, JudgeError> {
            self.contexts.lock().push(request.context.clone());
            tokio::time::sleep(self.delay).await;
            if self.failing.contains(&request.kind) {
                return Err(JudgeError::Transport("connection reset".to_string()));
            }
            Ok(match request.kind {
                JudgeKind::Toxicity if self.toxicity > 0.0 => JudgeVerdict::violation(self.toxicity, "hostile"),
                JudgeKind::Hallucination if self.hallucination => JudgeVerdict::violation(0.9, "invented figure"),
                JudgeKind::Tone if self.tone_violation => JudgeVerdict::violation(0.7, "dismissive"),
                _ => JudgeVerdict::pass(""),
            })
        }
    }

    fn setup(mode: ModerationMode, text: &str, flags: ValidateConfig) -> (StageConfig, PipelineState) {
        let request = ValidationRequest::new(text)
            .with_mode(mode)
            .with_query("How big is the market?")
            .with_config(flags);
        let config = StageConfig::resolve(&GuardianSettings::default(), &request).unwrap();
        let state = PipelineState::from_request(&request, &config);
        (config, state)
    }

    fn judges_only() -> ValidateConfig {
        ValidateConfig {
            enable_content_filter: Some(true),
            enable_hallucination_detector: Some(true),
            enable_tone_checker: Some(true),
            ..Default::default()
        }
    }

    fn dispatcher(judge: ScriptedJudge) -> JudgeDispatcher {
        JudgeDispatcher::new(Arc::new(judge), CircuitBreaker::default())
    }

    #[tokio::test]
    async fn test_clean_verdicts_fill_all_fields() {
        let (config, mut state) = setup(ModerationMode::Strict, "Happy to help.", judges_only());
        dispatcher(ScriptedJudge::clean())
            .run(&mut state, &config, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(state.toxicity_score(), Some(0.0));
        assert_eq!(state.hallucination_detected(), Some(false));
        assert_eq!(state.tone_compliant(), Some(true));
        assert!(state.tone_violation_reason().is_none());
        assert!(!state.is_blocked());
        assert!(state.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_judges_leave_fields_null() {
        let flags = ValidateConfig {
            enable_tone_checker: Some(true),
            ..Default::default()
        };
        let (config, mut state) = setup(ModerationMode::Moderate, "Hello", flags);
        dispatcher(ScriptedJudge::clean())
            .run(&mut state, &config, &CancellationToken::new())
            .await
            .unwrap();

        assert!(state.toxicity_score().is_none());
        assert!(state.hallucination_detected().is_none());
        assert_eq!(state.tone_compliant(), Some(true));
    }

    #[tokio::test]
    async fn test_tone_violation_blocks_only_strict() {
        let mut judge = ScriptedJudge::clean();
        judge.tone_violation = true;
        let d = dispatcher(judge);

        let (config, mut state) = setup(ModerationMode::Strict, "Whatever.", judges_only());
        d.run(&mut state, &config, &CancellationToken::new()).await.unwrap();
        assert_eq!(state.block_reason(), Some(policy::REASON_TONE));
        assert_eq!(state.tone_violation_reason(), Some("dismissive"));

        let (config, mut state) = setup(ModerationMode::Moderate, "Whatever.", judges_only());
        d.run(&mut state, &config, &CancellationToken::new()).await.unwrap();
        assert!(!state.is_blocked());
        assert_eq!(state.tone_compliant(), Some(false));
    }

    #[tokio::test]
    async fn test_toxicity_outranks_hallucination() {
        let mut judge = ScriptedJudge::clean();
        judge.hallucination = true;
        judge.toxicity = 0.7;
        let d = dispatcher(judge);

        let (config, mut state) = setup(ModerationMode::Moderate, "Revenue grew 412%.", judges_only());
        d.run(&mut state, &config, &CancellationToken::new()).await.unwrap();
        assert_eq!(state.block_reason(), Some(policy::REASON_TOXICITY));
        assert_eq!(state.hallucination_details(), Some("invented figure"));

        let (config, mut state) = setup(ModerationMode::Relaxed, "Revenue grew 412%.", judges_only());
        d.run(&mut state, &config, &CancellationToken::new()).await.unwrap();
        assert!(!state.is_blocked());
        assert_eq!(state.hallucination_detected(), Some(true));
    }

    #[tokio::test]
    async fn test_failed_call_is_permissive_outside_strict() {
        let mut judge = ScriptedJudge::clean();
        judge.failing = vec![JudgeKind::Hallucination];
        let (config, mut state) = setup(ModerationMode::Moderate, "Revenue doubled.", judges_only());
        dispatcher(judge)
            .run(&mut state, &config, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!state.is_blocked());
        assert_eq!(state.hallucination_detected(), Some(false));
        assert_eq!(state.warnings.len(), 1);
        assert!(state.warnings[0].starts_with("hallucination judge unavailable"));
    }

    #[tokio::test]
    async fn test_failed_call_fails_closed_in_strict() {
        let mut judge = ScriptedJudge::clean();
        judge.failing = vec![JudgeKind::Toxicity];
        let (config, mut state) = setup(ModerationMode::Strict, "Hello", judges_only());
        dispatcher(judge)
            .run(&mut state, &config, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(state.toxicity_score(), Some(1.0));
        assert_eq!(state.block_reason(), Some(policy::REASON_TOXICITY));
        assert!(state.toxicity_details().unwrap().contains(policy::JUDGE_UNAVAILABLE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_judges_share_one_deadline() {
        let mut judge = ScriptedJudge::clean();
        judge.delay = Duration::from_secs(5);
        let (config, mut state) = setup(ModerationMode::Relaxed, "Hello", judges_only());

        let started = Instant::now();
        dispatcher(judge)
            .run(&mut state, &config, &CancellationToken::new())
            .await
            .unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= config.judge_deadline);
        assert!(elapsed < config.judge_deadline + Duration::from_millis(100));
        assert_eq!(state.warnings.len(), 3);
        assert!(state.warnings.iter().all(|w| w.contains("timed out")));
        assert!(!state.is_blocked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_leaves_state_untouched() {
        let mut judge = ScriptedJudge::clean();
        judge.delay = Duration::from_secs(1);
        let (config, mut state) = setup(ModerationMode::Moderate, "Hello", judges_only());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = dispatcher(judge).run(&mut state, &config, &cancel).await.unwrap_err();
        assert!(matches!(err, GuardianError::Cancelled));
        assert!(state.toxicity_score().is_none());
        assert!(state.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_open_circuit_skips_judge() {
        let mut judge = ScriptedJudge::clean();
        judge.failing = vec![JudgeKind::Tone];
        let judge = Arc::new(judge);
        let breaker = CircuitBreaker::new(CircuitBreakerSettings {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 1,
        });
        let d = JudgeDispatcher::new(judge.clone(), breaker);
        let flags = ValidateConfig {
            enable_tone_checker: Some(true),
            ..Default::default()
        };

        let (config, mut state) = setup(ModerationMode::Moderate, "Hello", flags);
        d.run(&mut state, &config, &CancellationToken::new()).await.unwrap();
        assert_eq!(judge.contexts.lock().len(), 1);

        let (config, mut state) = setup(ModerationMode::Moderate, "Hello", flags);
        d.run(&mut state, &config, &CancellationToken::new()).await.unwrap();
        assert_eq!(judge.contexts.lock().len(), 1, "open circuit must not call the judge");
        assert!(state.warnings[0].contains("circuit open"));
    }

    #[tokio::test]
    async fn test_hallucination_context_carries_query_and_sources() {
        let judge = Arc::new(ScriptedJudge::clean());
        let d = JudgeDispatcher::new(judge.clone(), CircuitBreaker::default());
        let flags = ValidateConfig {
            enable_hallucination_detector: Some(true),
            ..Default::default()
        };
        let (config, mut state) = setup(ModerationMode::Moderate, "Hello", flags);
        state.sources = Some(vec!["Annual report 2023".to_string()]);

        d.run(&mut state, &config, &CancellationToken::new()).await.unwrap();
        let contexts = judge.contexts.lock();
        let context = contexts[0].as_deref().unwrap();
        assert!(context.starts_with("Query: How big is the market?"));
        assert!(context.ends_with("Sources:\n[1] Annual report 2023"));
    }
}
