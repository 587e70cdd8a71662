//! The stage graph and the engine that walks it.
//!
//! The graph is a static edge table: each stage names a route function that
//! looks at state after the stage returns and picks the next node. The engine
//! is a plain loop over that table.
//!
//! ```text
//! START -> ContentFilter
//! ContentFilter      -> END if blocked, else PiiScanner
//! PiiScanner         -> END if blocked, else ToonDecoder
//! ToonDecoder        -> JudgeDispatcher
//! JudgeDispatcher    -> END if blocked, else CitationVerifier
//! CitationVerifier   -> RefusalDetector
//! RefusalDetector    -> DisclaimerInjector
//! DisclaimerInjector -> END
//! ```
//!
//! A disabled stage is still walked, so routing stays the same, but it does
//! not run and is not recorded in `stages_executed`.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use guardian_core::checks::{
    Check, CitationVerifier, CodecAdapter, ContentFilter, DisclaimerInjector, PiiScanner,
    RefusalDetector,
};
use guardian_core::{
    Codec, GuardianError, GuardianSettings, MetricsAggregator, PipelineState, StageConfig, StageId,
    ToonCodec, ValidationRequest, ValidationResponse,
};

use crate::cache::CachedJudge;
use crate::dispatcher::JudgeDispatcher;
use crate::judges::{HeuristicJudge, Judge};
use crate::resilience::CircuitBreaker;

/// Where a route leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Stage(StageId),
    End,
}

/// A stage and the route taken after it.
pub struct Edge {
    pub from: StageId,
    pub route: fn(&PipelineState) -> Node,
}

pub const ENTRY: StageId = StageId::ContentFilter;

pub static EDGES: &[Edge] = &[
    Edge {
        from: StageId::ContentFilter,
        route: after_content_filter,
    },
    Edge {
        from: StageId::PiiScanner,
        route: after_pii_scanner,
    },
    Edge {
        from: StageId::ToonDecoder,
        route: after_toon_decoder,
    },
    Edge {
        from: StageId::JudgeDispatcher,
        route: after_judge_dispatcher,
    },
    Edge {
        from: StageId::CitationVerifier,
        route: after_citation_verifier,
    },
    Edge {
        from: StageId::RefusalDetector,
        route: after_refusal_detector,
    },
    Edge {
        from: StageId::DisclaimerInjector,
        route: after_disclaimer_injector,
    },
];

fn unless_blocked(state: &PipelineState, next: StageId) -> Node {
    if state.is_blocked() {
        Node::End
    } else {
        Node::Stage(next)
    }
}

fn after_content_filter(state: &PipelineState) -> Node {
    unless_blocked(state, StageId::PiiScanner)
}

// Strict mode can block on PII volume.
fn after_pii_scanner(state: &PipelineState) -> Node {
    unless_blocked(state, StageId::ToonDecoder)
}

fn after_toon_decoder(_: &PipelineState) -> Node {
    Node::Stage(StageId::JudgeDispatcher)
}

fn after_judge_dispatcher(state: &PipelineState) -> Node {
    unless_blocked(state, StageId::CitationVerifier)
}

fn after_citation_verifier(_: &PipelineState) -> Node {
    Node::Stage(StageId::RefusalDetector)
}

fn after_refusal_detector(_: &PipelineState) -> Node {
    Node::Stage(StageId::DisclaimerInjector)
}

fn after_disclaimer_injector(_: &PipelineState) -> Node {
    Node::End
}

/// Next node after `stage`.
pub fn route(stage: StageId, state: &PipelineState) -> Node {
    EDGES
        .iter()
        .find(|edge| edge.from == stage)
        .map(|edge| (edge.route)(state))
        .unwrap_or(Node::End)
}

/// A finished run with engine-side detail the response does not carry.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub response: ValidationResponse,

    /// Stages that actually ran, in order
    pub stages_executed: Vec<StageId>,

    pub elapsed: Duration,
}

/// The Guardian pipeline.
///
/// Cheap to share behind an `Arc`: everything inside is read-only except the
/// circuit breaker and the optional verdict cache, which synchronize
/// internally.
pub struct Guardian {
    settings: Arc<GuardianSettings>,
    content_filter: ContentFilter,
    pii_scanner: PiiScanner,
    codec_adapter: CodecAdapter,
    dispatcher: JudgeDispatcher,
    citation_verifier: CitationVerifier,
    refusal_detector: RefusalDetector,
    disclaimer_injector: DisclaimerInjector,
    replacements: Vec<Arc<dyn Check>>,
}

impl Guardian {
    pub fn builder() -> GuardianBuilder {
        GuardianBuilder::new()
    }

    /// Default settings, heuristic judges, TOON codec.
    pub fn new() -> Result<Self, GuardianError> {
        GuardianBuilder::new().build()
    }

    pub fn settings(&self) -> &GuardianSettings {
        &self.settings
    }

    pub fn dispatcher(&self) -> &JudgeDispatcher {
        &self.dispatcher
    }

    /// Validate one response.
    pub async fn validate(&self, request: &ValidationRequest) -> Result<ValidationResponse, GuardianError> {
        self.validate_with_cancellation(request, CancellationToken::new())
            .await
    }

    /// Validate one response, aborting when `cancel` fires.
    pub async fn validate_with_cancellation(
        &self,
        request: &ValidationRequest,
        cancel: CancellationToken,
    ) -> Result<ValidationResponse, GuardianError> {
        Ok(self.run(request, cancel).await?.response)
    }

    /// Walk the stage graph for one request.
    pub async fn run(
        &self,
        request: &ValidationRequest,
        cancel: CancellationToken,
    ) -> Result<PipelineRun, GuardianError> {
        let started = Instant::now();
        let config = StageConfig::resolve(&self.settings, request)?;
        let mut state = PipelineState::from_request(request, &config);

        tracing::debug!(
            mode = %config.moderation_mode,
            format = %config.output_format,
            "Starting validation"
        );

        let mut node = Node::Stage(ENTRY);
        while let Node::Stage(stage) = node {
            if cancel.is_cancelled() {
                return Err(GuardianError::Cancelled);
            }

            if self.is_enabled(stage, &config) {
                tracing::debug!(stage = %stage, "Running stage");
                self.run_stage(stage, &mut state, &config, &cancel).await?;
                state.stages_executed.push(stage);
            } else {
                tracing::debug!(stage = %stage, "Stage disabled, skipping");
            }

            node = route(stage, &state);
        }

        if cancel.is_cancelled() {
            return Err(GuardianError::Cancelled);
        }

        let stages_executed = state.stages_executed.clone();
        let elapsed = started.elapsed();
        let response = MetricsAggregator::aggregate(
            state,
            &config,
            self.codec_adapter.codec().as_ref(),
            elapsed,
        )
        .map_err(GuardianError::Aggregation)?;

        tracing::info!(
            passed = response.validation_passed,
            reason = response.content_block_reason.as_deref().unwrap_or("-"),
            mode = %config.moderation_mode,
            stages = stages_executed.len(),
            warnings = response.metrics.warnings_count,
            elapsed_ms = response.metrics.processing_time_ms,
            "Validation complete"
        );

        Ok(PipelineRun {
            response,
            stages_executed,
            elapsed,
        })
    }

    fn check(&self, stage: StageId) -> Option<&dyn Check> {
        if let Some(check) = self.replacements.iter().find(|c| c.stage() == stage) {
            return Some(check.as_ref());
        }
        match stage {
            StageId::ContentFilter => Some(&self.content_filter),
            StageId::PiiScanner => Some(&self.pii_scanner),
            StageId::ToonDecoder => Some(&self.codec_adapter),
            StageId::CitationVerifier => Some(&self.citation_verifier),
            StageId::RefusalDetector => Some(&self.refusal_detector),
            StageId::DisclaimerInjector => Some(&self.disclaimer_injector),
            StageId::JudgeDispatcher => None,
        }
    }

    fn is_enabled(&self, stage: StageId, config: &StageConfig) -> bool {
        match self.check(stage) {
            Some(check) => check.is_enabled(config),
            None => self.dispatcher.is_enabled(config),
        }
    }

    async fn run_stage(
        &self,
        stage: StageId,
        state: &mut PipelineState,
        config: &StageConfig,
        cancel: &CancellationToken,
    ) -> Result<(), GuardianError> {
        match self.check(stage) {
            Some(check) => check
                .run(state, config)
                .map_err(|source| GuardianError::StageFailed { stage, source }),
            None => self.dispatcher.run(state, config, cancel).await,
        }
    }
}

/// Builder for [`Guardian`].
pub struct GuardianBuilder {
    settings: GuardianSettings,
    judge: Option<Arc<dyn Judge>>,
    codec: Option<Arc<dyn Codec>>,
    replacements: Vec<Arc<dyn Check>>,
}

impl GuardianBuilder {
    pub fn new() -> Self {
        Self {
            settings: GuardianSettings::default(),
            judge: None,
            codec: None,
            replacements: Vec::new(),
        }
    }

    pub fn settings(mut self, settings: GuardianSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Judge used for toxicity, hallucination and tone. Defaults to [`HeuristicJudge`].
    pub fn judge(mut self, judge: Arc<dyn Judge>) -> Self {
        self.judge = Some(judge);
        self
    }

    /// Codec for condensed input. Defaults to [`ToonCodec`].
    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Run `check` in place of the built-in check for `check.stage()`.
    ///
    /// The stage keeps its place in the graph. A later replacement for the
    /// same stage wins.
    pub fn replace_check(mut self, check: Arc<dyn Check>) -> Self {
        self.replacements.retain(|c| c.stage() != check.stage());
        self.replacements.push(check);
        self
    }

    /// Validate settings and assemble the pipeline.
    pub fn build(self) -> Result<Guardian, GuardianError> {
        self.settings.validate()?;
        let custom_rules = self.settings.compile_content_rules()?;

        let mut judge = self.judge.unwrap_or_else(|| Arc::new(HeuristicJudge::new()));
        if self.settings.cache.enabled {
            judge = Arc::new(CachedJudge::from_settings(judge, &self.settings.cache));
        }
        let codec = self.codec.unwrap_or_else(|| Arc::new(ToonCodec::new()));
        let breaker = CircuitBreaker::new(self.settings.circuit_breaker.clone());

        tracing::debug!(
            judge = judge.name(),
            codec = codec.name(),
            custom_rules = custom_rules.len(),
            replaced = self.replacements.len(),
            "Guardian assembled"
        );

        Ok(Guardian {
            content_filter: ContentFilter::with_rules(custom_rules),
            pii_scanner: PiiScanner::new(),
            codec_adapter: CodecAdapter::new(codec),
            dispatcher: JudgeDispatcher::new(judge, breaker),
            citation_verifier: CitationVerifier::new(),
            refusal_detector: RefusalDetector::new(),
            disclaimer_injector: DisclaimerInjector::new(),
            replacements: self.replacements,
            settings: Arc::new(self.settings),
        })
    }
}

impl Default for GuardianBuilder {
    fn default() -> Self {
        Self::new()
    }
}
