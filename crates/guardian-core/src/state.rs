//! The mutable record threaded through every pipeline stage.
//!
//! One `PipelineState` belongs to exactly one run. Metric fields are private
//! and written through setters that refuse a second write, so a stage cannot
//! silently overwrite another stage's finding.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::checks::CheckError;
use crate::config::StageConfig;
use crate::types::{ModerationMode, OutputFormat, PiiLeak, ValidationRequest};

/// A node of the stage graph (START and END are engine-internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    ContentFilter,
    PiiScanner,
    ToonDecoder,
    JudgeDispatcher,
    CitationVerifier,
    RefusalDetector,
    DisclaimerInjector,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::ContentFilter => "content_filter",
            StageId::PiiScanner => "pii_scanner",
            StageId::ToonDecoder => "toon_decoder",
            StageId::JudgeDispatcher => "judge_dispatcher",
            StageId::CitationVerifier => "citation_verifier",
            StageId::RefusalDetector => "refusal_detector",
            StageId::DisclaimerInjector => "disclaimer_injector",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, field: &'static str) -> Result<(), CheckError> {
    if slot.is_some() {
        return Err(CheckError::FieldAlreadySet(field));
    }
    *slot = Some(value);
    Ok(())
}

/// Per-run validation state.
#[derive(Debug, Clone)]
pub struct PipelineState {
    /// The candidate response as received
    pub input_text: String,

    /// Text the stages operate on; becomes `validated_text` at END
    pub working_text: String,

    pub original_query: Option<String>,
    pub sources: Option<Vec<String>>,
    pub moderation_mode: ModerationMode,
    pub output_format: OutputFormat,

    pub warnings: Vec<String>,
    pub pii_leaks: Vec<PiiLeak>,
    pub output_redacted: bool,
    pub was_toon: bool,

    /// Stages that actually ran, in order
    pub stages_executed: Vec<StageId>,

    content_blocked: bool,
    block_reason: Option<String>,

    toxicity_score: Option<f64>,
    toxicity_details: Option<String>,
    hallucination_detected: Option<bool>,
    hallucination_details: Option<String>,
    tone_compliant: Option<bool>,
    tone_violation_reason: Option<String>,
    citations_verified: Option<bool>,
    fake_citations: Option<Vec<String>>,
    false_refusal_detected: Option<bool>,
    disclaimer_injected: Option<bool>,
    disclaimer_text: Option<String>,
    validated_text: Option<String>,
}

impl PipelineState {
    /// Create state for a run over `input_text`.
    pub fn new(input_text: impl Into<String>, config: &StageConfig) -> Self {
        let input_text = input_text.into();
        Self {
            working_text: input_text.clone(),
            input_text,
            original_query: None,
            sources: None,
            moderation_mode: config.moderation_mode,
            output_format: config.output_format,
            warnings: Vec::new(),
            pii_leaks: Vec::new(),
            output_redacted: false,
            was_toon: false,
            stages_executed: Vec::new(),
            content_blocked: false,
            block_reason: None,
            toxicity_score: None,
            toxicity_details: None,
            hallucination_detected: None,
            hallucination_details: None,
            tone_compliant: None,
            tone_violation_reason: None,
            citations_verified: None,
            fake_citations: None,
            false_refusal_detected: None,
            disclaimer_injected: None,
            disclaimer_text: None,
            validated_text: None,
        }
    }

    /// Create state from an incoming request and its resolved config.
    pub fn from_request(request: &ValidationRequest, config: &StageConfig) -> Self {
        let mut state = Self::new(request.llm_response.clone(), config);
        state.original_query = request.original_query.clone();
        state.sources = request.sources.clone();
        state
    }

    /// Append a warning and log it.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(warning = %message, "Validation warning");
        self.warnings.push(message);
    }

    /// Halt the pipeline with a reason.
    pub fn block(&mut self, reason: impl Into<String>) -> Result<(), CheckError> {
        if self.content_blocked {
            return Err(CheckError::AlreadyBlocked);
        }
        let reason = reason.into();
        tracing::warn!(reason = %reason, "Content blocked");
        self.content_blocked = true;
        self.block_reason = Some(reason);
        Ok(())
    }

    pub fn is_blocked(&self) -> bool {
        self.content_blocked
    }

    pub fn block_reason(&self) -> Option<&str> {
        self.block_reason.as_deref()
    }

    pub fn set_toxicity(&mut self, score: f64, details: Option<String>) -> Result<(), CheckError> {
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(CheckError::Internal(format!("toxicity score {} outside [0, 1]", score)));
        }
        set_once(&mut self.toxicity_score, score, "toxicity_score")?;
        self.toxicity_details = details;
        Ok(())
    }

    pub fn set_hallucination(&mut self, detected: bool, details: Option<String>) -> Result<(), CheckError> {
        set_once(&mut self.hallucination_detected, detected, "hallucination_detected")?;
        self.hallucination_details = details;
        Ok(())
    }

    pub fn set_tone(&mut self, compliant: bool, reason: Option<String>) -> Result<(), CheckError> {
        set_once(&mut self.tone_compliant, compliant, "tone_compliant")?;
        self.tone_violation_reason = reason;
        Ok(())
    }

    pub fn set_citations(&mut self, fake_citations: Vec<String>) -> Result<(), CheckError> {
        set_once(&mut self.citations_verified, fake_citations.is_empty(), "citations_verified")?;
        self.fake_citations = Some(fake_citations);
        Ok(())
    }

    pub fn set_false_refusal(&mut self, detected: bool) -> Result<(), CheckError> {
        set_once(&mut self.false_refusal_detected, detected, "false_refusal_detected")
    }

    pub fn set_disclaimer(&mut self, text: Option<String>) -> Result<(), CheckError> {
        set_once(&mut self.disclaimer_injected, text.is_some(), "disclaimer_injected")?;
        self.disclaimer_text = text;
        Ok(())
    }

    /// Fix the final text. Only the aggregator calls this, and never for
    /// blocked content.
    pub fn set_validated_text(&mut self, text: String) -> Result<(), CheckError> {
        if self.content_blocked {
            return Err(CheckError::Internal(
                "validated text cannot be set on blocked content".to_string(),
            ));
        }
        set_once(&mut self.validated_text, text, "validated_text")
    }

    pub fn toxicity_score(&self) -> Option<f64> {
        self.toxicity_score
    }

    pub fn toxicity_details(&self) -> Option<&str> {
        self.toxicity_details.as_deref()
    }

    pub fn hallucination_detected(&self) -> Option<bool> {
        self.hallucination_detected
    }

    pub fn hallucination_details(&self) -> Option<&str> {
        self.hallucination_details.as_deref()
    }

    pub fn tone_compliant(&self) -> Option<bool> {
        self.tone_compliant
    }

    pub fn tone_violation_reason(&self) -> Option<&str> {
        self.tone_violation_reason.as_deref()
    }

    pub fn citations_verified(&self) -> Option<bool> {
        self.citations_verified
    }

    pub fn fake_citations(&self) -> Option<&[String]> {
        self.fake_citations.as_deref()
    }

    pub fn false_refusal_detected(&self) -> Option<bool> {
        self.false_refusal_detected
    }

    pub fn disclaimer_injected(&self) -> Option<bool> {
        self.disclaimer_injected
    }

    pub fn disclaimer_text(&self) -> Option<&str> {
        self.disclaimer_text.as_deref()
    }

    pub fn validated_text(&self) -> Option<&str> {
        self.validated_text.as_deref()
    }
}
