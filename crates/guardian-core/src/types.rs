//! Wire types for Guardian: validation request, validation response, and the
//! judge-call vocabulary shared with `guardian-runtime`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::GuardianError;

/// Strictness level controlling thresholds and fail-open/closed policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationMode {
    Strict,
    #[default]
    Moderate,
    Relaxed,
    Raw,
}

impl ModerationMode {
    /// All modes, strictest first.
    pub const ALL: [ModerationMode; 4] = [
        ModerationMode::Strict,
        ModerationMode::Moderate,
        ModerationMode::Relaxed,
        ModerationMode::Raw,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationMode::Strict => "strict",
            ModerationMode::Moderate => "moderate",
            ModerationMode::Relaxed => "relaxed",
            ModerationMode::Raw => "raw",
        }
    }
}

impl fmt::Display for ModerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModerationMode {
    type Err = GuardianError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ModerationMode::Strict),
            "moderate" => Ok(ModerationMode::Moderate),
            "relaxed" => Ok(ModerationMode::Relaxed),
            "raw" => Ok(ModerationMode::Raw),
            other => Err(GuardianError::InvalidConfig(format!(
                "unknown moderation_mode '{}', expected strict, moderate, relaxed or raw",
                other
            ))),
        }
    }
}

/// Format of the candidate response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Toon,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Toon => "toon",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = GuardianError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "toon" => Ok(OutputFormat::Toon),
            other => Err(GuardianError::InvalidConfig(format!(
                "unknown output_format '{}', expected json or toon",
                other
            ))),
        }
    }
}

/// Request-level stage switches.
///
/// `None` means "use the service default". Explicit `false` turns a stage off
/// even when the service enables it by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidateConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_content_filter: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_pii_scanner: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_toon_decoder: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_hallucination_detector: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_citation_verifier: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_tone_checker: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_refusal_detector: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_disclaimer_injector: Option<bool>,
}

impl ValidateConfig {
    /// A config that explicitly enables every stage.
    pub fn all_enabled() -> Self {
        Self {
            enable_content_filter: Some(true),
            enable_pii_scanner: Some(true),
            enable_toon_decoder: Some(true),
            enable_hallucination_detector: Some(true),
            enable_citation_verifier: Some(true),
            enable_tone_checker: Some(true),
            enable_refusal_detector: Some(true),
            enable_disclaimer_injector: Some(true),
        }
    }

    /// A config that explicitly disables every stage.
    pub fn all_disabled() -> Self {
        Self {
            enable_content_filter: Some(false),
            enable_pii_scanner: Some(false),
            enable_toon_decoder: Some(false),
            enable_hallucination_detector: Some(false),
            enable_citation_verifier: Some(false),
            enable_tone_checker: Some(false),
            enable_refusal_detector: Some(false),
            enable_disclaimer_injector: Some(false),
        }
    }
}

fn default_moderation_mode() -> String {
    ModerationMode::default().as_str().to_string()
}

fn default_output_format() -> String {
    OutputFormat::default().as_str().to_string()
}

/// Incoming validation request.
///
/// Mode and format stay strings on the wire so unknown values surface as
/// [`GuardianError::InvalidConfig`] instead of a generic parse failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationRequest {
    /// The candidate model response under validation
    pub llm_response: String,

    #[serde(default = "default_moderation_mode")]
    pub moderation_mode: String,

    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Source prompt, used by hallucination and refusal checks
    #[serde(default)]
    pub original_query: Option<String>,

    /// Source list for citation verification
    #[serde(default)]
    pub sources: Option<Vec<String>>,

    #[serde(default)]
    pub config: Option<ValidateConfig>,
}

impl ValidationRequest {
    /// Create a request with default mode, format and config.
    pub fn new(llm_response: impl Into<String>) -> Self {
        Self {
            llm_response: llm_response.into(),
            moderation_mode: default_moderation_mode(),
            output_format: default_output_format(),
            original_query: None,
            sources: None,
            config: None,
        }
    }

    pub fn with_mode(mut self, mode: ModerationMode) -> Self {
        self.moderation_mode = mode.as_str().to_string();
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format.as_str().to_string();
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.original_query = Some(query.into());
        self
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn with_config(mut self, config: ValidateConfig) -> Self {
        self.config = Some(config);
        self
    }
}

/// Kind of personally identifiable information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    Email,
    Phone,
    NationalId,
    CreditCard,
    Credential,
}

impl PiiKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PiiKind::Email => "email",
            PiiKind::Phone => "phone",
            PiiKind::NationalId => "national_id",
            PiiKind::CreditCard => "credit_card",
            PiiKind::Credential => "credential",
        }
    }

    /// Placeholder written over a redacted span.
    pub fn placeholder(&self) -> String {
        format!("[REDACTED:{}]", self.as_str())
    }
}

impl fmt::Display for PiiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte range in the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A PII occurrence found in the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiiLeak {
    pub kind: PiiKind,

    /// Where the value was found, in the text the scanner saw
    pub location: Span,

    /// Masked rendering of the value; never the full original
    pub redacted_value: String,
}

/// Which judge a call is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeKind {
    Toxicity,
    Hallucination,
    Tone,
}

impl JudgeKind {
    pub const ALL: [JudgeKind; 3] = [JudgeKind::Toxicity, JudgeKind::Hallucination, JudgeKind::Tone];

    pub fn as_str(&self) -> &'static str {
        match self {
            JudgeKind::Toxicity => "toxicity",
            JudgeKind::Hallucination => "hallucination",
            JudgeKind::Tone => "tone",
        }
    }
}

impl fmt::Display for JudgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict returned by a judge call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    /// Whether the judged property is violated (toxic, hallucinated, off-tone)
    pub violation: bool,

    /// Optional score in [0, 1]; required in practice for toxicity
    #[serde(default)]
    pub score: Option<f64>,

    /// Short human-readable explanation
    #[serde(default)]
    pub detail: String,
}

impl JudgeVerdict {
    pub fn pass(detail: impl Into<String>) -> Self {
        Self {
            violation: false,
            score: Some(0.0),
            detail: detail.into(),
        }
    }

    pub fn violation(score: f64, detail: impl Into<String>) -> Self {
        Self {
            violation: true,
            score: Some(score),
            detail: detail.into(),
        }
    }

    /// Score clamped to [0, 1], falling back to the violation flag.
    pub fn normalized_score(&self) -> f64 {
        match self.score {
            Some(s) if s.is_finite() => s.clamp(0.0, 1.0),
            _ if self.violation => 1.0,
            _ => 0.0,
        }
    }
}

/// Detailed validation metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub hallucination_detected: Option<bool>,
    pub hallucination_details: Option<String>,
    pub citations_verified: Option<bool>,
    pub fake_citations: Option<Vec<String>>,
    pub tone_compliant: Option<bool>,
    pub tone_violation_reason: Option<String>,
    pub disclaimer_injected: Option<bool>,
    pub disclaimer_text: Option<String>,
    pub false_refusal_detected: Option<bool>,
    pub toxicity_score: Option<f64>,
    pub toxicity_details: Option<String>,
    pub warnings_count: usize,
    pub pii_leaks_count: usize,
    pub moderation_mode: String,
    pub processing_time_ms: f64,
}

/// Final validation response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResponse {
    /// Validated text; `None` when blocked
    pub validated_response: Option<String>,
    pub validation_passed: bool,
    pub content_blocked: bool,
    pub content_block_reason: Option<String>,
    pub content_warnings: Option<Vec<String>>,
    pub output_pii_leaks: Option<Vec<PiiLeak>>,
    pub output_redacted: bool,
    pub was_toon: bool,
    pub metrics: ValidationMetrics,
    pub validated_at: DateTime<Utc>,
}
