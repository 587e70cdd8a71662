//! Service settings and the per-request resolved [`StageConfig`].
//!
//! Settings are loaded once (YAML or JSON), validated, and shared read-only.
//! Each request merges its own `config` block over `settings.defaults` to
//! produce one immutable `StageConfig` before the engine starts.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::checks::content_filter::ContentRule;
use crate::sentinel::SentinelConfig;
use crate::types::{ModerationMode, OutputFormat, ValidationRequest};
use crate::GuardianError;

/// Errors from loading or validating settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Settings validation failed: {0}")]
    ValidationError(String),
}

/// Durations written as humantime strings ("2s", "500ms", "1h").
mod duration_human {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// One enable flag per stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageFlags {
    pub content_filter: bool,
    pub pii_scanner: bool,
    pub toon_decoder: bool,
    pub hallucination_detector: bool,
    pub citation_verifier: bool,
    pub tone_checker: bool,
    pub refusal_detector: bool,
    pub disclaimer_injector: bool,
}

impl StageFlags {
    pub fn all() -> Self {
        Self {
            content_filter: true,
            pii_scanner: true,
            toon_decoder: true,
            hallucination_detector: true,
            citation_verifier: true,
            tone_checker: true,
            refusal_detector: true,
            disclaimer_injector: true,
        }
    }

    pub fn any(&self) -> bool {
        *self != Self::default()
    }
}

/// One enable flag per input-side Sentinel check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelFlags {
    pub sanitization: bool,
    pub pii_redaction: bool,
    pub xss_protection: bool,
    pub sql_injection_detection: bool,
    pub command_injection_detection: bool,
}

impl SentinelFlags {
    pub fn all() -> Self {
        Self {
            sanitization: true,
            pii_redaction: true,
            xss_protection: true,
            sql_injection_detection: true,
            command_injection_detection: true,
        }
    }

    pub fn any(&self) -> bool {
        *self != Self::default()
    }

    /// Request-level overrides over these defaults.
    pub fn resolve(&self, overrides: &SentinelConfig) -> Self {
        Self {
            sanitization: overrides.enable_sanitization.unwrap_or(self.sanitization),
            pii_redaction: overrides.enable_pii_redaction.unwrap_or(self.pii_redaction),
            xss_protection: overrides.enable_xss_protection.unwrap_or(self.xss_protection),
            sql_injection_detection: overrides
                .enable_sql_injection_detection
                .unwrap_or(self.sql_injection_detection),
            command_injection_detection: overrides
                .enable_command_injection_detection
                .unwrap_or(self.command_injection_detection),
        }
    }
}

/// Toxicity block thresholds per mode. A score strictly above the threshold blocks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToxicityThresholds {
    pub strict: f64,
    pub moderate: f64,
    pub relaxed: f64,
}

impl Default for ToxicityThresholds {
    fn default() -> Self {
        Self {
            strict: 0.30,
            moderate: 0.60,
            relaxed: 0.85,
        }
    }
}

impl ToxicityThresholds {
    /// Threshold for a mode; `None` for raw, which never blocks on toxicity.
    pub fn for_mode(&self, mode: ModerationMode) -> Option<f64> {
        match mode {
            ModerationMode::Strict => Some(self.strict),
            ModerationMode::Moderate => Some(self.moderate),
            ModerationMode::Relaxed => Some(self.relaxed),
            ModerationMode::Raw => None,
        }
    }

    fn validate(&self) -> Result<(), SettingsError> {
        for (name, value) in [("strict", self.strict), ("moderate", self.moderate), ("relaxed", self.relaxed)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SettingsError::ValidationError(format!(
                    "thresholds.{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if !(self.strict <= self.moderate && self.moderate <= self.relaxed) {
            return Err(SettingsError::ValidationError(format!(
                "thresholds must satisfy strict <= moderate <= relaxed, got {} / {} / {}",
                self.strict, self.moderate, self.relaxed
            )));
        }
        Ok(())
    }
}

/// A custom content-filter rule: exactly one of `pattern` (regex) or `term`
/// (literal, case-insensitive, word-bounded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRuleSpec {
    pub category: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
}

impl ContentRuleSpec {
    pub fn term(category: impl Into<String>, term: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            pattern: None,
            term: Some(term.into()),
        }
    }

    pub fn pattern(category: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            pattern: Some(pattern.into()),
            term: None,
        }
    }
}

/// Circuit breaker settings for judge calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Failures before opening the circuit
    pub failure_threshold: u32,

    /// Time before attempting recovery
    #[serde(with = "duration_human")]
    pub recovery_timeout: Duration,

    /// Successes needed to close the circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// Judge verdict cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub max_entries: u64,
    #[serde(with = "duration_human")]
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Service-level defaults for Guardian.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardianSettings {
    /// Stage flags used when a request does not say otherwise
    pub defaults: StageFlags,

    /// Replace PII spans with `[REDACTED:<kind>]`
    pub redact_pii: bool,

    /// In strict mode, more leaks than this blocks the response
    pub strict_pii_limit: usize,

    pub thresholds: ToxicityThresholds,

    /// Shared deadline for all judge calls of one request
    #[serde(with = "duration_human")]
    pub judge_deadline: Duration,

    /// Encode the validated text back to TOON when the input was TOON
    pub reencode_toon_output: bool,

    /// Extra content-filter rules, checked after the built-in ones
    pub content_rules: Vec<ContentRuleSpec>,

    pub circuit_breaker: CircuitBreakerSettings,

    pub cache: CacheSettings,

    /// Input-side checks used when a prompt's config does not say otherwise
    pub sentinel: SentinelFlags,
}

impl Default for GuardianSettings {
    fn default() -> Self {
        Self {
            defaults: StageFlags::default(),
            redact_pii: true,
            strict_pii_limit: 3,
            thresholds: ToxicityThresholds::default(),
            judge_deadline: Duration::from_secs(2),
            reencode_toon_output: false,
            content_rules: Vec::new(),
            circuit_breaker: CircuitBreakerSettings::default(),
            cache: CacheSettings::default(),
            sentinel: SentinelFlags::default(),
        }
    }
}

impl GuardianSettings {
    /// Parse and validate settings from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, SettingsError> {
        let settings: GuardianSettings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse and validate settings from JSON.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: GuardianSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file; `.json` files are parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, SettingsError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check thresholds, deadlines and custom rules.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.thresholds.validate()?;
        if self.judge_deadline.is_zero() {
            return Err(SettingsError::ValidationError(
                "judge_deadline must be greater than zero".to_string(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 || self.circuit_breaker.success_threshold == 0 {
            return Err(SettingsError::ValidationError(
                "circuit_breaker thresholds must be at least 1".to_string(),
            ));
        }
        self.compile_content_rules()?;
        Ok(())
    }

    /// Compile the custom content rules.
    pub fn compile_content_rules(&self) -> Result<Vec<ContentRule>, SettingsError> {
        self.content_rules.iter().map(ContentRule::from_spec).collect()
    }
}

/// Resolved, immutable per-request configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StageConfig {
    pub flags: StageFlags,
    pub moderation_mode: ModerationMode,
    pub output_format: OutputFormat,
    pub redact_pii: bool,
    pub strict_pii_limit: usize,
    pub thresholds: ToxicityThresholds,
    pub judge_deadline: Duration,
    pub reencode_toon_output: bool,
}

impl StageConfig {
    /// Merge request-level overrides over service defaults.
    ///
    /// Fails with [`GuardianError::InvalidConfig`] on an unknown mode or format.
    pub fn resolve(settings: &GuardianSettings, request: &ValidationRequest) -> Result<Self, GuardianError> {
        let moderation_mode: ModerationMode = request.moderation_mode.parse()?;
        let output_format: OutputFormat = request.output_format.parse()?;

        let defaults = settings.defaults;
        let overrides = request.config.unwrap_or_default();
        let flags = StageFlags {
            content_filter: overrides.enable_content_filter.unwrap_or(defaults.content_filter),
            pii_scanner: overrides.enable_pii_scanner.unwrap_or(defaults.pii_scanner),
            toon_decoder: overrides.enable_toon_decoder.unwrap_or(defaults.toon_decoder),
            hallucination_detector: overrides
                .enable_hallucination_detector
                .unwrap_or(defaults.hallucination_detector),
            citation_verifier: overrides
                .enable_citation_verifier
                .unwrap_or(defaults.citation_verifier),
            tone_checker: overrides.enable_tone_checker.unwrap_or(defaults.tone_checker),
            refusal_detector: overrides
                .enable_refusal_detector
                .unwrap_or(defaults.refusal_detector),
            disclaimer_injector: overrides
                .enable_disclaimer_injector
                .unwrap_or(defaults.disclaimer_injector),
        };

        Ok(Self {
            flags,
            moderation_mode,
            output_format,
            redact_pii: settings.redact_pii,
            strict_pii_limit: settings.strict_pii_limit,
            thresholds: settings.thresholds,
            judge_deadline: settings.judge_deadline,
            reencode_toon_output: settings.reencode_toon_output,
        })
    }

    /// Whether any judge call would be dispatched.
    pub fn any_judge_enabled(&self) -> bool {
        self.flags.content_filter || self.flags.hallucination_detector || self.flags.tone_checker
    }
}
