//! # guardian-core
//!
//! Deterministic building blocks of the Guardian output validation pipeline.
//!
//! Guardian validates model-generated responses before they reach a caller.
//! This crate holds everything that can be decided without calling a model:
//! - The per-request [`PipelineState`] and resolved [`StageConfig`]
//! - Pattern-based checks (content filter, PII scanner, citation verifier,
//!   refusal detector, disclaimer injector)
//! - The TOON [`Codec`] and its pipeline adapter
//! - Moderation-mode blocking policy
//! - The [`MetricsAggregator`] that folds state into a [`ValidationResponse`]
//! - The input-side [`Sentinel`], which screens prompts for injection and PII
//!
//! The concurrent LLM judges and the stage graph engine live in
//! `guardian-runtime`.
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same text and settings always produce the same findings
//! 2. **No LLM calls**: Every check in this crate is rule-based
//! 3. **Set-once metrics**: A metric field written twice is a stage failure
//! 4. **Isolated**: State is owned by one run; rule tables are read-only
//!
//! ## Example
//!
//! ```rust,ignore
//! use guardian_core::{GuardianSettings, PipelineState, StageConfig, ValidationRequest};
//! use guardian_core::checks::{Check, PiiScanner};
//!
//! let settings = GuardianSettings::default();
//! let request = ValidationRequest::new("Contact me at a@b.com");
//! let config = StageConfig::resolve(&settings, &request)?;
//! let mut state = PipelineState::from_request(&request, &config);
//!
//! PiiScanner::new().run(&mut state, &config)?;
//! assert_eq!(state.pii_leaks.len(), 1);
//! ```

pub mod aggregator;
pub mod checks;
pub mod codec;
pub mod config;
pub mod heuristics;
pub mod patterns;
pub mod policy;
pub mod sentinel;
pub mod state;
pub mod types;

pub use aggregator::MetricsAggregator;
pub use checks::{Check, CheckError};
pub use codec::{Codec, CodecError, ToonCodec};
pub use config::{
    CacheSettings, CircuitBreakerSettings, ContentRuleSpec, GuardianSettings, SentinelFlags,
    SettingsError, StageConfig, StageFlags, ToxicityThresholds,
};
pub use sentinel::{Sentinel, SentinelConfig, SentinelReport, Threat, ThreatKind};
pub use state::{PipelineState, StageId};
pub use types::{
    JudgeKind, JudgeVerdict, ModerationMode, OutputFormat, PiiKind, PiiLeak, Span,
    ValidateConfig, ValidationMetrics, ValidationRequest, ValidationResponse,
};

use thiserror::Error;

/// Errors that can occur before or during a validation run.
#[derive(Error, Debug)]
pub enum GuardianError {
    /// The request or settings cannot be turned into a runnable configuration.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// A pattern stage hit an unexpected fault. Fatal to the request.
    #[error("Stage {stage} failed: {source}")]
    StageFailed {
        stage: StageId,
        #[source]
        source: CheckError,
    },

    /// The finished state could not be folded into a response.
    #[error("Response aggregation failed: {0}")]
    Aggregation(CheckError),

    /// The caller cancelled the run before it reached a terminal state.
    #[error("Validation cancelled")]
    Cancelled,
}

impl GuardianError {
    /// Whether this error was caused by the caller's input rather than the pipeline.
    pub fn is_client_error(&self) -> bool {
        matches!(self, GuardianError::InvalidConfig(_) | GuardianError::Settings(_))
    }
}
