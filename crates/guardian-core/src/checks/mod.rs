//! Pattern-based pipeline stages.
//!
//! Each check answers one question about the working text:
//!
//! | Check | Question |
//! |-------|----------|
//! | [`ContentFilter`] | Does the text contain disallowed content? |
//! | [`PiiScanner`] | Does the text expose personal data or credentials? |
//! | [`CodecAdapter`] | Is the text condensed TOON that must be expanded first? |
//! | [`CitationVerifier`] | Do the citations point at real sources? |
//! | [`RefusalDetector`] | Did the model refuse a harmless request? |
//! | [`DisclaimerInjector`] | Does a regulated topic need a disclaimer? |
//!
//! Checks are synchronous and never touch the network. The engine decides
//! ordering and short-circuiting; a check only reads and writes state.

use thiserror::Error;

use crate::config::StageConfig;
use crate::state::{PipelineState, StageId};

pub mod citation_verifier;
pub mod codec_adapter;
pub mod content_filter;
pub mod disclaimer_injector;
pub mod pii_scanner;
pub mod refusal_detector;

pub use citation_verifier::CitationVerifier;
pub use codec_adapter::CodecAdapter;
pub use content_filter::{ContentFilter, ContentRule};
pub use disclaimer_injector::DisclaimerInjector;
pub use pii_scanner::PiiScanner;
pub use refusal_detector::RefusalDetector;

/// Unexpected faults inside a stage.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CheckError {
    #[error("state field '{0}' was already set by another stage")]
    FieldAlreadySet(&'static str),

    #[error("content was already blocked")]
    AlreadyBlocked,

    #[error("span {start}..{end} is not valid in text of length {len}")]
    InvalidSpan { start: usize, end: usize, len: usize },

    #[error("internal error: {0}")]
    Internal(String),
}

/// A synchronous pipeline stage.
pub trait Check: Send + Sync {
    /// The graph node this check implements.
    fn stage(&self) -> StageId;

    /// Whether the resolved config asks for this check.
    fn is_enabled(&self, config: &StageConfig) -> bool;

    /// Inspect and update state.
    fn run(&self, state: &mut PipelineState, config: &StageConfig) -> Result<(), CheckError>;
}
