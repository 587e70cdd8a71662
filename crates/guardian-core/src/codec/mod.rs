//! Condensed-format codecs.
//!
//! The pipeline only needs `decode` (condensed text to canonical JSON text)
//! and `encode` (the reverse). [`ToonCodec`] is the default implementation.

use thiserror::Error;

pub mod toon;

pub use toon::ToonCodec;

/// Malformed codec input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: declared {declared} items, found {actual}")]
    LengthMismatch {
        line: usize,
        declared: usize,
        actual: usize,
    },

    #[error("input is not valid JSON: {0}")]
    InvalidJson(String),
}

impl CodecError {
    pub(crate) fn syntax(line: usize, message: impl Into<String>) -> Self {
        CodecError::Syntax {
            line,
            message: message.into(),
        }
    }
}

/// A reversible text format.
pub trait Codec: Send + Sync {
    /// Short format name for logs.
    fn name(&self) -> &'static str;

    /// Condensed text to canonical (compact JSON) text.
    fn decode(&self, text: &str) -> Result<String, CodecError>;

    /// Canonical JSON text to condensed text.
    fn encode(&self, text: &str) -> Result<String, CodecError>;
}
