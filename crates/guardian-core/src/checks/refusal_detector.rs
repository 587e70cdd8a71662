//! Refusal Detector
//!
//! **Question**: Did the model refuse a request it should have answered?
//!
//! Advisory only. A refusal of a query with no sensitive intent is flagged
//! as a false refusal; nothing here ever blocks.

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::StageConfig;
use crate::state::{PipelineState, StageId};

use super::{Check, CheckError};

lazy_static! {
    static ref REFUSAL_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\bi(?:'m| am)? (?:cannot|can't|can not|won't|will not) (?:help|assist|provide|do|answer|comply)\b").unwrap(),
        Regex::new(r"(?i)\bi(?:'m| am) (?:unable|not able) to\b").unwrap(),
        Regex::new(r"(?i)\bi(?:'m| am) (?:sorry|afraid),? (?:but )?i (?:can(?:'t|not)|won't)\b").unwrap(),
        Regex::new(r"(?i)\bas an ai(?: language model| assistant)?,? i (?:cannot|can't|can not|won't|will not|am unable to|am not able to|don't|do not)\b").unwrap(),
        Regex::new(r"(?i)\bi (?:must|have to) (?:decline|refuse)\b").unwrap(),
        Regex::new(r"(?i)\b(?:that|this) (?:request )?(?:goes against|violates) my (?:guidelines|policies|programming)\b").unwrap(),
    ];

    static ref SENSITIVE_INTENT: Regex = Regex::new(
        r"(?i)\b(hack(?:ing)?|exploit|malware|ransomware|keylogger|phishing|weapons?|bombs?|explosives?|poison|steal(?:ing)?|kill(?:ing)?|murder|suicide|self[- ]harm|drugs?|meth|cocaine|launder(?:ing)?|bypass|jailbreak|counterfeit|stalk(?:ing)?)\b"
    ).unwrap();
}

/// The Refusal Detector stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefusalDetector;

impl RefusalDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn is_refusal(&self, text: &str) -> bool {
        REFUSAL_PATTERNS.iter().any(|p| p.is_match(text))
    }

    /// A query with no sensitive-intent keyword.
    pub fn is_benign(&self, query: &str) -> bool {
        !SENSITIVE_INTENT.is_match(query)
    }
}

impl Check for RefusalDetector {
    fn stage(&self) -> StageId {
        StageId::RefusalDetector
    }

    fn is_enabled(&self, config: &StageConfig) -> bool {
        config.flags.refusal_detector
    }

    fn run(&self, state: &mut PipelineState, _config: &StageConfig) -> Result<(), CheckError> {
        if !self.is_refusal(&state.working_text) {
            return state.set_false_refusal(false);
        }

        let detected = match state.original_query.as_deref() {
            Some(query) => self.is_benign(query),
            None => {
                state.warn("refusal detected but no original_query to compare against");
                false
            }
        };
        if detected {
            tracing::info!("False refusal detected");
        }
        state.set_false_refusal(detected)
    }
}
