//! Disclaimer Injector
//!
//! **Question**: Does the response touch a regulated topic that needs a
//! disclaimer?
//!
//! Topics are checked medical, financial, legal; the first hit wins. A
//! response that already carries a disclaimer is left alone.

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::StageConfig;
use crate::state::{PipelineState, StageId};

use super::{Check, CheckError};

/// A regulated topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Medical,
    Financial,
    Legal,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::Medical, Topic::Financial, Topic::Legal];

    /// Canonical disclaimer appended for this topic.
    pub fn disclaimer(&self) -> &'static str {
        match self {
            Topic::Medical => {
                "Disclaimer: This information is for general educational purposes only and is not medical advice. Consult a qualified healthcare professional about your situation."
            }
            Topic::Financial => {
                "Disclaimer: This information is for general educational purposes only and is not financial advice. Consult a licensed financial advisor before making investment decisions."
            }
            Topic::Legal => {
                "Disclaimer: This information is for general educational purposes only and is not legal advice. Consult a licensed attorney about your specific circumstances."
            }
        }
    }

    fn pattern(&self) -> &'static Regex {
        match self {
            Topic::Medical => &MEDICAL,
            Topic::Financial => &FINANCIAL,
            Topic::Legal => &LEGAL,
        }
    }
}

fn keyword_regex(keywords: &[&str]) -> Regex {
    let alternatives: Vec<String> = keywords.iter().map(|k| regex::escape(k)).collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).unwrap()
}

lazy_static! {
    static ref MEDICAL: Regex = keyword_regex(&[
        "symptom", "symptoms", "diagnosis", "diagnose", "treatment", "prescription",
        "medication", "medications", "dosage", "dose", "doctor", "physician",
        "disease", "illness", "infection", "surgery", "side effects", "mg",
    ]);

    static ref FINANCIAL: Regex = keyword_regex(&[
        "invest", "investing", "investment", "investments", "stock", "stocks",
        "portfolio", "trading", "retirement account", "401k", "ira", "bonds",
        "cryptocurrency", "crypto", "dividend", "dividends", "mortgage", "tax deduction",
    ]);

    static ref LEGAL: Regex = keyword_regex(&[
        "lawyer", "attorney", "lawsuit", "sue", "court", "litigation",
        "contract", "liability", "statute", "legal rights", "custody", "plaintiff",
        "defendant", "copyright infringement",
    ]);

    static ref EXISTING_DISCLAIMER: Regex = Regex::new(
        r"(?i)\b(?:disclaimer|not (?:medical|financial|legal|investment) advice|consult (?:a|an|your) (?:qualified |licensed )?(?:doctor|physician|healthcare|financial|attorney|lawyer|professional|advisor))"
    ).unwrap();
}

/// The Disclaimer Injector stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisclaimerInjector;

impl DisclaimerInjector {
    pub fn new() -> Self {
        Self
    }

    /// The first regulated topic the text touches.
    pub fn detect_topic(&self, text: &str) -> Option<Topic> {
        Topic::ALL.into_iter().find(|t| t.pattern().is_match(text))
    }

    pub fn has_disclaimer(&self, text: &str) -> bool {
        EXISTING_DISCLAIMER.is_match(text)
    }
}

impl Check for DisclaimerInjector {
    fn stage(&self) -> StageId {
        StageId::DisclaimerInjector
    }

    fn is_enabled(&self, config: &StageConfig) -> bool {
        config.flags.disclaimer_injector
    }

    fn run(&self, state: &mut PipelineState, _config: &StageConfig) -> Result<(), CheckError> {
        let topic = match self.detect_topic(&state.working_text) {
            Some(topic) if !self.has_disclaimer(&state.working_text) => topic,
            _ => return state.set_disclaimer(None),
        };

        let disclaimer = topic.disclaimer();
        tracing::debug!(topic = ?topic, "Injecting disclaimer");
        state.set_disclaimer(Some(disclaimer.to_string()))?;
        state.working_text.push_str("\n\n");
        state.working_text.push_str(disclaimer);
        Ok(())
    }
}
