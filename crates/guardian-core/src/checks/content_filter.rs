//! Content Filter
//!
//! **Question**: Does the text contain content that must never be returned?
//!
//! Rules are scanned in order (built-ins first, then service rules). The
//! first matching rule blocks the response with the rule's category as the
//! reason. A pure function of text and ruleset.

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::{ContentRuleSpec, SettingsError, StageConfig};
use crate::state::{PipelineState, StageId};

use super::{Check, CheckError};

lazy_static! {
    static ref BUILTIN_RULES: Vec<ContentRule> = vec![
        ContentRule::builtin(
            "toxic_language",
            r"(?i)\b(fuck(?:ing|er|ed)?|motherfucker|shit(?:ty)?|bitch(?:es)?|asshole|cunt)\b",
        ),
        ContentRule::builtin(
            "violent_threat",
            r"(?i)\b(?:i(?:'m| am)? (?:going to|gonna|will)|i'll) (?:kill|murder|hurt|shoot|stab) (?:you|him|her|them)\b",
        ),
        ContentRule::builtin(
            "self_harm",
            r"(?i)\b(?:how to|ways to|best way to) (?:kill yourself|commit suicide|end your (?:own )?life)\b",
        ),
        ContentRule::builtin(
            "dangerous_instructions",
            r"(?i)\b(?:how to|steps to|instructions (?:for|to)) (?:make|build|assemble|synthesize) (?:a |an )?(?:bomb|pipe bomb|explosive|nerve agent|bioweapon)s?\b",
        ),
    ];
}

/// A compiled content rule.
#[derive(Debug, Clone)]
pub struct ContentRule {
    pub category: String,
    regex: Regex,
}

impl ContentRule {
    fn builtin(category: &str, pattern: &str) -> Self {
        Self {
            category: category.to_string(),
            regex: Regex::new(pattern).unwrap(),
        }
    }

    /// Compile a service-configured rule.
    pub fn from_spec(spec: &ContentRuleSpec) -> Result<Self, SettingsError> {
        if spec.category.trim().is_empty() {
            return Err(SettingsError::ValidationError(
                "content rule category must not be empty".to_string(),
            ));
        }
        let pattern = match (&spec.pattern, &spec.term) {
            (Some(pattern), None) => pattern.clone(),
            (None, Some(term)) if !term.trim().is_empty() => {
                format!(r"(?i)\b{}\b", regex::escape(term.trim()))
            }
            _ => {
                return Err(SettingsError::ValidationError(format!(
                    "content rule '{}' needs exactly one non-empty 'pattern' or 'term'",
                    spec.category
                )))
            }
        };
        let regex = Regex::new(&pattern).map_err(|e| {
            SettingsError::ValidationError(format!(
                "content rule '{}' has an invalid pattern: {}",
                spec.category, e
            ))
        })?;
        Ok(Self {
            category: spec.category.clone(),
            regex,
        })
    }

    /// First match span, if any.
    pub fn find(&self, text: &str) -> Option<(usize, usize)> {
        self.regex.find(text).map(|m| (m.start(), m.end()))
    }
}

/// The Content Filter stage.
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    custom_rules: Vec<ContentRule>,
}

impl ContentFilter {
    /// Filter with the built-in rules only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter with built-in rules followed by `custom_rules`.
    pub fn with_rules(custom_rules: Vec<ContentRule>) -> Self {
        Self { custom_rules }
    }

    /// Find the first matching rule's category.
    pub fn scan(&self, text: &str) -> Option<&str> {
        BUILTIN_RULES
            .iter()
            .chain(self.custom_rules.iter())
            .find(|rule| rule.find(text).is_some())
            .map(|rule| rule.category.as_str())
    }
}

impl Check for ContentFilter {
    fn stage(&self) -> StageId {
        StageId::ContentFilter
    }

    fn is_enabled(&self, config: &StageConfig) -> bool {
        config.flags.content_filter
    }

    fn run(&self, state: &mut PipelineState, _config: &StageConfig) -> Result<(), CheckError> {
        if let Some(category) = self.scan(&state.working_text) {
            let category = category.to_string();
            state.block(category)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::test_support::{config, state};
    use crate::types::ModerationMode;

    #[test]
    fn test_clean_text_passes() {
        let cfg = config(ModerationMode::Moderate);
        let mut s = state("Here is a summary of the quarterly report.", &cfg);
        ContentFilter::new().run(&mut s, &cfg).unwrap();
        assert!(!s.is_blocked());
        assert!(s.block_reason().is_none());
    }

    #[test]
    fn test_profanity_blocks_with_category() {
        let cfg = config(ModerationMode::Moderate);
        let mut s = state("This is a shitty answer.", &cfg);
        ContentFilter::new().run(&mut s, &cfg).unwrap();
        assert!(s.is_blocked());
        assert_eq!(s.block_reason(), Some("toxic_language"));
    }

    #[test]
    fn test_threat_detected() {
        let filter = ContentFilter::new();
        assert_eq!(filter.scan("If you do that I will hurt you."), Some("violent_threat"));
        assert_eq!(filter.scan("I'll kill them all"), Some("violent_threat"));
        assert_eq!(filter.scan("The process will kill the job."), None);
    }

    #[test]
    fn test_dangerous_instructions_detected() {
        let filter = ContentFilter::new();
        assert_eq!(
            filter.scan("Here are steps to build a pipe bomb"),
            Some("dangerous_instructions")
        );
    }

    #[test]
    fn test_custom_term_is_word_bounded() {
        let rule = ContentRule::from_spec(&ContentRuleSpec::term("competitor_mention", "Acme")).unwrap();
        let filter = ContentFilter::with_rules(vec![rule]);
        assert_eq!(filter.scan("Try ACME instead."), Some("competitor_mention"));
        assert_eq!(filter.scan("The acmes were fine."), None);
    }

    #[test]
    fn test_custom_pattern_checked_after_builtins() {
        let rule = ContentRule::from_spec(&ContentRuleSpec::pattern("internal_hostname", r"\b[a-z]+\.corp\.internal\b")).unwrap();
        let filter = ContentFilter::with_rules(vec![rule]);
        assert_eq!(filter.scan("ssh to db1.corp.internal"), None);
        assert_eq!(filter.scan("ssh to db.corp.internal"), Some("internal_hostname"));
        assert_eq!(filter.scan("fuck, ssh to db.corp.internal"), Some("toxic_language"));
    }

    #[test]
    fn test_rule_spec_needs_exactly_one_matcher() {
        let spec = ContentRuleSpec {
            category: "both".to_string(),
            pattern: Some("a".to_string()),
            term: Some("b".to_string()),
        };
        assert!(ContentRule::from_spec(&spec).is_err());

        let spec = ContentRuleSpec {
            category: "neither".to_string(),
            pattern: None,
            term: None,
        };
        assert!(ContentRule::from_spec(&spec).is_err());
    }
}
