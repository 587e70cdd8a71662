//! Sentinel: input-side screening of prompts before they reach a model.
//!
//! Guardian judges what a model says; Sentinel looks at what the caller asks.
//! Every check is opt-in and runs in this order:
//!
//! 1. Sanitization strips control and invisible characters, so the detectors
//!    see the text a model would see
//! 2. XSS, SQL-injection and command-injection detection record every named
//!    rule that matches; any threat blocks the prompt
//! 3. PII redaction replaces personal data with placeholders, only for a
//!    prompt that was not blocked
//!
//! Detection is best-effort pattern matching, like the PII scanner.

use serde::{Deserialize, Serialize};
use std::fmt;

use regex::Regex;

use crate::checks::{CheckError, PiiScanner};
use crate::config::{GuardianSettings, SentinelFlags};
use crate::patterns::{COMMAND_INJECTION_PATTERNS, SQL_INJECTION_PATTERNS, XSS_PATTERNS};
use crate::types::{PiiLeak, Span};

/// Request-level Sentinel switches. `None` means "use the service default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_sanitization: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_pii_redaction: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_xss_protection: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_sql_injection_detection: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_command_injection_detection: Option<bool>,
}

/// Class of injection found in a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatKind {
    Xss,
    SqlInjection,
    CommandInjection,
}

impl ThreatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatKind::Xss => "xss",
            ThreatKind::SqlInjection => "sql_injection",
            ThreatKind::CommandInjection => "command_injection",
        }
    }

    /// Block reason for a prompt whose first threat is of this kind.
    pub fn block_reason(&self) -> String {
        format!("{}_detected", self.as_str())
    }
}

impl fmt::Display for ThreatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rule match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Threat {
    pub kind: ThreatKind,

    /// Name of the rule that matched, e.g. `union_select`
    pub rule: &'static str,

    /// Where it matched, in the text the detectors saw
    pub location: Span,
}

/// Outcome of screening one prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentinelReport {
    pub is_blocked: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,

    /// Prompt safe to forward; `None` when blocked
    pub prompt: Option<String>,

    /// Sanitization changed the text
    pub sanitized: bool,

    /// Sorted by location
    pub threats: Vec<Threat>,

    pub pii_redacted: Vec<PiiLeak>,
}

impl SentinelReport {
    pub fn threats_detected(&self) -> usize {
        self.threats.len()
    }
}

/// The input screener. Cheap to build per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sentinel {
    flags: SentinelFlags,
}

impl Sentinel {
    pub fn new(flags: SentinelFlags) -> Self {
        Self { flags }
    }

    /// Service defaults merged with a prompt's own switches.
    pub fn for_request(settings: &GuardianSettings, config: Option<&SentinelConfig>) -> Self {
        let flags = match config {
            Some(overrides) => settings.sentinel.resolve(overrides),
            None => settings.sentinel,
        };
        Self::new(flags)
    }

    pub fn flags(&self) -> SentinelFlags {
        self.flags
    }

    /// Screen one prompt.
    pub fn inspect(&self, prompt: &str) -> Result<SentinelReport, CheckError> {
        let text = if self.flags.sanitization {
            sanitize(prompt)
        } else {
            prompt.to_string()
        };
        let sanitized = text != prompt;

        let threats = self.detect(&text);
        if let Some(first) = threats.first() {
            let reason = first.kind.block_reason();
            tracing::warn!(
                reason = %reason,
                rule = first.rule,
                threats = threats.len(),
                "Prompt blocked"
            );
            return Ok(SentinelReport {
                is_blocked: true,
                block_reason: Some(reason),
                prompt: None,
                sanitized,
                threats,
                pii_redacted: Vec::new(),
            });
        }

        let (text, pii_redacted) = if self.flags.pii_redaction {
            let scanner = PiiScanner::new();
            let leaks = scanner.scan(&text);
            if leaks.is_empty() {
                (text, leaks)
            } else {
                tracing::debug!(count = leaks.len(), "PII redacted from prompt");
                (scanner.redact(&text, &leaks)?, leaks)
            }
        } else {
            (text, Vec::new())
        };

        Ok(SentinelReport {
            is_blocked: false,
            block_reason: None,
            prompt: Some(text),
            sanitized,
            threats: Vec::new(),
            pii_redacted,
        })
    }

    /// Every enabled rule match in `text`, sorted by location.
    pub fn detect(&self, text: &str) -> Vec<Threat> {
        let tables: [(bool, ThreatKind, &[(&'static str, Regex)]); 3] = [
            (self.flags.xss_protection, ThreatKind::Xss, &XSS_PATTERNS[..]),
            (self.flags.sql_injection_detection, ThreatKind::SqlInjection, &SQL_INJECTION_PATTERNS[..]),
            (
                self.flags.command_injection_detection,
                ThreatKind::CommandInjection,
                &COMMAND_INJECTION_PATTERNS[..],
            ),
        ];

        let mut threats = Vec::new();
        for (enabled, kind, rules) in tables {
            if !enabled {
                continue;
            }
            for (rule, pattern) in rules {
                for m in pattern.find_iter(text) {
                    threats.push(Threat {
                        kind,
                        rule: *rule,
                        location: Span::new(m.start(), m.end()),
                    });
                }
            }
        }

        threats.sort_by_key(|t| (t.location, t.kind));
        threats
    }
}

/// Zero-width and bidi-override characters a reader cannot see.
fn is_invisible(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}')
}

/// Strip control and invisible characters, keeping line breaks and tabs, and trim.
pub fn sanitize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|&c| matches!(c, '\n' | '\r' | '\t') || !(c.is_control() || is_invisible(c)))
        .collect();
    cleaned.trim().to_string()
}
