//! PII Scanner
//!
//! **Question**: Does the text expose personal data or credentials?
//!
//! Detectors claim spans in priority order (credential, email, credit card,
//! national id, phone); a match overlapping an already-claimed span is
//! dropped. Leaks are reported sorted by location, with masked values only.
//!
//! The scanner never blocks, except in strict mode when the leak count
//! exceeds `strict_pii_limit`.
//!
//! Condensed TOON can hide a value behind a JSON escape (`a\u0040b.com`), so
//! the codec adapter calls [`PiiScanner::rescan_decoded`] after it expands
//! the text.

use crate::config::StageConfig;
use crate::patterns::pii_detectors;
use crate::policy::REASON_PII;
use crate::state::{PipelineState, StageId};
use crate::types::{ModerationMode, PiiKind, PiiLeak, Span};

use super::{Check, CheckError};

/// The PII Scanner stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct PiiScanner;

impl PiiScanner {
    pub fn new() -> Self {
        Self
    }

    /// Find non-overlapping leaks in `text`, sorted by location.
    pub fn scan(&self, text: &str) -> Vec<PiiLeak> {
        let mut leaks: Vec<PiiLeak> = Vec::new();

        for (kind, pattern) in pii_detectors() {
            for m in pattern.find_iter(text) {
                let span = Span::new(m.start(), m.end());
                if span.is_empty() || leaks.iter().any(|l| l.location.overlaps(&span)) {
                    continue;
                }
                leaks.push(PiiLeak {
                    kind,
                    location: span,
                    redacted_value: mask(kind, m.as_str()),
                });
            }
        }

        leaks.sort_by_key(|l| l.location);
        leaks
    }

    /// Replace every leak span with its placeholder.
    ///
    /// `leaks` must be sorted and non-overlapping, as returned by [`scan`](Self::scan).
    pub fn redact(&self, text: &str, leaks: &[PiiLeak]) -> Result<String, CheckError> {
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for leak in leaks {
            let Span { start, end } = leak.location;
            if start < cursor || end > text.len() || !text.is_char_boundary(start) || !text.is_char_boundary(end) {
                return Err(CheckError::InvalidSpan {
                    start,
                    end,
                    len: text.len(),
                });
            }
            out.push_str(&text[cursor..start]);
            out.push_str(&leak.kind.placeholder());
            cursor = end;
        }
        out.push_str(&text[cursor..]);
        Ok(out)
    }

    /// Second pass over text the codec just expanded.
    ///
    /// Redacts per config and records only leaks not already reported by the
    /// first pass. Never blocks: the strict-mode decision was made on the
    /// first pass and the graph no longer routes on it.
    pub fn rescan_decoded(&self, state: &mut PipelineState, config: &StageConfig) -> Result<(), CheckError> {
        let leaks = self.scan(&state.working_text);
        if leaks.is_empty() {
            return Ok(());
        }

        if config.redact_pii {
            state.working_text = self.redact(&state.working_text, &leaks)?;
            state.output_redacted = true;
        }

        let fresh: Vec<PiiLeak> = leaks
            .into_iter()
            .filter(|leak| {
                !state
                    .pii_leaks
                    .iter()
                    .any(|known| known.kind == leak.kind && known.redacted_value == leak.redacted_value)
            })
            .collect();
        if !fresh.is_empty() {
            tracing::debug!(count = fresh.len(), "PII surfaced after decoding");
            state.pii_leaks.extend(fresh);
        }
        Ok(())
    }
}

/// Masked rendering of a detected value.
fn mask(kind: PiiKind, value: &str) -> String {
    match kind {
        PiiKind::Email => match value.split_once('@') {
            Some((local, domain)) => {
                let first = local.chars().next().map(String::from).unwrap_or_default();
                format!("{}***@{}", first, domain)
            }
            None => "***".to_string(),
        },
        PiiKind::Phone | PiiKind::NationalId | PiiKind::CreditCard => {
            let total = value.chars().filter(|c| c.is_ascii_alphanumeric()).count();
            let keep_from = total.saturating_sub(4);
            let mut seen = 0;
            value
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() {
                        seen += 1;
                        if seen <= keep_from {
                            return '*';
                        }
                    }
                    c
                })
                .collect()
        }
        PiiKind::Credential => "********".to_string(),
    }
}

impl Check for PiiScanner {
    fn stage(&self) -> StageId {
        StageId::PiiScanner
    }

    fn is_enabled(&self, config: &StageConfig) -> bool {
        config.flags.pii_scanner
    }

    fn run(&self, state: &mut PipelineState, config: &StageConfig) -> Result<(), CheckError> {
        let leaks = self.scan(&state.working_text);
        if leaks.is_empty() {
            return Ok(());
        }

        tracing::debug!(count = leaks.len(), "PII detected");

        if config.redact_pii {
            state.working_text = self.redact(&state.working_text, &leaks)?;
            state.output_redacted = true;
        }

        let count = leaks.len();
        state.pii_leaks.extend(leaks);

        if config.moderation_mode == ModerationMode::Strict && count > config.strict_pii_limit {
            state.block(REASON_PII)?;
        }
        Ok(())
    }
}
