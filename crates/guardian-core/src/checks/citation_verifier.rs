//! Citation Verifier
//!
//! **Question**: Do the inline citations point at something real?
//!
//! Numeric `[n]` and author-year `[Smith 2020]` tokens are checked against
//! the request's source list when there is one, otherwise against the
//! reference definitions (`[n] ...` at the start of a line) in the text.

use std::collections::BTreeSet;

use crate::config::StageConfig;
use crate::patterns::{citation_tokens, CitationToken};
use crate::state::{PipelineState, StageId};

use super::{Check, CheckError};

/// The Citation Verifier stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct CitationVerifier;

/// A reference-list entry rather than a citation.
fn is_definition(text: &str, token: &CitationToken<'_>) -> bool {
    let line_start = text[..token.start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    text[line_start..token.start].trim().is_empty()
}

/// Split `Smith et al., 2020` into (`Smith`, `2020`).
fn author_year(inner: &str) -> Option<(&str, &str)> {
    let (author, year) = inner.rsplit_once(' ')?;
    let author = author.trim_end_matches(',').trim_end_matches(" et al.").trim();
    let year = year.get(..4)?;
    Some((author, year))
}

impl CitationVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Citation tokens that cannot be matched, in order of first appearance.
    pub fn unmatched(&self, text: &str, sources: Option<&[String]>) -> Vec<String> {
        let tokens = citation_tokens(text);

        let defined: BTreeSet<usize> = tokens
            .iter()
            .filter(|t| is_definition(text, t))
            .filter_map(|t| t.inner.parse().ok())
            .collect();

        let mut fake: Vec<String> = Vec::new();
        for token in tokens.iter().filter(|t| !is_definition(text, t)) {
            let matched = match (token.inner.parse::<usize>(), sources) {
                (Ok(n), Some(sources)) => (1..=sources.len()).contains(&n),
                (Ok(n), None) => defined.contains(&n),
                (Err(_), Some(sources)) => match author_year(token.inner) {
                    Some((author, year)) => {
                        let author = author.to_lowercase();
                        sources.iter().any(|s| {
                            let s = s.to_lowercase();
                            s.contains(&author) && s.contains(year)
                        })
                    }
                    None => false,
                },
                (Err(_), None) => true,
            };
            if !matched && !fake.iter().any(|f| f == token.token) {
                fake.push(token.token.to_string());
            }
        }
        fake
    }
}

impl Check for CitationVerifier {
    fn stage(&self) -> StageId {
        StageId::CitationVerifier
    }

    fn is_enabled(&self, config: &StageConfig) -> bool {
        config.flags.citation_verifier
    }

    fn run(&self, state: &mut PipelineState, _config: &StageConfig) -> Result<(), CheckError> {
        let fake = self.unmatched(&state.working_text, state.sources.as_deref());
        if !fake.is_empty() {
            tracing::debug!(fake = ?fake, "Unverifiable citations");
        }
        state.set_citations(fake)
    }
}
