//! Codec Adapter
//!
//! **Question**: Is the response condensed TOON that must be expanded before
//! the remaining stages can read it?
//!
//! Malformed input never fails the pipeline: the raw text is kept and a
//! warning is recorded. Decoded text is scanned for PII again when the PII
//! scanner is enabled.

use std::sync::Arc;

use crate::codec::{Codec, ToonCodec};
use crate::config::StageConfig;
use crate::state::{PipelineState, StageId};
use crate::types::OutputFormat;

use super::{Check, CheckError, PiiScanner};

/// The `toon_decoder` stage.
#[derive(Clone)]
pub struct CodecAdapter {
    codec: Arc<dyn Codec>,
}

impl CodecAdapter {
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }
}

impl Default for CodecAdapter {
    fn default() -> Self {
        Self::new(Arc::new(ToonCodec::new()))
    }
}

impl std::fmt::Debug for CodecAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecAdapter").field("codec", &self.codec.name()).finish()
    }
}

impl Check for CodecAdapter {
    fn stage(&self) -> StageId {
        StageId::ToonDecoder
    }

    fn is_enabled(&self, config: &StageConfig) -> bool {
        config.flags.toon_decoder && config.output_format == OutputFormat::Toon
    }

    fn run(&self, state: &mut PipelineState, config: &StageConfig) -> Result<(), CheckError> {
        match self.codec.decode(&state.working_text) {
            Ok(canonical) => {
                tracing::debug!(codec = self.codec.name(), "Decoded condensed response");
                state.working_text = canonical;
                state.was_toon = true;
                if config.flags.pii_scanner {
                    PiiScanner::new().rescan_decoded(state, config)?;
                }
            }
            Err(e) => {
                state.warn(format!("{} decode failed, keeping raw text: {}", self.codec.name(), e));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::test_support::{config, state};
    use crate::types::ModerationMode;

    fn toon_config() -> StageConfig {
        let mut cfg = config(ModerationMode::Moderate);
        cfg.output_format = OutputFormat::Toon;
        cfg
    }

    #[test]
    fn test_decodes_toon_to_json() {
        let cfg = toon_config();
        let mut s = state("answer: 42\nunits[2]: m,s", &cfg);
        CodecAdapter::default().run(&mut s, &cfg).unwrap();
        assert_eq!(s.working_text, r#"{"answer":42,"units":["m","s"]}"#);
        assert!(s.was_toon);
        assert!(s.warnings.is_empty());
    }

    #[test]
    fn test_malformed_input_keeps_raw_text() {
        let cfg = toon_config();
        let raw = "items[3]: a,b";
        let mut s = state(raw, &cfg);
        CodecAdapter::default().run(&mut s, &cfg).unwrap();
        assert_eq!(s.working_text, raw);
        assert!(!s.was_toon);
        assert_eq!(s.warnings.len(), 1);
        assert!(s.warnings[0].contains("line 1"));
    }

    #[test]
    fn test_escaped_email_is_redacted_after_decoding() {
        let cfg = toon_config();
        let raw = r#"contact: "a\u0040b.com""#;
        let mut s = state(raw, &cfg);

        PiiScanner::new().run(&mut s, &cfg).unwrap();
        assert!(s.pii_leaks.is_empty());

        CodecAdapter::default().run(&mut s, &cfg).unwrap();
        assert!(s.was_toon);
        assert!(!s.working_text.contains("a@b.com"));
        assert!(s.working_text.contains("[REDACTED:email]"));
        assert!(s.output_redacted);
        assert_eq!(s.pii_leaks.len(), 1);
        assert_eq!(s.pii_leaks[0].kind, crate::types::PiiKind::Email);
    }

    #[test]
    fn test_rescan_does_not_double_count_unredacted_leaks() {
        let mut cfg = toon_config();
        cfg.redact_pii = false;
        let mut s = state("contact: x@example.org", &cfg);

        PiiScanner::new().run(&mut s, &cfg).unwrap();
        assert_eq!(s.pii_leaks.len(), 1);

        CodecAdapter::default().run(&mut s, &cfg).unwrap();
        assert_eq!(s.working_text, r#"{"contact":"x@example.org"}"#);
        assert_eq!(s.pii_leaks.len(), 1);
    }

    #[test]
    fn test_json_format_disables_stage() {
        let cfg = config(ModerationMode::Moderate);
        assert!(!CodecAdapter::default().is_enabled(&cfg));
        assert!(CodecAdapter::default().is_enabled(&toon_config()));
    }
}
