//! Quality gate
//!
//! Pure accept/reject decision over extracted text. Length is counted in
//! characters, not bytes.

use crate::config::DetectionFailurePolicy;
use crate::extract::language::{same_language, LanguageDetector};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a text was filtered out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    TooShort,
    LanguageMismatch,
    DetectionFailed,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RejectReason::TooShort => "too short",
            RejectReason::LanguageMismatch => "language mismatch",
            RejectReason::DetectionFailed => "detection failed",
        };
        f.write_str(reason)
    }
}

/// Outcome of the quality gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Keep the text; `language` is None when detection failed and the
    /// policy let it through anyway
    Accepted { language: Option<String> },
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted { .. })
    }
}

/// Decides whether `text` is worth keeping
///
/// # Rules
///
/// 1. Fewer than `min_length` characters (or no text at all) → `TooShort`
/// 2. Detected language differs from `expected_lang` → `LanguageMismatch`
/// 3. Detection fails → `DetectionFailed` or accept, per `on_detection_failure`
/// 4. Otherwise accept
///
/// # Arguments
///
/// * `text` - The normalized text
/// * `min_length` - Minimum number of characters
/// * `expected_lang` - ISO 639 code the text must be written in
/// * `detector` - Language detection capability
/// * `on_detection_failure` - What to do when the detector gives up
pub fn accept(
    text: &str,
    min_length: usize,
    expected_lang: &str,
    detector: &dyn LanguageDetector,
    on_detection_failure: DetectionFailurePolicy,
) -> Verdict {
    if text.is_empty() || text.chars().count() < min_length {
        return Verdict::Rejected(RejectReason::TooShort);
    }

    match detector.detect(text) {
        Some(language) if same_language(&language, expected_lang) => Verdict::Accepted {
            language: Some(language),
        },
        Some(_) => Verdict::Rejected(RejectReason::LanguageMismatch),
        None => match on_detection_failure {
            DetectionFailurePolicy::Accept => Verdict::Accepted { language: None },
            DetectionFailurePolicy::Reject => Verdict::Rejected(RejectReason::DetectionFailed),
        },
    }
}
