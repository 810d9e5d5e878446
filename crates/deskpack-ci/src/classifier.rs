//! Build failure classification.
//!
//! A failed attempt's captured output is matched against known signatures
//! of infrastructure hiccups. Anything that matches is worth retrying;
//! everything else is treated as a real defect.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Outcome of classifying a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Transient,
    Fatal,
}

/// Decides whether captured build output describes a transient failure.
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, output: &str) -> FailureClass;
}

/// Transient-failure signatures seen from cargo, npm and the bundler's
/// artifact downloads.
pub const DEFAULT_TRANSIENT_SIGNATURES: &[&str] = &[
    // HTTP 5xx / 429 from a registry or artifact mirror
    r"(?i)\bhttp(?:\s+status)?(?:\s+code)?\s*:?\s*(?:5\d{2}|429)\b",
    r"(?i)\bstatus(?:\s+code)?\s*[:=]?\s*(?:5\d{2}|429)\b",
    r"(?i)successful http response.*\bgot (?:5\d{2}|429)\b",
    r"(?i)\b(?:429 too many requests|50[234] (?:bad gateway|service unavailable|gateway time-?out))\b",
    // Generic network failures
    r"(?i)\bnetwork failure\b",
    r"(?i)\bspurious network error\b",
    r"(?i)\bconnection (?:was )?reset\b|\beconnreset\b",
    r"(?i)\btimed out\b|\btimeout\b|\betimedout\b",
    // DNS resolution
    r"(?i)could(?: not|n't) resolve host|failed to lookup address|dns error|name or service not known|temporary failure in name resolution|\beai_again\b",
];

/// Regex-based classifier; any match means transient.
#[derive(Debug, Clone)]
pub struct SignatureClassifier {
    signatures: Vec<Regex>,
}

impl SignatureClassifier {
    /// Build a classifier from custom signature patterns.
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let signatures = patterns
            .into_iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { signatures })
    }

    /// Signature that matched `output`, if any.
    pub fn matching_signature(&self, output: &str) -> Option<&str> {
        self.signatures
            .iter()
            .find(|re| re.is_match(output))
            .map(|re| re.as_str())
    }
}

impl Default for SignatureClassifier {
    fn default() -> Self {
        Self {
            signatures: DEFAULT_TRANSIENT_SIGNATURES
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        }
    }
}

impl FailureClassifier for SignatureClassifier {
    fn classify(&self, output: &str) -> FailureClass {
        if self.matching_signature(output).is_some() {
            FailureClass::Transient
        } else {
            FailureClass::Fatal
        }
    }
}
