use serde::{Deserialize, Serialize};
use std::fmt;

/// Similarity reported for an exact match
pub const FULL_SIMILARITY: u8 = 100;

/// Outcome of comparing a probe against the registered description.
///
/// `similarity` is a percentage. The exact matcher only ever produces
/// 0 or 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub is_match: bool,
    pub similarity: u8,
}

impl MatchResult {
    /// Result returned when nothing has been registered yet
    pub const NOT_REGISTERED: MatchResult = MatchResult::no_match();

    pub const fn matched() -> Self {
        Self {
            is_match: true,
            similarity: FULL_SIMILARITY,
        }
    }

    pub const fn no_match() -> Self {
        Self {
            is_match: false,
            similarity: 0,
        }
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_match {
            write!(f, "{}%", self.similarity)
        } else {
            f.write_str("Not Match")
        }
    }
}

/// Strategy for comparing a probe payload against the stored description.
pub trait Matcher: Send + Sync {
    fn compare(&self, stored: &[u8], probe: &[u8]) -> MatchResult;
}

/// Byte-for-byte equality. No normalization is applied to either side.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatcher;

impl Matcher for ExactMatcher {
    fn compare(&self, stored: &[u8], probe: &[u8]) -> MatchResult {
        if stored == probe {
            MatchResult::matched()
        } else {
            MatchResult::no_match()
        }
    }
}
