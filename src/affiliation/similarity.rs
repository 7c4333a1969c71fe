//! Fuzzy similarity between affiliation strings

use crate::affiliation::components::{extract_components, Components};
use crate::affiliation::normalize::normalize;
use crate::affiliation::tables::STOP_WORDS;
use similar::TextDiff;
use std::collections::HashSet;

/// Institution names this close (with equal countries) are treated as one entity
const INSTITUTION_RATIO: f64 = 0.85;

/// Score assigned to a same-institution, same-country pair
const SAME_INSTITUTION_SCORE: f64 = 0.9;

/// Bonus for sharing at least two significant tokens
const SHARED_TOKEN_BONUS: f64 = 0.2;

/// Character-level matching ratio in `[0, 1]`: `2 * matches / (len(a) + len(b))`
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    f64::from(TextDiff::from_chars(a, b).ratio())
}

/// Everything similarity needs to know about one affiliation, computed once
#[derive(Debug, Clone, PartialEq)]
pub struct AffiliationProfile {
    pub normalized: String,
    pub components: Components,
    /// Normalized institution, compared instead of the raw segment
    institution_key: Option<String>,
}

impl AffiliationProfile {
    pub fn new(text: &str) -> Self {
        let normalized = normalize(text);
        let components = extract_components(text);
        let institution_key = components
            .institution
            .as_deref()
            .map(normalize)
            .filter(|key| !key.is_empty());
        Self {
            normalized,
            components,
            institution_key,
        }
    }

    fn significant_tokens(&self) -> HashSet<&str> {
        self.normalized
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| c == ',' || c == '.'))
            .filter(|t| !t.is_empty() && !STOP_WORDS.contains(t))
            .collect()
    }

    /// Similarity score in `[0, 1]`
    pub fn score(&self, other: &AffiliationProfile) -> f64 {
        if self.normalized == other.normalized {
            return 1.0;
        }

        if let (Some(a), Some(b)) = (&self.institution_key, &other.institution_key) {
            if sequence_ratio(a, b) > INSTITUTION_RATIO
                && self.components.country == other.components.country
            {
                return SAME_INSTITUTION_SCORE;
            }
        }

        let base = sequence_ratio(&self.normalized, &other.normalized);
        let shared = self
            .significant_tokens()
            .intersection(&other.significant_tokens())
            .count();

        if shared >= 2 {
            (base + SHARED_TOKEN_BONUS).min(1.0)
        } else {
            base
        }
    }
}

/// Similarity between two raw affiliation strings
///
/// 1.0 when they normalize identically; 0.9 when their institutions nearly
/// match and their countries agree; otherwise the character ratio of the
/// normalized forms, raised by 0.2 (capped at 1.0) when they share two or
/// more significant words.
pub fn similarity(a: &str, b: &str) -> f64 {
    AffiliationProfile::new(a).score(&AffiliationProfile::new(b))
}
