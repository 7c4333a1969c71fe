//! Affiliation entity resolution
//!
//! Free-text affiliations are normalized, split into components and compared
//! with a fuzzy similarity score. A sighting either matches an existing
//! entity (score at or above the threshold) or becomes a new one.

mod components;
mod normalize;
mod similarity;
mod tables;

pub use components::{extract_components, Components};
pub use normalize::normalize;
pub use similarity::{sequence_ratio, similarity, AffiliationProfile};

use crate::config::AffiliationConfig;
use crate::storage::{Store, StorageResult};

/// Canonical stored record for one real-world affiliation
///
/// Created on the first unmatched sighting and never modified afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AffiliationEntity {
    pub raw_text: String,
    pub normalized: String,
    pub components: Components,
}

impl AffiliationEntity {
    pub fn new(raw_text: &str) -> Self {
        Self::from_profile(raw_text, AffiliationProfile::new(raw_text))
    }

    fn from_profile(raw_text: &str, profile: AffiliationProfile) -> Self {
        Self {
            raw_text: raw_text.trim().to_string(),
            normalized: profile.normalized,
            components: profile.components,
        }
    }
}

/// Returns the best-scoring candidate id, if its score reaches `threshold`
///
/// Candidates are scanned in order; on equal scores the first one wins.
pub fn find_best_match(text: &str, candidates: &[(i64, String)], threshold: f64) -> Option<i64> {
    let profile = AffiliationProfile::new(text);
    best_match(
        &profile,
        candidates
            .iter()
            .map(|(id, candidate)| (*id, AffiliationProfile::new(candidate))),
        threshold,
    )
}

fn best_match<P>(
    profile: &AffiliationProfile,
    candidates: impl IntoIterator<Item = (i64, P)>,
    threshold: f64,
) -> Option<i64>
where
    P: std::borrow::Borrow<AffiliationProfile>,
{
    let mut best: Option<(i64, f64)> = None;
    for (id, candidate) in candidates {
        let score = profile.score(candidate.borrow());
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((id, score));
        }
    }
    best.filter(|(_, score)| *score >= threshold)
        .map(|(id, _)| id)
}

struct KnownAffiliation {
    id: i64,
    profile: AffiliationProfile,
}

/// Maps affiliation sightings onto stored entities
///
/// Profiles of known entities are loaded from the store on first use and kept
/// in memory, so each candidate is normalized once per resolver rather than
/// once per lookup. Entities created through this resolver are added as they
/// are created.
pub struct AffiliationResolver {
    threshold: f64,
    known: Option<Vec<KnownAffiliation>>,
}

impl AffiliationResolver {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            known: None,
        }
    }

    pub fn from_config(config: &AffiliationConfig) -> Self {
        Self::new(config.match_threshold)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Resolves `raw_text` to an affiliation id, creating an entity when nothing matches
    ///
    /// # Arguments
    ///
    /// * `raw_text` - The affiliation as printed
    /// * `store` - Source of existing entities and sink for new ones
    ///
    /// # Returns
    ///
    /// * `Ok(i64)` - Id of the matched or newly created entity
    /// * `Err(StorageError)` - The store could not be read or written
    pub fn resolve<S>(&mut self, raw_text: &str, store: &mut S) -> StorageResult<i64>
    where
        S: Store + ?Sized,
    {
        if self.known.is_none() {
            let loaded = store
                .all_affiliations()?
                .into_iter()
                .map(|(id, text)| KnownAffiliation {
                    id,
                    profile: AffiliationProfile::new(&text),
                })
                .collect::<Vec<_>>();
            tracing::debug!("Loaded {} known affiliations", loaded.len());
            self.known = Some(loaded);
        }
        let known = self.known.get_or_insert_with(Vec::new);

        let profile = AffiliationProfile::new(raw_text);
        let candidates = known.iter().map(|k| (k.id, &k.profile));
        if let Some(id) = best_match(&profile, candidates, self.threshold) {
            tracing::trace!("Affiliation '{}' matched entity {}", raw_text, id);
            return Ok(id);
        }

        let entity = AffiliationEntity::from_profile(raw_text, profile.clone());
        let id = store.upsert_affiliation(&entity)?;
        tracing::debug!("Created affiliation entity {}: {}", id, entity.normalized);
        known.push(KnownAffiliation { id, profile });
        Ok(id)
    }

    /// Drops the in-memory profiles so the next lookup reloads them from the store
    pub fn invalidate(&mut self) {
        self.known = None;
    }
}
