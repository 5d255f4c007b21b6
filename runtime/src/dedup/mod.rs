//! Duplicate detection for validated spots.
//!
//! Pure functions over already-fetched neighbours; the caller does the
//! storage query.

use crate::config::DedupConfig;
use crate::extraction::text::{fold, token_sort};
use crate::trust::validator::ValidatedSpot;
use strsim::normalized_levenshtein;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

const EPSILON: f64 = 1e-9;

/// Great-circle distance in meters between two `(lat, lon)` points.
pub fn haversine_m(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Word-order-insensitive name similarity in [0, 1].
pub fn name_similarity(a: &str, b: &str) -> f64 {
    normalized_levenshtein(&token_sort(a), &token_sort(b))
}

/// Similarity of whole texts after folding and whitespace collapsing.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let norm = |s: &str| fold(s).split_whitespace().collect::<Vec<_>>().join(" ");
    normalized_levenshtein(&norm(a), &norm(b))
}

#[derive(Debug, Clone)]
pub struct Deduplicator {
    distance_m: f64,
    name_threshold: f64,
    text_threshold: f64,
}

impl Deduplicator {
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            distance_m: config.dedup_distance_meters,
            name_threshold: config.dedup_name_similarity,
            text_threshold: config.dedup_text_similarity,
        }
    }

    /// Whether `candidate` duplicates any of `existing_near`.
    pub fn is_duplicate(&self, candidate: &ValidatedSpot, existing_near: &[ValidatedSpot]) -> bool {
        self.find_duplicate(candidate, existing_near).is_some()
    }

    /// First existing spot that `candidate` duplicates.
    pub fn find_duplicate<'a>(
        &self,
        candidate: &ValidatedSpot,
        existing_near: &'a [ValidatedSpot],
    ) -> Option<&'a ValidatedSpot> {
        existing_near.iter().find(|e| self.matches(candidate, e))
    }

    fn matches(&self, candidate: &ValidatedSpot, existing: &ValidatedSpot) -> bool {
        match (candidate.coordinates(), existing.coordinates()) {
            (Some(a), Some(b)) => {
                haversine_m(a, b) <= self.distance_m + EPSILON
                    && name_similarity(&candidate.name, &existing.name)
                        >= self.name_threshold - EPSILON
            }
            (None, None) => {
                candidate.source_key == existing.source_key
                    && text_similarity(&candidate.raw_text, &existing.raw_text)
                        >= self.text_threshold - EPSILON
            }
            _ => false,
        }
    }
}
