//! Coordinate extraction from free text.
//!
//! Strategies run in a fixed order and the first one that yields anything
//! wins: decimal degrees, degree-minute-second, labeled pairs, then
//! geocoding of recognised place names.

pub mod geocode;
pub mod patterns;
pub mod text;

use crate::config::ExtractionConfig;
use geocode::{place_candidates, Gazetteer, Geocoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Which strategy produced a coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Decimal,
    Dms,
    Labeled,
    Geocoded,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Decimal => "decimal",
            Strategy::Dms => "dms",
            Strategy::Labeled => "labeled",
            Strategy::Geocoded => "geocoded",
        }
    }
}

/// A validated-range coordinate pair with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinatePair {
    pub lat: f64,
    pub lon: f64,
    pub strategy: Strategy,
    pub confidence: f64,
}

/// Per-strategy confidence table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StrategyConfidence {
    pub decimal: f64,
    pub dms: f64,
    pub labeled: f64,
    pub geocoded: f64,
}

impl Default for StrategyConfidence {
    fn default() -> Self {
        Self {
            decimal: 0.9,
            dms: 0.85,
            labeled: 0.85,
            geocoded: 0.5,
        }
    }
}

impl StrategyConfidence {
    pub fn get(&self, strategy: Strategy) -> f64 {
        match strategy {
            Strategy::Decimal => self.decimal,
            Strategy::Dms => self.dms,
            Strategy::Labeled => self.labeled,
            Strategy::Geocoded => self.geocoded,
        }
    }

    pub fn check(&self) -> Result<(), String> {
        for s in [
            Strategy::Decimal,
            Strategy::Dms,
            Strategy::Labeled,
            Strategy::Geocoded,
        ] {
            let v = self.get(s);
            if !(0.0..=1.0).contains(&v) {
                return Err(format!("strategy confidence for {} must be in [0, 1], got {v}", s.as_str()));
            }
        }
        Ok(())
    }
}

fn in_range(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0
}

pub struct Extractor {
    confidence: StrategyConfidence,
    geocoder: Arc<dyn Geocoder>,
}

impl Extractor {
    /// Extractor using the configured confidences and gazetteer.
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            confidence: config.strategy_confidence.clone(),
            geocoder: Arc::new(Gazetteer::new(&config.gazetteer)),
        }
    }

    pub fn with_geocoder(confidence: StrategyConfidence, geocoder: Arc<dyn Geocoder>) -> Self {
        Self {
            confidence,
            geocoder,
        }
    }

    /// All coordinate pairs found by the first strategy that finds any.
    pub fn extract(&self, text: &str) -> Vec<CoordinatePair> {
        let textual: [(Strategy, fn(&str) -> Vec<(f64, f64)>); 3] = [
            (Strategy::Decimal, patterns::decimal),
            (Strategy::Dms, patterns::dms),
            (Strategy::Labeled, patterns::labeled),
        ];
        for (strategy, find) in textual {
            let pairs = self.to_pairs(strategy, find(text));
            if !pairs.is_empty() {
                debug!(strategy = strategy.as_str(), count = pairs.len(), "coordinates extracted");
                return pairs;
            }
        }

        let mut places = place_candidates(text);
        for name in self.geocoder.scan(text) {
            if !places.contains(&name) {
                places.push(name);
            }
        }
        let resolved: Vec<(f64, f64)> = places
            .iter()
            .filter_map(|p| self.geocoder.lookup(p))
            .collect();
        let pairs = self.to_pairs(Strategy::Geocoded, resolved);
        if !pairs.is_empty() {
            debug!(count = pairs.len(), "coordinates geocoded");
        }
        pairs
    }

    fn to_pairs(&self, strategy: Strategy, raw: Vec<(f64, f64)>) -> Vec<CoordinatePair> {
        let confidence = self.confidence.get(strategy);
        let mut out: Vec<CoordinatePair> = Vec::new();
        for (lat, lon) in raw {
            if !in_range(lat, lon) {
                continue;
            }
            let dup = out
                .iter()
                .any(|p| (p.lat - lat).abs() < 1e-6 && (p.lon - lon).abs() < 1e-6);
            if !dup {
                out.push(CoordinatePair {
                    lat,
                    lon,
                    strategy,
                    confidence,
                });
            }
        }
        out
    }
}

/// Short display name from the first clause with real words in it.
pub fn derive_name(raw: &str) -> String {
    let cleaned = text::strip_controls(raw);
    let clause = cleaned
        .split(['.', ',', ';', ':', '!', '?', '\n', '(', '|'])
        .map(|c| c.trim().trim_start_matches('#').trim())
        .find(|c| c.chars().filter(|ch| ch.is_alphabetic()).count() >= 3)
        .unwrap_or("");
    let collapsed = clause.split_whitespace().collect::<Vec<_>>().join(" ");
    text::truncate_chars(&collapsed, 200).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geocode::GazetteerEntry;

    fn extractor() -> Extractor {
        Extractor::new(&ExtractionConfig {
            strategy_confidence: StrategyConfidence::default(),
            gazetteer: vec![GazetteerEntry {
                name: "Revel".into(),
                lat: 43.458,
                lon: 2.004,
            }],
        })
    }

    #[test]
    fn test_decimal_wins_over_labeled() {
        let pairs = extractor().extract("43.6047, 1.4442 et aussi lat: 44.0 long: 2.0");
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].strategy, Strategy::Decimal);
        assert_eq!(pairs[0].confidence, 0.9);
    }

    #[test]
    fn test_labeled_pair() {
        let pairs = extractor().extract("Cascade secrète, lat:44.123 long:3.456, baignade");
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].strategy, Strategy::Labeled);
        assert!((pairs[0].lat - 44.123).abs() < 1e-9);
        assert!((pairs[0].lon - 3.456).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_dropped() {
        assert!(extractor().extract("lat: 95.5 long: 10.0").is_empty());
        assert!(extractor().extract("12.345, 190.123").is_empty());
    }

    #[test]
    fn test_geocoding_fallback() {
        let pairs = extractor().extract("Petit lac caché près de Revel");
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].strategy, Strategy::Geocoded);
        assert_eq!(pairs[0].confidence, 0.5);
    }

    #[test]
    fn test_nothing_found() {
        assert!(extractor().extract("Belle journée au bord de l'eau").is_empty());
    }

    #[test]
    fn test_multiple_pairs_deduplicated() {
        let pairs = extractor().extract("43.6047, 1.4442 ou 43.7000, 1.5000 ou 43.6047, 1.4442");
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn test_strategy_confidence_check() {
        let mut sc = StrategyConfidence::default();
        assert!(sc.check().is_ok());
        sc.dms = 1.5;
        assert!(sc.check().is_err());
    }

    #[test]
    fn test_derive_name() {
        assert_eq!(
            derive_name("Cascade secrète, lat:44.123 long:3.456, baignade"),
            "Cascade secrète"
        );
        assert_eq!(derive_name("43.6, 1.4 : Gorges   de la Save"), "Gorges de la Save");
        assert_eq!(derive_name("12, 34"), "");
        assert_eq!(derive_name(&"a".repeat(300)).chars().count(), 200);
    }
}
