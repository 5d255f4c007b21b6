//! Spot validation: schema, bounds, safety, then confidence scoring.
//!
//! A candidate moves Received → SchemaChecked → BoundsChecked →
//! SafetyChecked → Accepted, and leaves at the first failing stage with a
//! `Rejection`.

use super::confidence::{ConfidenceWeights, ScoreInputs};
use super::sandbox::{self, Threat};
use crate::config::{GeoBounds, HarvestConfig};
use crate::extraction::text::{fold, strip_controls};
use crate::extraction::{derive_name, CoordinatePair, Strategy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// What to do with strippable threats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyPolicy {
    /// Remove scripts, handlers, traversal and control characters, then re-check.
    #[default]
    Strip,
    /// Reject on any threat.
    Reject,
}

/// A post paired with what extraction found in it.
#[derive(Debug, Clone, Default)]
pub struct SpotCandidate {
    pub source_key: String,
    pub source_url: String,
    pub raw_text: String,
    /// Name supplied by the parser, if any. Derived from the text otherwise.
    pub name: Option<String>,
    pub coordinates: Vec<CoordinatePair>,
    pub metadata: BTreeMap<String, String>,
}

/// A spot that passed every stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedSpot {
    pub id: Uuid,
    pub name: String,
    pub source_key: String,
    pub source_url: String,
    pub raw_text: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub strategy: Option<Strategy>,
    pub confidence: f64,
    pub weights_version: u32,
    pub location_type: String,
    pub activities: Vec<String>,
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub validated_at: DateTime<Utc>,
}

impl ValidatedSpot {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.lat.zip(self.lon)
    }
}

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    #[error("missing or invalid field: {field}")]
    MissingField { field: &'static str },
    #[error("coordinates outside the configured bounds")]
    OutOfBounds,
    #[error("unsafe content: {threats:?}")]
    UnsafeContent { threats: Vec<Threat> },
}

impl RejectionReason {
    pub fn kind(&self) -> &'static str {
        match self {
            RejectionReason::MissingField { .. } => "missing_field",
            RejectionReason::OutOfBounds => "out_of_bounds",
            RejectionReason::UnsafeContent { .. } => "unsafe_content",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{url}: {reason}")]
pub struct Rejection {
    pub url: String,
    pub reason: RejectionReason,
}

const LOCATION_TYPES: &[(&str, &[&str])] = &[
    ("waterfall", &["cascade", "waterfall", "chute d'eau"]),
    ("cave", &["grotte", "gouffre", "cave"]),
    ("water", &["lac", "lake", "riviere", "river", "etang", "baignade"]),
    ("abandoned", &["abandonne", "abandoned", "ruins", "ruines", "urbex"]),
    ("viewpoint", &["vue", "view", "panorama", "belvedere"]),
    ("forest", &["foret", "forest", "bois"]),
    ("urban", &["ville", "city", "urbain", "street", "rue"]),
    ("trail", &["sentier", "trail", "chemin", "path", "randonnee"]),
];

const ACTIVITIES: &[(&str, &[&str])] = &[
    ("swimming", &["baignade", "se baigner", "nager", "swim"]),
    ("hiking", &["randonnee", "rando", "hike", "hiking"]),
    ("climbing", &["escalade", "climbing"]),
    ("photography", &["photo"]),
    ("urbex", &["urbex"]),
    ("camping", &["camping", "bivouac"]),
    ("picnic", &["pique-nique", "picnic"]),
    ("fishing", &["peche", "fishing"]),
    ("kayaking", &["kayak", "canoe"]),
    ("cycling", &["velo", "vtt", "cycling", "bike"]),
    ("stargazing", &["etoiles", "stargazing"]),
];

const TAGS: &[(&str, &[&str])] = &[
    ("secret", &["secret", "cache", "hidden", "meconnu", "peu connu", "insolite"]),
    ("challenging", &["difficile", "difficult", "climbing", "escalade"]),
    ("golden-hour", &["sunset", "coucher de soleil", "sunrise", "lever de soleil"]),
];

fn words(folded: &str) -> Vec<&str> {
    folded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

// Inflections accepted on the last word of a keyword: "lacs", "secrete".
const SUFFIXES: &[&str] = &["", "s", "x", "e", "es"];

/// Keyword matches on whole words only, so "place" does not hit "lac".
fn matches_keyword(text: &[&str], keyword: &str) -> bool {
    let kw = words(keyword);
    let Some((last, head)) = kw.split_last() else {
        return false;
    };
    text.windows(kw.len()).any(|window| {
        window[..head.len()] == *head
            && window[head.len()]
                .strip_prefix(last)
                .is_some_and(|rest| SUFFIXES.contains(&rest))
    })
}

fn matches_any(folded: &str, keywords: &[&str]) -> bool {
    let text = words(folded);
    keywords.iter().any(|k| matches_keyword(&text, k))
}

/// Location type from keywords, `None` when nothing matched.
pub fn infer_location_type(text: &str) -> Option<&'static str> {
    let folded = fold(text);
    LOCATION_TYPES
        .iter()
        .find(|(_, kws)| matches_any(&folded, kws))
        .map(|(t, _)| *t)
}

pub fn detect_activities(text: &str) -> Vec<String> {
    let folded = fold(text);
    ACTIVITIES
        .iter()
        .filter(|(_, kws)| matches_any(&folded, kws))
        .map(|(a, _)| a.to_string())
        .collect()
}

pub fn extract_tags(text: &str) -> Vec<String> {
    let folded = fold(text);
    TAGS.iter()
        .filter(|(_, kws)| matches_any(&folded, kws))
        .map(|(t, _)| t.to_string())
        .collect()
}

fn is_http_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

pub struct Validator {
    bounds: GeoBounds,
    min_text_length: usize,
    policy: SafetyPolicy,
    weights: ConfidenceWeights,
}

impl Validator {
    pub fn new(config: &HarvestConfig) -> Self {
        Self {
            bounds: config.bounds,
            min_text_length: config.validation.min_text_length,
            policy: config.validation.safety_policy,
            weights: config.validation.weights.clone(),
        }
    }

    pub fn bounds(&self) -> &GeoBounds {
        &self.bounds
    }

    pub fn validate(&self, candidate: &SpotCandidate) -> Result<ValidatedSpot, Rejection> {
        let reject = |reason: RejectionReason| {
            debug!(url = %candidate.source_url, %reason, "candidate rejected");
            Rejection {
                url: candidate.source_url.clone(),
                reason,
            }
        };

        // Schema
        if candidate.source_key.trim().is_empty() {
            return Err(reject(RejectionReason::MissingField { field: "source_key" }));
        }
        if !is_http_url(&candidate.source_url) {
            return Err(reject(RejectionReason::MissingField { field: "source_url" }));
        }
        let cleaned = strip_controls(&candidate.raw_text);
        if cleaned.chars().count() < self.min_text_length {
            return Err(reject(RejectionReason::MissingField { field: "raw_text" }));
        }
        let name = match &candidate.name {
            Some(n) if !n.trim().is_empty() => strip_controls(n),
            _ => derive_name(&cleaned),
        };
        let name_len = name.chars().count();
        if !(3..=200).contains(&name_len) {
            return Err(reject(RejectionReason::MissingField { field: "name" }));
        }

        // Bounds
        let pair = if candidate.coordinates.is_empty() {
            None
        } else {
            let best = candidate
                .coordinates
                .iter()
                .filter(|p| self.bounds.contains(p.lat, p.lon))
                .fold(None::<&CoordinatePair>, |best, p| match best {
                    Some(b) if b.confidence >= p.confidence => Some(b),
                    _ => Some(p),
                });
            match best {
                Some(p) => Some(*p),
                None => return Err(reject(RejectionReason::OutOfBounds)),
            }
        };

        // Safety
        let text = self
            .make_safe(&candidate.raw_text)
            .map_err(|threats| reject(RejectionReason::UnsafeContent { threats }))?;
        let name = self
            .make_safe(&name)
            .map_err(|threats| reject(RejectionReason::UnsafeContent { threats }))?;
        let text = strip_controls(&text);
        let name = strip_controls(&name);
        if name.chars().count() < 3 {
            return Err(reject(RejectionReason::MissingField { field: "name" }));
        }

        // Score
        let location_type = infer_location_type(&text);
        let activities = detect_activities(&text);
        let has_category = location_type.is_some() || !activities.is_empty();
        let confidence = self.weights.score(&ScoreInputs {
            has_coordinates: pair.is_some(),
            strategy_confidence: pair.map_or(0.0, |p| p.confidence),
            text_chars: text.chars().count(),
            has_category,
        });

        Ok(ValidatedSpot {
            id: Uuid::new_v4(),
            name,
            source_key: candidate.source_key.clone(),
            source_url: candidate.source_url.clone(),
            tags: extract_tags(&text),
            raw_text: text,
            lat: pair.map(|p| p.lat),
            lon: pair.map(|p| p.lon),
            strategy: pair.map(|p| p.strategy),
            confidence,
            weights_version: self.weights.version,
            location_type: location_type.unwrap_or("natural").to_string(),
            activities,
            metadata: candidate
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), strip_controls(v)))
                .collect(),
            validated_at: Utc::now(),
        })
    }

    /// Split a batch into accepted spots and rejections, preserving order.
    pub fn validate_batch(&self, candidates: &[SpotCandidate]) -> (Vec<ValidatedSpot>, Vec<Rejection>) {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for c in candidates {
            match self.validate(c) {
                Ok(spot) => accepted.push(spot),
                Err(r) => rejected.push(r),
            }
        }
        (accepted, rejected)
    }

    fn make_safe(&self, value: &str) -> Result<String, Vec<Threat>> {
        let found = sandbox::check(value);
        if found.safe {
            return Ok(value.to_string());
        }
        let all_strippable = found.threats.iter().all(Threat::is_strippable);
        if self.policy == SafetyPolicy::Reject || !all_strippable {
            return Err(found.threats);
        }
        let stripped = sandbox::sanitize(value);
        let recheck = sandbox::check(&stripped);
        if recheck.safe {
            Ok(stripped)
        } else {
            Err(recheck.threats)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(policy: SafetyPolicy) -> Validator {
        let mut config = HarvestConfig::default();
        config.validation.safety_policy = policy;
        Validator::new(&config)
    }

    fn pair(lat: f64, lon: f64, confidence: f64) -> CoordinatePair {
        CoordinatePair {
            lat,
            lon,
            strategy: Strategy::Decimal,
            confidence,
        }
    }

    fn candidate(text: &str, coords: Vec<CoordinatePair>) -> SpotCandidate {
        SpotCandidate {
            source_key: "forum".into(),
            source_url: "https://forum.example/t/42".into(),
            raw_text: text.into(),
            name: None,
            coordinates: coords,
            ..Default::default()
        }
    }

    #[test]
    fn test_accepts_labeled_example() {
        let c = candidate(
            "Cascade secrète, lat:44.123 long:3.456, baignade",
            vec![CoordinatePair {
                lat: 44.123,
                lon: 3.456,
                strategy: Strategy::Labeled,
                confidence: 0.85,
            }],
        );
        let spot = validator(SafetyPolicy::Strip).validate(&c).unwrap();
        assert_eq!(spot.name, "Cascade secrète");
        assert_eq!(spot.location_type, "waterfall");
        assert!(spot.activities.contains(&"swimming".to_string()));
        assert!(spot.tags.contains(&"secret".to_string()));
        assert!(spot.confidence > 0.6);
        assert_eq!(spot.weights_version, 1);
    }

    #[test]
    fn test_missing_fields() {
        let v = validator(SafetyPolicy::Strip);
        let mut c = candidate("Lac tranquille au calme", vec![]);
        c.source_key = "".into();
        assert_eq!(
            v.validate(&c).unwrap_err().reason,
            RejectionReason::MissingField { field: "source_key" }
        );

        let mut c = candidate("Lac tranquille au calme", vec![]);
        c.source_url = "ftp://example.org/x".into();
        assert_eq!(
            v.validate(&c).unwrap_err().reason,
            RejectionReason::MissingField { field: "source_url" }
        );

        let c = candidate("court", vec![]);
        assert_eq!(
            v.validate(&c).unwrap_err().reason,
            RejectionReason::MissingField { field: "raw_text" }
        );

        let c = candidate("12, 34, 56, 78, 90", vec![]);
        assert_eq!(
            v.validate(&c).unwrap_err().reason,
            RejectionReason::MissingField { field: "name" }
        );
    }

    #[test]
    fn test_bounds_keep_best_in_bounds_pair() {
        let v = validator(SafetyPolicy::Strip);
        let c = candidate(
            "Belvédère sur la vallée, superbe vue",
            vec![pair(48.85, 2.35, 0.95), pair(43.1, 1.2, 0.5), pair(43.2, 1.3, 0.9)],
        );
        let spot = v.validate(&c).unwrap();
        assert_eq!(spot.coordinates(), Some((43.2, 1.3)));
    }

    #[test]
    fn test_all_out_of_bounds_rejected() {
        let v = validator(SafetyPolicy::Strip);
        let c = candidate("Tour Eiffel, belle vue", vec![pair(48.85, 2.35, 0.9)]);
        assert_eq!(v.validate(&c).unwrap_err().reason, RejectionReason::OutOfBounds);
    }

    #[test]
    fn test_bounds_edges_inclusive() {
        let v = validator(SafetyPolicy::Strip);
        let c = candidate("Coin perdu en bordure", vec![pair(42.3, -0.4, 0.9)]);
        assert!(v.validate(&c).is_ok());
    }

    #[test]
    fn test_uncoordinated_spot_accepted_with_low_confidence() {
        let v = validator(SafetyPolicy::Strip);
        let spot = v
            .validate(&candidate("Petit coin tranquille pour pique-niquer", vec![]))
            .unwrap();
        assert!(spot.coordinates().is_none());
        assert!(spot.confidence < 0.5);
    }

    #[test]
    fn test_strip_policy_removes_script() {
        let v = validator(SafetyPolicy::Strip);
        let c = candidate("Lac caché <script>alert(1)</script> baignade", vec![]);
        let spot = v.validate(&c).unwrap();
        assert!(!spot.raw_text.contains("script"));
    }

    #[test]
    fn test_reject_policy_rejects_script() {
        let v = validator(SafetyPolicy::Reject);
        let c = candidate("Lac caché <script>alert(1)</script> baignade", vec![]);
        assert!(matches!(
            v.validate(&c).unwrap_err().reason,
            RejectionReason::UnsafeContent { .. }
        ));
    }

    #[test]
    fn test_sql_injection_always_rejected() {
        let v = validator(SafetyPolicy::Strip);
        let c = candidate("Super spot'; DROP TABLE spots; --", vec![]);
        assert!(matches!(
            v.validate(&c).unwrap_err().reason,
            RejectionReason::UnsafeContent { .. }
        ));
    }

    #[test]
    fn test_keywords_match_whole_words() {
        let text = "Petite place sympathique, en plein développement";
        assert_eq!(infer_location_type(text), None);
        assert!(detect_activities(text).is_empty());

        assert_eq!(infer_location_type("Les lacs du Néouvielle"), Some("water"));
        assert_eq!(infer_location_type("Chute d'eau cachée"), Some("waterfall"));
        assert_eq!(detect_activities("Pique-nique au bord du lac"), vec!["picnic"]);
        assert_eq!(extract_tags("Une crique secrète"), vec!["secret"]);
    }

    #[test]
    fn test_validate_batch_splits() {
        let v = validator(SafetyPolicy::Strip);
        let batch = vec![
            candidate("Lac tranquille au calme", vec![]),
            candidate("court", vec![]),
            candidate("Gorges sauvages, sentier difficile", vec![]),
        ];
        let (ok, bad) = v.validate_batch(&batch);
        assert_eq!(ok.len(), 2);
        assert_eq!(bad.len(), 1);
        assert!(ok[1].tags.contains(&"challenging".to_string()));
    }
}
