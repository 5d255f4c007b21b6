//! Place-name geocoding, the last-resort extraction strategy.

use super::text::fold;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Resolves place names to coordinates.
pub trait Geocoder: Send + Sync {
    fn lookup(&self, place: &str) -> Option<(f64, f64)>;

    /// Known place names mentioned anywhere in `text`.
    fn scan(&self, _text: &str) -> Vec<String> {
        Vec::new()
    }
}

/// One configured place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazetteerEntry {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Static lookup table loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct Gazetteer {
    places: HashMap<String, (f64, f64)>,
    names: Vec<String>,
}

impl Gazetteer {
    pub fn new(entries: &[GazetteerEntry]) -> Self {
        let mut places = HashMap::new();
        let mut names = Vec::new();
        for e in entries {
            let key = fold(e.name.trim());
            if places.insert(key, (e.lat, e.lon)).is_none() {
                names.push(e.name.trim().to_string());
            }
        }
        // Longest names first so "Lac de Saint-Ferréol" wins over "Saint-Ferréol".
        names.sort_by_key(|n| std::cmp::Reverse(n.chars().count()));
        Self { places, names }
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let begin = start + pos;
        let end = begin + needle.len();
        let before = haystack[..begin].chars().next_back();
        let after = haystack[end..].chars().next();
        let boundary = |c: Option<char>| c.map_or(true, |c| !c.is_alphanumeric());
        if boundary(before) && boundary(after) {
            return true;
        }
        start = end;
    }
    false
}

impl Geocoder for Gazetteer {
    fn lookup(&self, place: &str) -> Option<(f64, f64)> {
        self.places.get(&fold(place.trim())).copied()
    }

    fn scan(&self, text: &str) -> Vec<String> {
        let folded = fold(text);
        self.names
            .iter()
            .filter(|n| contains_word(&folded, &fold(n)))
            .cloned()
            .collect()
    }
}

static PREPOSITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:à|au|aux|près de|proche de|near)\s+(\p{Lu}[\w'-]*(?:[ -]\p{Lu}[\w'-]*)*)")
        .unwrap()
});

static FEATURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i:cascade|grotte|lac|château|gorges?|pont|moulin)\s+(?:de la |de l'|du |des |de |d')(\p{Lu}[\w'-]*(?:[ -]\p{Lu}[\w'-]*)*)",
    )
    .unwrap()
});

/// Capitalised place names introduced by prepositions or landmark words.
pub fn place_candidates(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for re in [&*FEATURE_RE, &*PREPOSITION_RE] {
        for caps in re.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                let name = m.as_str().trim().to_string();
                if !out.contains(&name) {
                    out.push(name);
                }
            }
        }
    }
    out
}
