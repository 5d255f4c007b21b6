//! Versioned confidence weights for validated spots.

use serde::{Deserialize, Serialize};

/// Weighted-sum table. Bump `version` whenever the weights change so stored
/// scores can be traced back to the table that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfidenceWeights {
    pub version: u32,
    /// Awarded when the spot has coordinates.
    pub coordinates: f64,
    /// Multiplied by the extraction strategy confidence.
    pub strategy: f64,
    /// Multiplied by text length relative to `rich_text_chars`.
    pub richness: f64,
    /// Awarded when a location type or activity was recognised.
    pub category: f64,
    /// Text length at which richness saturates.
    pub rich_text_chars: usize,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            version: 1,
            coordinates: 0.4,
            strategy: 0.3,
            richness: 0.15,
            category: 0.15,
            rich_text_chars: 100,
        }
    }
}

/// Facts about a spot that feed the score.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreInputs {
    pub has_coordinates: bool,
    pub strategy_confidence: f64,
    pub text_chars: usize,
    pub has_category: bool,
}

impl ConfidenceWeights {
    pub fn check(&self) -> Result<(), String> {
        let parts = [self.coordinates, self.strategy, self.richness, self.category];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err("confidence weights must be finite and non-negative".into());
        }
        let total: f64 = parts.iter().sum();
        if total <= 0.0 || total > 1.0 + 1e-9 {
            return Err(format!("confidence weights must sum to (0, 1], got {total}"));
        }
        if self.rich_text_chars == 0 {
            return Err("richTextChars must be positive".into());
        }
        Ok(())
    }

    /// Score in [0, 1].
    pub fn score(&self, inputs: &ScoreInputs) -> f64 {
        let mut score = 0.0;
        if inputs.has_coordinates {
            score += self.coordinates;
            score += self.strategy * inputs.strategy_confidence.clamp(0.0, 1.0);
        }
        let richness = (inputs.text_chars as f64 / self.rich_text_chars.max(1) as f64).min(1.0);
        score += self.richness * richness;
        if inputs.has_category {
            score += self.category;
        }
        score.clamp(0.0, 1.0)
    }
}
