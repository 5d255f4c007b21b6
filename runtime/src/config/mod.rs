//! Static configuration table: per-source rate parameters, bounding box,
//! dedup thresholds, fetch limits and scoring weights.

mod loader;

pub use loader::{load_default, load_from, CONFIG_ENV};

use crate::error::ConfigError;
use crate::extraction::geocode::GazetteerEntry;
use crate::extraction::StrategyConfidence;
use crate::trust::confidence::ConfidenceWeights;
use crate::trust::validator::SafetyPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Root of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HarvestConfig {
    /// Rate parameters applied to every source unless overridden.
    pub defaults: RateParams,
    /// Per-source overrides, keyed by source key.
    pub sources: BTreeMap<String, RateOverride>,
    pub bounds: GeoBounds,
    pub dedup: DedupConfig,
    pub fetch: FetchConfig,
    pub session: SessionConfig,
    pub validation: ValidationConfig,
    pub extraction: ExtractionConfig,
}

/// Backoff and circuit-breaker parameters for one source key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateParams {
    /// Delay in seconds between requests while healthy.
    pub base_delay: f64,
    /// Ceiling for the backoff delay, in seconds.
    pub max_delay: f64,
    pub backoff_factor: f64,
    /// Consecutive failures that open the circuit.
    pub circuit_threshold: u32,
    pub cooldown_seconds: f64,
    /// Cap for the doubled cooldown after a failed half-open trial.
    pub max_cooldown_seconds: f64,
}

impl Default for RateParams {
    fn default() -> Self {
        Self {
            base_delay: 1.0,
            max_delay: 30.0,
            backoff_factor: 2.0,
            circuit_threshold: 10,
            cooldown_seconds: 300.0,
            max_cooldown_seconds: 3600.0,
        }
    }
}

impl RateParams {
    pub fn base(&self) -> Duration {
        Duration::from_secs_f64(self.base_delay)
    }

    pub fn max(&self) -> Duration {
        Duration::from_secs_f64(self.max_delay)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.cooldown_seconds)
    }

    pub fn max_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.max_cooldown_seconds.max(self.cooldown_seconds))
    }

    /// Overlay the fields present in `o` on top of these parameters.
    pub fn merged(&self, o: &RateOverride) -> RateParams {
        RateParams {
            base_delay: o.base_delay.unwrap_or(self.base_delay),
            max_delay: o.max_delay.unwrap_or(self.max_delay),
            backoff_factor: o.backoff_factor.unwrap_or(self.backoff_factor),
            circuit_threshold: o.circuit_threshold.unwrap_or(self.circuit_threshold),
            cooldown_seconds: o.cooldown_seconds.unwrap_or(self.cooldown_seconds),
            max_cooldown_seconds: o.max_cooldown_seconds.unwrap_or(self.max_cooldown_seconds),
        }
    }

    fn check(&self, scope: &str) -> Result<(), ConfigError> {
        if !(self.base_delay >= 0.0 && self.base_delay.is_finite()) {
            return Err(ConfigError::invalid(format!("{scope}.baseDelay must be >= 0")));
        }
        if !(self.max_delay >= self.base_delay && self.max_delay.is_finite()) {
            return Err(ConfigError::invalid(format!(
                "{scope}.maxDelay must be >= baseDelay"
            )));
        }
        if !(self.backoff_factor >= 1.0 && self.backoff_factor.is_finite()) {
            return Err(ConfigError::invalid(format!(
                "{scope}.backoffFactor must be >= 1"
            )));
        }
        if self.circuit_threshold == 0 {
            return Err(ConfigError::invalid(format!(
                "{scope}.circuitThreshold must be at least 1"
            )));
        }
        if !(self.cooldown_seconds >= 0.0 && self.cooldown_seconds.is_finite()) {
            return Err(ConfigError::invalid(format!(
                "{scope}.cooldownSeconds must be >= 0"
            )));
        }
        Ok(())
    }
}

/// Partial rate parameters for a single source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateOverride {
    pub base_delay: Option<f64>,
    pub max_delay: Option<f64>,
    pub backoff_factor: Option<f64>,
    pub circuit_threshold: Option<u32>,
    pub cooldown_seconds: Option<f64>,
    pub max_cooldown_seconds: Option<f64>,
}

/// Geographic bounding box every stored coordinate must fall in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoBounds {
    #[serde(rename = "boundsMinLat")]
    pub min_lat: f64,
    #[serde(rename = "boundsMaxLat")]
    pub max_lat: f64,
    #[serde(rename = "boundsMinLon")]
    pub min_lon: f64,
    #[serde(rename = "boundsMaxLon")]
    pub max_lon: f64,
}

impl Default for GeoBounds {
    fn default() -> Self {
        // Occitanie, around Toulouse.
        Self {
            min_lat: 42.3,
            max_lat: 45.1,
            min_lon: -0.4,
            max_lon: 4.9,
        }
    }
}

impl GeoBounds {
    /// Inclusive containment check.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat.is_finite()
            && lon.is_finite()
            && self.min_lat <= lat
            && lat <= self.max_lat
            && self.min_lon <= lon
            && lon <= self.max_lon
    }

    fn check(&self) -> Result<(), ConfigError> {
        let vals = [self.min_lat, self.max_lat, self.min_lon, self.max_lon];
        if vals.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::invalid("bounding box values must be finite"));
        }
        if self.min_lat > self.max_lat || self.min_lon > self.max_lon {
            return Err(ConfigError::invalid(format!(
                "bounding box is inverted: lat {}..{}, lon {}..{}",
                self.min_lat, self.max_lat, self.min_lon, self.max_lon
            )));
        }
        if self.min_lat < -90.0 || self.max_lat > 90.0 {
            return Err(ConfigError::invalid("bounding box latitude outside -90..90"));
        }
        if self.min_lon < -180.0 || self.max_lon > 180.0 {
            return Err(ConfigError::invalid("bounding box longitude outside -180..180"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DedupConfig {
    pub dedup_distance_meters: f64,
    /// Token-level name similarity in 0..=1.
    pub dedup_name_similarity: f64,
    /// Text similarity used for records without coordinates.
    pub dedup_text_similarity: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            dedup_distance_meters: 100.0,
            dedup_name_similarity: 0.9,
            dedup_text_similarity: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FetchConfig {
    /// Global ceiling on simultaneous in-flight requests.
    pub max_concurrent: usize,
    /// Share of the global ceiling one host may hold.
    pub per_host_fraction: f64,
    pub max_retries: u32,
    pub request_timeout_seconds: f64,
    /// How long idle pooled connections are kept.
    pub pool_idle_seconds: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            per_host_fraction: 0.3,
            max_retries: 3,
            request_timeout_seconds: 30.0,
            pool_idle_seconds: 90,
        }
    }
}

impl FetchConfig {
    /// Per-host admission limit, never below one.
    pub fn per_host_limit(&self) -> usize {
        ((self.max_concurrent as f64 * self.per_host_fraction).floor() as usize).max(1)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    pub session_ttl_hours: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 24.0,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds((self.session_ttl_hours * 3600.0) as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidationConfig {
    /// Minimum cleaned raw-text length, in characters.
    pub min_text_length: usize,
    pub safety_policy: SafetyPolicy,
    pub weights: ConfidenceWeights,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_text_length: 10,
            safety_policy: SafetyPolicy::Strip,
            weights: ConfidenceWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtractionConfig {
    pub strategy_confidence: StrategyConfidence,
    /// Known place names for the geocoding fallback.
    pub gazetteer: Vec<GazetteerEntry>,
}

impl HarvestConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: HarvestConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Effective rate parameters for a source key.
    pub fn rate_params(&self, source_key: &str) -> RateParams {
        match self.sources.get(source_key) {
            Some(o) => self.defaults.merged(o),
            None => self.defaults.clone(),
        }
    }

    /// Reject configurations that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.defaults.check("defaults")?;
        for key in self.sources.keys() {
            self.rate_params(key).check(&format!("sources.{key}"))?;
        }
        self.bounds.check()?;

        let unit = |v: f64| (0.0..=1.0).contains(&v);
        if !unit(self.dedup.dedup_name_similarity) || !unit(self.dedup.dedup_text_similarity) {
            return Err(ConfigError::invalid("dedup similarities must be within 0..=1"));
        }
        if !(self.dedup.dedup_distance_meters >= 0.0) {
            return Err(ConfigError::invalid("dedupDistanceMeters must be >= 0"));
        }
        if self.fetch.max_concurrent == 0 {
            return Err(ConfigError::invalid("fetch.maxConcurrent must be at least 1"));
        }
        if !(self.fetch.per_host_fraction > 0.0 && self.fetch.per_host_fraction <= 1.0) {
            return Err(ConfigError::invalid("fetch.perHostFraction must be within (0, 1]"));
        }
        if !(self.fetch.request_timeout_seconds > 0.0) {
            return Err(ConfigError::invalid("fetch.requestTimeoutSeconds must be > 0"));
        }
        if !(self.session.session_ttl_hours > 0.0) {
            return Err(ConfigError::invalid("session.sessionTtlHours must be > 0"));
        }
        self.validation
            .weights
            .check()
            .map_err(ConfigError::invalid)?;
        self.extraction
            .strategy_confidence
            .check()
            .map_err(ConfigError::invalid)?;
        Ok(())
    }
}
