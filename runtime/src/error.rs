//! Error types shared across the pipeline.

use crate::pipeline::RunSummary;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration problems. Always fatal to a run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ConfigError::Invalid(msg.into())
    }
}

/// Failures of the key-value and spot storage collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("session key mismatch: record for {record} saved under {key}")]
    KeyMismatch { key: String, record: String },
}

/// Errors that end an ingest run early.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Carries what earlier batches achieved before the cancel.
    #[error("run cancelled after {} stored spots", .0.stored)]
    Cancelled(Box<RunSummary>),
}

/// Classification used for per-run error tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Timeout, 5xx, reset. Retried before being counted.
    NetworkTransient,
    /// 4xx other than 429, DNS failure.
    NetworkFatal,
    /// Circuit open or backoff active; a skip, not an error.
    RateLimitedLocal,
    /// Remote 429 after retries ran out.
    RateLimitedRemote,
    /// A 2xx page turned out to be an anti-bot interstitial.
    ChallengeDetected,
    /// Session rejected by the remote; caller must re-authenticate.
    AuthExpired,
    /// No coordinates found; a valid zero-result outcome.
    ExtractionEmpty,
    ValidationRejected,
    /// A skip, not an error.
    DuplicateDetected,
    /// Storage collaborator refused or failed an insert.
    StoreFailed,
}
