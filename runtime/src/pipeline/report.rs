//! Per-run counters and classified error tallies.

use crate::acquisition::outcome::{FetchCause, FetchOutcome, LimitOrigin};
use crate::error::ErrorClass;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Error class of a non-successful fetch outcome.
pub fn classify(outcome: &FetchOutcome) -> Option<ErrorClass> {
    match outcome {
        FetchOutcome::Success { .. } => None,
        FetchOutcome::RateLimited {
            origin: LimitOrigin::Local,
            ..
        } => Some(ErrorClass::RateLimitedLocal),
        FetchOutcome::RateLimited {
            origin: LimitOrigin::Remote,
            ..
        } => Some(ErrorClass::RateLimitedRemote),
        FetchOutcome::TransientError {
            cause: FetchCause::Challenge(_),
        } => Some(ErrorClass::ChallengeDetected),
        FetchOutcome::TransientError { .. } => Some(ErrorClass::NetworkTransient),
        FetchOutcome::FatalError {
            cause: FetchCause::AuthRejected(_),
        } => Some(ErrorClass::AuthExpired),
        FetchOutcome::FatalError { .. } => Some(ErrorClass::NetworkFatal),
    }
}

/// Structured summary of one ingest run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub source_key: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub requests: u64,
    pub fetched: u64,
    pub posts: u64,
    pub candidates: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub duplicates: u64,
    pub stored: u64,
    pub errors: BTreeMap<ErrorClass, u64>,
    /// Rejections by reason kind, e.g. `out_of_bounds`.
    pub rejections: BTreeMap<String, u64>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn new(source_key: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            source_key: source_key.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            requests: 0,
            fetched: 0,
            posts: 0,
            candidates: 0,
            accepted: 0,
            rejected: 0,
            duplicates: 0,
            stored: 0,
            errors: BTreeMap::new(),
            rejections: BTreeMap::new(),
            cancelled: false,
        }
    }

    pub fn record(&mut self, class: ErrorClass) {
        *self.errors.entry(class).or_insert(0) += 1;
    }

    pub fn record_rejection(&mut self, kind: &str) {
        self.rejected += 1;
        self.record(ErrorClass::ValidationRejected);
        *self.rejections.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn count(&self, class: ErrorClass) -> u64 {
        self.errors.get(&class).copied().unwrap_or(0)
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn elapsed_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}
