//! Ingest runs: fetch → parse → extract → validate → dedup → store.
//!
//! Behaviour differences between sources come from their `Capabilities`,
//! never from mode strings.

use super::parser::{PageParser, SourcePost};
use super::report::{classify, RunSummary};
use super::storage::SpotStore;
use crate::acquisition::cancel::CancelToken;
use crate::acquisition::fetcher::BoundedFetcher;
use crate::acquisition::outcome::{FetchOutcome, FetchRequest, SessionHandle};
use crate::config::HarvestConfig;
use crate::dedup::Deduplicator;
use crate::error::{ErrorClass, PipelineError};
use crate::extraction::Extractor;
use crate::stealth::behavior::{sleep_human, InteractionKind};
use crate::trust::validator::{SpotCandidate, Validator};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a source supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Requests carry the source's session.
    pub authenticated: bool,
    /// Keep one identity for the whole run and pause like a reader between batches.
    pub long_running: bool,
}

/// A source as the pipeline sees it.
#[derive(Debug, Clone)]
pub struct SourceProfile {
    pub key: String,
    pub capabilities: Capabilities,
    pub batch_size: usize,
}

impl SourceProfile {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            capabilities: Capabilities::default(),
            batch_size: 10,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

pub struct Pipeline {
    fetcher: Arc<BoundedFetcher>,
    extractor: Extractor,
    validator: Validator,
    dedup: Deduplicator,
    dedup_radius_m: f64,
    store: Arc<dyn SpotStore>,
    parser: Arc<dyn PageParser>,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(
        config: &HarvestConfig,
        fetcher: Arc<BoundedFetcher>,
        store: Arc<dyn SpotStore>,
        parser: Arc<dyn PageParser>,
    ) -> Self {
        Self {
            fetcher,
            extractor: Extractor::new(&config.extraction),
            validator: Validator::new(config),
            dedup: Deduplicator::new(&config.dedup),
            dedup_radius_m: config.dedup.dedup_distance_meters,
            store,
            parser,
            cancel: CancelToken::never(),
        }
    }

    /// Stop between batches once `token` fires. Pass the same token to the fetcher
    /// to abandon in-flight requests too.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn fetcher(&self) -> &Arc<BoundedFetcher> {
        &self.fetcher
    }

    /// Fetch and ingest `urls` for one source, batch by batch.
    pub async fn run(&self, profile: &SourceProfile, urls: &[String]) -> Result<RunSummary, PipelineError> {
        let key = profile.key.as_str();
        let caps = profile.capabilities;
        let mut summary = RunSummary::new(key);
        info!(source = key, urls = urls.len(), run_id = %summary.run_id, "ingest run started");

        for (i, batch) in urls.chunks(profile.batch_size.max(1)).enumerate() {
            if caps.long_running {
                if i > 0 {
                    tokio::select! {
                        _ = sleep_human(InteractionKind::Reading) => {}
                        _ = self.cancel.cancelled() => {}
                    }
                }
            } else {
                self.fetcher.rotate_identity(key);
            }
            if self.cancel.is_cancelled() {
                return Err(self.cancelled(summary));
            }

            let requests: Vec<FetchRequest> = batch
                .iter()
                .map(|url| {
                    let req = FetchRequest::new(url.as_str(), key);
                    if caps.authenticated {
                        req.with_session(SessionHandle::new(key))
                    } else {
                        req
                    }
                })
                .collect();
            let outcomes = self.fetcher.fetch_many(&requests).await;

            // A batch cut short by cancellation writes nothing.
            if self.cancel.is_cancelled() {
                return Err(self.cancelled(summary));
            }

            for (req, outcome) in requests.iter().zip(outcomes) {
                summary.requests += 1;
                match outcome {
                    FetchOutcome::Success { body, .. } => {
                        summary.fetched += 1;
                        for post in self.parser.parse(key, req.url(), &body) {
                            self.process_post(&post, &mut summary);
                        }
                    }
                    other => {
                        if let Some(class) = classify(&other) {
                            debug!(source = key, url = req.url(), ?class, "fetch not successful");
                            summary.record(class);
                        }
                    }
                }
            }
        }

        summary.finish();
        info!(
            source = key,
            run_id = %summary.run_id,
            fetched = summary.fetched,
            stored = summary.stored,
            duplicates = summary.duplicates,
            rejected = summary.rejected,
            "ingest run finished"
        );
        Ok(summary)
    }

    /// Ingest posts that were parsed elsewhere. No network I/O.
    pub fn ingest_posts(&self, source_key: &str, posts: &[SourcePost]) -> RunSummary {
        let mut summary = RunSummary::new(source_key);
        for post in posts {
            self.process_post(post, &mut summary);
        }
        summary.finish();
        info!(
            source = source_key,
            posts = summary.posts,
            stored = summary.stored,
            duplicates = summary.duplicates,
            rejected = summary.rejected,
            "posts ingested"
        );
        summary
    }

    fn cancelled(&self, mut summary: RunSummary) -> PipelineError {
        summary.cancelled = true;
        summary.finish();
        warn!(source = %summary.source_key, run_id = %summary.run_id, stored = summary.stored, "ingest run cancelled");
        PipelineError::Cancelled(Box::new(summary))
    }

    fn process_post(&self, post: &SourcePost, summary: &mut RunSummary) {
        summary.posts += 1;
        let pairs = self.extractor.extract(&post.text);
        let base = SpotCandidate {
            source_key: post.source_key.clone(),
            source_url: post.source_url.clone(),
            raw_text: post.text.clone(),
            name: post.name.clone(),
            coordinates: Vec::new(),
            metadata: post.metadata.clone(),
        };

        let candidates: Vec<SpotCandidate> = if pairs.is_empty() {
            summary.record(ErrorClass::ExtractionEmpty);
            vec![base]
        } else {
            pairs
                .into_iter()
                .map(|p| SpotCandidate {
                    coordinates: vec![p],
                    ..base.clone()
                })
                .collect()
        };

        for candidate in &candidates {
            summary.candidates += 1;
            let spot = match self.validator.validate(candidate) {
                Ok(spot) => spot,
                Err(rejection) => {
                    summary.record_rejection(rejection.reason.kind());
                    continue;
                }
            };
            summary.accepted += 1;

            let neighbours = match spot.coordinates() {
                Some((lat, lon)) => self.store.query_nearby(lat, lon, self.dedup_radius_m),
                None => self.store.query_uncoordinated(&spot.source_key),
            };
            let neighbours = match neighbours {
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, "nearby query failed");
                    summary.record(ErrorClass::StoreFailed);
                    continue;
                }
            };
            if self.dedup.is_duplicate(&spot, &neighbours) {
                debug!(name = %spot.name, "duplicate skipped");
                summary.duplicates += 1;
                summary.record(ErrorClass::DuplicateDetected);
                continue;
            }

            match self.store.insert(&spot) {
                Ok(true) => summary.stored += 1,
                Ok(false) => summary.record(ErrorClass::StoreFailed),
                Err(e) => {
                    warn!(error = %e, "spot insert failed");
                    summary.record(ErrorClass::StoreFailed);
                }
            }
        }
    }
}
