//! Bounded fetcher: governor-gated, semaphore-bounded page fetching.
//!
//! Each attempt runs admit → backoff wait → host permit → global permit →
//! request → report. Waits happen before permits are taken so a backed-off
//! source never holds a slot another source could use.

use super::cancel::CancelToken;
use super::challenge;
use super::http_client::{HttpTransport, RawResponse, ReqwestTransport, TransportRequest};
use super::outcome::{FetchCause, FetchOutcome, FetchRequest, LimitOrigin};
use super::session_store::SessionStore;
use crate::config::HarvestConfig;
use crate::pool::admission::AdmissionPool;
use crate::pool::rate_governor::RateGovernor;
use crate::stealth::fingerprint::{self, Fingerprint};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct BoundedFetcher {
    governor: Arc<RateGovernor>,
    admission: Arc<AdmissionPool>,
    sessions: Arc<SessionStore>,
    transport: Arc<dyn HttpTransport>,
    identities: DashMap<String, Fingerprint>,
    max_retries: u32,
    cancel: CancelToken,
}

impl BoundedFetcher {
    pub fn new(
        config: &HarvestConfig,
        governor: Arc<RateGovernor>,
        sessions: Arc<SessionStore>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let admission = AdmissionPool::new(config.fetch.max_concurrent, config.fetch.per_host_limit());
        Self {
            governor,
            admission: Arc::new(admission),
            sessions,
            transport,
            identities: DashMap::new(),
            max_retries: config.fetch.max_retries,
            cancel: CancelToken::never(),
        }
    }

    /// Fetcher over the shared reqwest client.
    pub fn with_reqwest(
        config: &HarvestConfig,
        governor: Arc<RateGovernor>,
        sessions: Arc<SessionStore>,
    ) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::new(
            config.fetch.request_timeout(),
            Duration::from_secs(config.fetch.pool_idle_seconds),
        )?;
        Ok(Self::new(config, governor, sessions, Arc::new(transport)))
    }

    /// Observe `token` for run cancellation.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn governor(&self) -> &Arc<RateGovernor> {
        &self.governor
    }

    pub fn admission(&self) -> &Arc<AdmissionPool> {
        &self.admission
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Current identity for a source, generated on first use.
    pub fn identity(&self, source_key: &str) -> Fingerprint {
        if let Some(fp) = self.identities.get(source_key) {
            return fp.value().clone();
        }
        self.identities
            .entry(source_key.to_string())
            .or_insert_with(fingerprint::generate)
            .value()
            .clone()
    }

    /// Replace the identity used for a source.
    pub fn rotate_identity(&self, source_key: &str) -> Fingerprint {
        let fp = fingerprint::generate();
        debug!(source = source_key, platform = fp.platform(), "identity rotated");
        self.identities.insert(source_key.to_string(), fp.clone());
        fp
    }

    /// Fetch every request concurrently. Outcomes keep the input order.
    pub async fn fetch_many(&self, requests: &[FetchRequest]) -> Vec<FetchOutcome> {
        join_all(requests.iter().map(|r| self.fetch_one(r))).await
    }

    /// Fetch one page, retrying transient failures and remote 429s.
    pub async fn fetch_one(&self, request: &FetchRequest) -> FetchOutcome {
        let key = request.source_key();

        if let Some(handle) = request.session() {
            if handle.source_key() != key {
                warn!(source = key, handle = handle.source_key(), "session handle mismatch");
                return FetchOutcome::FatalError {
                    cause: FetchCause::SessionMismatch {
                        handle: handle.source_key().to_string(),
                        request: key.to_string(),
                    },
                };
            }
        }

        let mut last: Option<FetchOutcome> = None;
        for attempt in 0..=self.max_retries {
            if self.cancel.is_cancelled() {
                return cancelled();
            }

            let decision = self.governor.admit(key);
            if !decision.proceed {
                debug!(source = key, wait = ?decision.wait_for, "denied by governor");
                // A retry cut short by an opening circuit keeps the real failure.
                return last.unwrap_or_else(|| FetchOutcome::local_limit(decision.wait_for));
            }
            // Admitted from here on: an abandoned attempt is still reported so a
            // half-open trial slot is released.
            if !decision.wait_for.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(decision.wait_for) => {}
                    _ = self.cancel.cancelled() => return self.abandon(key),
                }
            }

            let outcome = tokio::select! {
                o = self.attempt(request) => o,
                _ = self.cancel.cancelled() => return self.abandon(key),
            };
            self.governor.report(key, &outcome);

            let retryable = match &outcome {
                FetchOutcome::TransientError { .. } => true,
                FetchOutcome::RateLimited { origin, .. } => *origin == LimitOrigin::Remote,
                _ => false,
            };
            if !retryable {
                return outcome;
            }
            if attempt < self.max_retries {
                debug!(source = key, url = request.url(), attempt = attempt + 1, "retrying");
            }
            last = Some(outcome);
        }

        let outcome = last.unwrap_or_else(|| FetchOutcome::TransientError {
            cause: FetchCause::Connection("no attempt made".into()),
        });
        warn!(source = key, url = request.url(), retries = self.max_retries, "retries exhausted");
        outcome
    }

    fn abandon(&self, key: &str) -> FetchOutcome {
        let outcome = cancelled();
        self.governor.report(key, &outcome);
        debug!(source = key, "admitted fetch abandoned");
        outcome
    }

    /// One network attempt under admission permits.
    async fn attempt(&self, request: &FetchRequest) -> FetchOutcome {
        let key = request.source_key();
        let permit = match self.admission.acquire(&request.host()).await {
            Ok(p) => p,
            Err(e) => {
                return FetchOutcome::TransientError {
                    cause: FetchCause::Connection(e.to_string()),
                }
            }
        };

        let transport_req = self.build_request(request);
        let started = Instant::now();
        let result = self.transport.get(&transport_req).await;
        let elapsed = started.elapsed();
        drop(permit);

        match result {
            Ok(resp) => self.interpret(request, resp, elapsed),
            Err(cause) => {
                debug!(source = key, url = request.url(), %cause, "request failed");
                if cause.is_transient() {
                    FetchOutcome::TransientError { cause }
                } else {
                    FetchOutcome::FatalError { cause }
                }
            }
        }
    }

    fn build_request(&self, request: &FetchRequest) -> TransportRequest {
        let fp = self.identity(request.source_key());
        let mut req = TransportRequest {
            url: request.url().to_string(),
            user_agent: fp.user_agent().to_string(),
            accept_language: fp.accept_language(),
            cookie: None,
            headers: Vec::new(),
        };

        if request.session().is_some() {
            match self.sessions.load(request.source_key()) {
                Ok(Some(record)) => {
                    if !record.cookies.is_empty() {
                        req.cookie = Some(record.cookie_header());
                    }
                    let mut headers: Vec<_> = record.headers.into_iter().collect();
                    headers.sort();
                    req.headers = headers;
                }
                Ok(None) => {}
                Err(e) => warn!(source = request.source_key(), error = %e, "session load failed"),
            }
        }
        req
    }

    fn interpret(&self, request: &FetchRequest, resp: RawResponse, elapsed: Duration) -> FetchOutcome {
        let key = request.source_key();
        match resp.status {
            200..=299 => {
                if let Some(found) = challenge::detect(&resp.body) {
                    warn!(source = key, url = request.url(), challenge = %found, "anti-bot challenge page");
                    return FetchOutcome::TransientError {
                        cause: FetchCause::Challenge(found),
                    };
                }
                if request.session().is_some() {
                    if let Err(e) = self.sessions.refresh(key, &resp.set_cookies) {
                        warn!(source = key, error = %e, "session refresh failed");
                    }
                }
                FetchOutcome::Success {
                    body: resp.body,
                    status: resp.status,
                    elapsed,
                }
            }
            401 | 403 => {
                match self.sessions.invalidate(key) {
                    Ok(true) => info!(source = key, status = resp.status, "session rejected by remote"),
                    Ok(false) => {}
                    Err(e) => warn!(source = key, error = %e, "session invalidation failed"),
                }
                FetchOutcome::FatalError {
                    cause: FetchCause::AuthRejected(resp.status),
                }
            }
            429 => FetchOutcome::RateLimited {
                retry_after: resp
                    .retry_after
                    .unwrap_or_else(|| self.governor.current_delay(key)),
                origin: LimitOrigin::Remote,
            },
            s => {
                let cause = FetchCause::Status(s);
                if cause.is_transient() {
                    FetchOutcome::TransientError { cause }
                } else {
                    FetchOutcome::FatalError { cause }
                }
            }
        }
    }
}

fn cancelled() -> FetchOutcome {
    FetchOutcome::TransientError {
        cause: FetchCause::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::cancel::cancel_pair;
    use crate::acquisition::challenge::Challenge;
    use crate::acquisition::http_session::SessionRecord;
    use crate::acquisition::outcome::SessionHandle;
    use crate::pool::rate_governor::CircuitState;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses in order, then repeats the last one.
    struct Scripted {
        script: Mutex<VecDeque<Result<RawResponse, FetchCause>>>,
        seen: Mutex<Vec<TransportRequest>>,
    }

    impl Scripted {
        fn new(script: Vec<Result<RawResponse, FetchCause>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpTransport for Scripted {
        async fn get(&self, request: &TransportRequest) -> Result<RawResponse, FetchCause> {
            self.seen.lock().unwrap().push(request.clone());
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            }
        }
    }

    struct Hanging;

    /// First request gets a 500, every later one hangs.
    #[derive(Default)]
    struct FailThenHang {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl HttpTransport for FailThenHang {
        async fn get(&self, _: &TransportRequest) -> Result<RawResponse, FetchCause> {
            if self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                return status(500);
            }
            std::future::pending().await
        }
    }

    #[async_trait]
    impl HttpTransport for Hanging {
        async fn get(&self, _: &TransportRequest) -> Result<RawResponse, FetchCause> {
            std::future::pending().await
        }
    }

    fn status(code: u16) -> Result<RawResponse, FetchCause> {
        Ok(RawResponse {
            status: code,
            body: format!("status {code}"),
            ..Default::default()
        })
    }

    fn fast_config() -> HarvestConfig {
        let mut config = HarvestConfig::default();
        config.defaults.base_delay = 0.0;
        config.defaults.max_delay = 0.0;
        config
    }

    fn fetcher(config: &HarvestConfig, transport: Arc<dyn HttpTransport>) -> BoundedFetcher {
        let governor = Arc::new(RateGovernor::new(config).with_jitter(0.0));
        let sessions = Arc::new(SessionStore::in_memory(chrono::Duration::hours(24)));
        BoundedFetcher::new(config, governor, sessions, transport)
    }

    fn req() -> FetchRequest {
        FetchRequest::new("https://forum.example/t/1", "forum")
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let transport = Scripted::new(vec![status(503), Err(FetchCause::Timeout), status(200)]);
        let f = fetcher(&fast_config(), transport.clone());
        let outcome = f.fetch_one(&req()).await;
        assert!(outcome.is_success());
        assert_eq!(transport.calls(), 3);
        assert_eq!(f.governor().stats("forum").consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_client_error_is_fatal_without_retry() {
        let transport = Scripted::new(vec![status(404)]);
        let f = fetcher(&fast_config(), transport.clone());
        let outcome = f.fetch_one(&req()).await;
        assert!(matches!(
            outcome,
            FetchOutcome::FatalError {
                cause: FetchCause::Status(404)
            }
        ));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_dns_failure_is_fatal() {
        let transport = Scripted::new(vec![Err(FetchCause::Dns("no such host".into()))]);
        let f = fetcher(&fast_config(), transport.clone());
        assert!(matches!(f.fetch_one(&req()).await, FetchOutcome::FatalError { .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_remote_429_exhausts_retries() {
        let transport = Scripted::new(vec![Ok(RawResponse {
            status: 429,
            retry_after: Some(Duration::from_secs(3)),
            ..Default::default()
        })]);
        let f = fetcher(&fast_config(), transport.clone());
        let outcome = f.fetch_one(&req()).await;
        assert!(matches!(
            outcome,
            FetchOutcome::RateLimited {
                origin: LimitOrigin::Remote,
                ..
            }
        ));
        assert_eq!(transport.calls(), 4);
        assert_eq!(f.governor().stats("forum").consecutive_failures, 4);
    }

    #[tokio::test]
    async fn test_challenge_page_counts_as_failure() {
        let transport = Scripted::new(vec![Ok(RawResponse {
            status: 200,
            body: r#"<html><div id="cf-browser-verification">Checking your browser</div></html>"#.into(),
            ..Default::default()
        })]);
        let f = fetcher(&fast_config(), transport.clone());
        let outcome = f.fetch_one(&req()).await;
        assert!(matches!(
            outcome,
            FetchOutcome::TransientError {
                cause: FetchCause::Challenge(Challenge::Cloudflare)
            }
        ));
        assert_eq!(
            crate::pipeline::report::classify(&outcome),
            Some(crate::error::ErrorClass::ChallengeDetected)
        );
        assert_eq!(transport.calls(), 4);
        let stats = f.governor().stats("forum");
        assert_eq!(stats.successful_requests, 0);
        assert_eq!(stats.consecutive_failures, 4);
    }

    #[tokio::test]
    async fn test_open_circuit_skips_network() {
        let mut config = fast_config();
        config.defaults.circuit_threshold = 2;
        config.fetch.max_retries = 0;
        let transport = Scripted::new(vec![status(500)]);
        let f = fetcher(&config, transport.clone());

        f.fetch_one(&req()).await;
        f.fetch_one(&req()).await;
        assert_eq!(f.governor().circuit_state("forum"), CircuitState::Open);

        let outcome = f.fetch_one(&req()).await;
        assert!(matches!(
            outcome,
            FetchOutcome::RateLimited {
                origin: LimitOrigin::Local,
                ..
            }
        ));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_session_mismatch_never_sends() {
        let transport = Scripted::new(vec![status(200)]);
        let f = fetcher(&fast_config(), transport.clone());
        let request = req().with_session(SessionHandle::new("other"));
        assert!(matches!(
            f.fetch_one(&request).await,
            FetchOutcome::FatalError {
                cause: FetchCause::SessionMismatch { .. }
            }
        ));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_session_cookies_sent_and_refreshed() {
        let transport = Scripted::new(vec![Ok(RawResponse {
            status: 200,
            body: "ok".into(),
            set_cookies: vec![("csrf".into(), "t1".into())],
            retry_after: None,
        })]);
        let f = fetcher(&fast_config(), transport.clone());
        let mut record = SessionRecord::new("forum");
        record.add_cookie("sid", "abc");
        f.sessions().save("forum", &record).unwrap();

        let request = req().with_session(SessionHandle::new("forum"));
        assert!(f.fetch_one(&request).await.is_success());

        let sent = transport.seen.lock().unwrap()[0].clone();
        assert_eq!(sent.cookie.as_deref(), Some("sid=abc"));
        let stored = f.sessions().load("forum").unwrap().unwrap();
        assert_eq!(stored.cookies.get("csrf").map(String::as_str), Some("t1"));
    }

    #[tokio::test]
    async fn test_auth_rejection_invalidates_session() {
        let transport = Scripted::new(vec![status(401)]);
        let f = fetcher(&fast_config(), transport.clone());
        f.sessions()
            .save("forum", &SessionRecord::new("forum"))
            .unwrap();

        let request = req().with_session(SessionHandle::new("forum"));
        assert!(matches!(
            f.fetch_one(&request).await,
            FetchOutcome::FatalError {
                cause: FetchCause::AuthRejected(401)
            }
        ));
        assert!(f.sessions().load("forum").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_many_preserves_order() {
        let transport = Scripted::new(vec![status(200)]);
        let f = fetcher(&fast_config(), transport);
        let requests: Vec<_> = (0..4)
            .map(|i| FetchRequest::new(format!("https://h{i}.example/"), format!("s{i}")))
            .collect();
        let outcomes = f.fetch_many(&requests).await;
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(FetchOutcome::is_success));
    }

    #[tokio::test]
    async fn test_identity_stable_until_rotated() {
        let f = fetcher(&fast_config(), Scripted::new(vec![status(200)]));
        let first = f.identity("forum");
        assert_eq!(f.identity("forum"), first);
        let rotated = f.rotate_identity("forum");
        assert_eq!(f.identity("forum"), rotated);
    }

    #[tokio::test]
    async fn test_cancel_abandons_in_flight_fetch() {
        let (handle, token) = cancel_pair();
        let f = fetcher(&fast_config(), Arc::new(Hanging)).with_cancel(token);
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        };
        let r = req();
        let (outcome, _) = tokio::join!(f.fetch_one(&r), cancel);
        assert!(matches!(
            outcome,
            FetchOutcome::TransientError {
                cause: FetchCause::Cancelled
            }
        ));
        assert_eq!(f.admission().active(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_trial_releases_half_open_slot() {
        let mut config = fast_config();
        config.defaults.circuit_threshold = 1;
        config.defaults.cooldown_seconds = 0.05;
        config.defaults.max_cooldown_seconds = 0.1;
        config.fetch.max_retries = 0;
        let (handle, token) = cancel_pair();
        let f = fetcher(&config, Arc::new(FailThenHang::default())).with_cancel(token);

        f.fetch_one(&req()).await;
        assert_eq!(f.governor().circuit_state("forum"), CircuitState::Open);
        tokio::time::sleep(Duration::from_millis(60)).await;

        let cancel = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        };
        let r = req();
        let (trial, _) = tokio::join!(f.fetch_one(&r), cancel);
        assert!(matches!(
            trial,
            FetchOutcome::TransientError {
                cause: FetchCause::Cancelled
            }
        ));

        // The abandoned trial counts as a failed trial: reopen, not stuck half-open.
        let stats = f.governor().stats("forum");
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.circuit, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(f.governor().admit("forum").proceed);
    }
}
