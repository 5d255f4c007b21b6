//! Rate governor: per-source backoff scheduling and circuit breaker.
//!
//! Every fetch path goes through one `admit`/`report` pair. State for a
//! source key lives behind its own mutex, so unrelated sources never
//! contend with each other.

use crate::acquisition::outcome::{FetchOutcome, LimitOrigin};
use crate::config::{HarvestConfig, RateOverride, RateParams};
use dashmap::DashMap;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default multiplicative jitter applied to scheduled waits.
pub const DEFAULT_JITTER: f64 = 0.2;

/// Circuit breaker state for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Answer to an admission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub proceed: bool,
    /// How long to wait before sending (if `proceed`) or before asking again.
    pub wait_for: Duration,
}

impl Decision {
    fn proceed_after(wait_for: Duration) -> Self {
        Self {
            proceed: true,
            wait_for,
        }
    }

    fn deny(wait_for: Duration) -> Self {
        Self {
            proceed: false,
            wait_for,
        }
    }
}

/// Snapshot of one source's bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct GovernorStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub total_errors: u64,
    pub rate_limited_count: u64,
    pub consecutive_failures: u32,
    pub circuit: CircuitState,
    /// Percentage of successful requests, 0 when nothing was sent.
    pub success_rate: f64,
}

/// Mutable per-source state. Only touched with its mutex held.
#[derive(Debug)]
struct RateState {
    params: RateParams,
    consecutive_failures: u32,
    circuit: CircuitState,
    open_until: Option<Instant>,
    cooldown: Duration,
    next_slot: Option<Instant>,
    trial_in_flight: bool,
    total_requests: u64,
    successful_requests: u64,
    total_errors: u64,
    rate_limited_count: u64,
}

impl RateState {
    fn new(params: RateParams) -> Self {
        let cooldown = params.cooldown();
        Self {
            params,
            consecutive_failures: 0,
            circuit: CircuitState::Closed,
            open_until: None,
            cooldown,
            next_slot: None,
            trial_in_flight: false,
            total_requests: 0,
            successful_requests: 0,
            total_errors: 0,
            rate_limited_count: 0,
        }
    }

    /// `min(max_delay, base_delay * backoff_factor^failures)`, without jitter.
    fn nominal_delay(&self) -> Duration {
        let p = &self.params;
        let secs = p.base_delay * p.backoff_factor.powi(self.consecutive_failures as i32);
        let capped = if secs.is_finite() {
            secs.min(p.max_delay)
        } else {
            p.max_delay
        };
        Duration::from_secs_f64(capped.max(0.0))
    }

    fn jittered(&self, d: Duration, jitter: f64) -> Duration {
        if jitter <= 0.0 || d.is_zero() {
            return d;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
        let secs = (d.as_secs_f64() * factor).clamp(0.0, self.params.max_delay);
        Duration::from_secs_f64(secs)
    }

    fn open(&mut self, key: &str, now: Instant) {
        self.circuit = CircuitState::Open;
        self.open_until = Some(now + self.cooldown);
        self.trial_in_flight = false;
        warn!(
            source = key,
            failures = self.consecutive_failures,
            cooldown_secs = self.cooldown.as_secs_f64(),
            "circuit opened"
        );
    }
}

/// Process-wide admission control keyed by source.
pub struct RateGovernor {
    defaults: RateParams,
    overrides: BTreeMap<String, RateOverride>,
    states: DashMap<String, Arc<Mutex<RateState>>>,
    jitter: f64,
}

impl RateGovernor {
    /// Build a governor from the configuration table.
    pub fn new(config: &HarvestConfig) -> Self {
        Self {
            defaults: config.defaults.clone(),
            overrides: config.sources.clone(),
            states: DashMap::new(),
            jitter: DEFAULT_JITTER,
        }
    }

    /// Override the jitter fraction (0 disables jitter).
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 0.9);
        self
    }

    fn params_for(&self, key: &str) -> RateParams {
        match self.overrides.get(key) {
            Some(o) => self.defaults.merged(o),
            None => self.defaults.clone(),
        }
    }

    fn state(&self, key: &str) -> Arc<Mutex<RateState>> {
        if let Some(s) = self.states.get(key) {
            return Arc::clone(s.value());
        }
        let entry = self
            .states
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(RateState::new(self.params_for(key)))));
        Arc::clone(entry.value())
    }

    fn with_state<R>(&self, key: &str, f: impl FnOnce(&mut RateState) -> R) -> R {
        let state = self.state(key);
        let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Ask whether a request to `key` may go out, and after how long.
    pub fn admit(&self, key: &str) -> Decision {
        self.admit_at(key, Instant::now())
    }

    /// `admit` against an explicit clock reading.
    pub fn admit_at(&self, key: &str, now: Instant) -> Decision {
        let jitter = self.jitter;
        self.with_state(key, |st| {
            let circuit = st.circuit;
            match circuit {
                CircuitState::Open => {
                    let until = st.open_until.unwrap_or(now);
                    if now >= until {
                        st.circuit = CircuitState::HalfOpen;
                        st.trial_in_flight = true;
                        info!(source = key, "circuit half-open, admitting a trial request");
                        Decision::proceed_after(Duration::ZERO)
                    } else {
                        Decision::deny(until - now)
                    }
                }
                CircuitState::HalfOpen => {
                    if st.trial_in_flight {
                        Decision::deny(st.params.base().max(Duration::from_millis(100)))
                    } else {
                        st.trial_in_flight = true;
                        Decision::proceed_after(Duration::ZERO)
                    }
                }
                CircuitState::Closed => {
                    let delay = st.jittered(st.nominal_delay(), jitter);
                    let slot = st.next_slot.map_or(now, |s| s.max(now));
                    st.next_slot = Some(slot + delay);
                    Decision::proceed_after(slot - now)
                }
            }
        })
    }

    /// Record the outcome of an admitted request.
    pub fn report(&self, key: &str, outcome: &FetchOutcome) {
        self.report_at(key, outcome, Instant::now())
    }

    /// `report` against an explicit clock reading.
    pub fn report_at(&self, key: &str, outcome: &FetchOutcome, now: Instant) {
        if let FetchOutcome::RateLimited {
            origin: LimitOrigin::Local,
            ..
        } = outcome
        {
            return;
        }
        let jitter = self.jitter;
        self.with_state(key, |st| {
            st.total_requests += 1;

            if !outcome.is_failure() {
                st.successful_requests += 1;
                st.consecutive_failures = 0;
                if st.circuit != CircuitState::Closed {
                    info!(source = key, "circuit closed");
                }
                st.circuit = CircuitState::Closed;
                st.open_until = None;
                st.trial_in_flight = false;
                st.cooldown = st.params.cooldown();
                return;
            }

            st.total_errors += 1;
            if matches!(outcome, FetchOutcome::RateLimited { .. }) {
                st.rate_limited_count += 1;
            }
            st.consecutive_failures = st.consecutive_failures.saturating_add(1);

            // Retries wait out the new backoff, measured from the failure.
            let backoff = st.jittered(st.nominal_delay(), jitter);
            let earliest = now + backoff;
            st.next_slot = Some(st.next_slot.map_or(earliest, |s| s.max(earliest)));
            debug!(
                source = key,
                failures = st.consecutive_failures,
                delay_secs = backoff.as_secs_f64(),
                "backoff increased"
            );

            let circuit = st.circuit;
            match circuit {
                CircuitState::HalfOpen => {
                    st.cooldown = (st.cooldown * 2).min(st.params.max_cooldown());
                    st.open(key, now);
                }
                CircuitState::Closed
                    if st.consecutive_failures >= st.params.circuit_threshold =>
                {
                    st.open(key, now);
                }
                _ => {}
            }
        })
    }

    /// Current un-jittered backoff delay for `key`.
    pub fn current_delay(&self, key: &str) -> Duration {
        self.with_state(key, |st| st.nominal_delay())
    }

    pub fn circuit_state(&self, key: &str) -> CircuitState {
        self.with_state(key, |st| st.circuit)
    }

    pub fn stats(&self, key: &str) -> GovernorStats {
        self.with_state(key, |st| GovernorStats {
            total_requests: st.total_requests,
            successful_requests: st.successful_requests,
            total_errors: st.total_errors,
            rate_limited_count: st.rate_limited_count,
            consecutive_failures: st.consecutive_failures,
            circuit: st.circuit,
            success_rate: if st.total_requests == 0 {
                0.0
            } else {
                st.successful_requests as f64 * 100.0 / st.total_requests as f64
            },
        })
    }

    /// Source keys the governor has seen.
    pub fn known_sources(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.states.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::outcome::FetchCause;

    fn governor(threshold: u32, cooldown: f64) -> RateGovernor {
        let mut cfg = HarvestConfig::default();
        cfg.defaults = RateParams {
            base_delay: 1.0,
            max_delay: 30.0,
            backoff_factor: 2.0,
            circuit_threshold: threshold,
            cooldown_seconds: cooldown,
            max_cooldown_seconds: 100.0,
        };
        RateGovernor::new(&cfg).with_jitter(0.0)
    }

    fn transient() -> FetchOutcome {
        FetchOutcome::TransientError {
            cause: FetchCause::Timeout,
        }
    }

    fn success() -> FetchOutcome {
        FetchOutcome::Success {
            body: String::new(),
            status: 200,
            elapsed: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_backoff_monotonic_and_capped() {
        let gov = governor(1000, 60.0);
        let t0 = Instant::now();
        let mut last = gov.current_delay("forum");
        assert_eq!(last, Duration::from_secs(1));

        for _ in 0..12 {
            gov.report_at("forum", &transient(), t0);
            let d = gov.current_delay("forum");
            assert!(d >= last, "{d:?} < {last:?}");
            assert!(d <= Duration::from_secs(30));
            last = d;
        }
        assert_eq!(last, Duration::from_secs(30));

        gov.report_at("forum", &success(), t0);
        assert_eq!(gov.current_delay("forum"), Duration::from_secs(1));
    }

    #[test]
    fn test_circuit_trips_after_threshold() {
        let gov = governor(3, 10.0);
        let t0 = Instant::now();

        for i in 0..3 {
            assert!(gov.admit_at("reddit", t0).proceed);
            gov.report_at(
                "reddit",
                &FetchOutcome::FatalError {
                    cause: FetchCause::Status(404),
                },
                t0,
            );
            if i < 2 {
                assert_eq!(gov.circuit_state("reddit"), CircuitState::Closed);
            }
        }
        assert_eq!(gov.circuit_state("reddit"), CircuitState::Open);

        let d = gov.admit_at("reddit", t0 + Duration::from_secs(1));
        assert!(!d.proceed);
        assert_eq!(d.wait_for, Duration::from_secs(9));
    }

    #[test]
    fn test_half_open_trial_success_closes() {
        let gov = governor(2, 10.0);
        let t0 = Instant::now();
        gov.report_at("osm", &transient(), t0);
        gov.report_at("osm", &transient(), t0);
        assert_eq!(gov.circuit_state("osm"), CircuitState::Open);

        let after = t0 + Duration::from_secs(11);
        let trial = gov.admit_at("osm", after);
        assert!(trial.proceed);
        assert_eq!(gov.circuit_state("osm"), CircuitState::HalfOpen);

        // Only one trial at a time.
        assert!(!gov.admit_at("osm", after).proceed);

        gov.report_at("osm", &success(), after);
        assert_eq!(gov.circuit_state("osm"), CircuitState::Closed);
        assert_eq!(gov.stats("osm").consecutive_failures, 0);
        assert!(gov.admit_at("osm", after).proceed);
    }

    #[test]
    fn test_half_open_failure_doubles_cooldown() {
        let gov = governor(1, 10.0);
        let t0 = Instant::now();
        gov.report_at("insta", &transient(), t0);

        let trial_at = t0 + Duration::from_secs(10);
        assert!(gov.admit_at("insta", trial_at).proceed);
        gov.report_at("insta", &transient(), trial_at);
        assert_eq!(gov.circuit_state("insta"), CircuitState::Open);

        assert!(!gov.admit_at("insta", trial_at + Duration::from_secs(15)).proceed);
        assert!(gov.admit_at("insta", trial_at + Duration::from_secs(20)).proceed);
    }

    #[test]
    fn test_cooldown_doubling_is_capped() {
        let gov = governor(1, 60.0);
        let mut now = Instant::now();
        gov.report_at("k", &transient(), now);
        // 60 -> 100 (cap) -> 100
        for expected in [100u64, 100] {
            now += Duration::from_secs(200);
            assert!(gov.admit_at("k", now).proceed);
            gov.report_at("k", &transient(), now);
            let d = gov.admit_at("k", now);
            assert!(!d.proceed);
            assert_eq!(d.wait_for, Duration::from_secs(expected));
        }
    }

    #[test]
    fn test_local_rate_limit_is_ignored() {
        let gov = governor(1, 10.0);
        gov.report("forum", &FetchOutcome::local_limit(Duration::from_secs(5)));
        let stats = gov.stats("forum");
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.circuit, CircuitState::Closed);
    }

    #[test]
    fn test_admissions_are_spaced_per_key() {
        let gov = governor(10, 10.0);
        let t0 = Instant::now();
        assert_eq!(gov.admit_at("a", t0).wait_for, Duration::ZERO);
        assert_eq!(gov.admit_at("a", t0).wait_for, Duration::from_secs(1));
        assert_eq!(gov.admit_at("a", t0).wait_for, Duration::from_secs(2));
        // Another key is not affected.
        assert_eq!(gov.admit_at("b", t0).wait_for, Duration::ZERO);
    }

    #[test]
    fn test_jitter_stays_within_twenty_percent() {
        let mut cfg = HarvestConfig::default();
        cfg.defaults.base_delay = 10.0;
        let gov = RateGovernor::new(&cfg);
        let t0 = Instant::now();
        gov.admit_at("j", t0);
        for _ in 0..50 {
            let before = gov.admit_at("j", t0).wait_for;
            let after = gov.admit_at("j", t0).wait_for;
            let gap = (after - before).as_secs_f64();
            assert!((7.99..=12.01).contains(&gap), "gap {gap}");
        }
    }

    #[test]
    fn test_stats_success_rate() {
        let gov = governor(10, 10.0);
        gov.report("s", &success());
        gov.report("s", &success());
        gov.report(
            "s",
            &FetchOutcome::RateLimited {
                retry_after: Duration::from_secs(1),
                origin: LimitOrigin::Remote,
            },
        );
        gov.report("s", &success());
        let stats = gov.stats("s");
        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.rate_limited_count, 1);
        assert!((stats.success_rate - 75.0).abs() < 1e-9);
        assert_eq!(gov.known_sources(), vec!["s".to_string()]);
    }
}
