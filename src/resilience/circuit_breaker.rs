//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: one probe call tests whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive tripping failures >= threshold
//! Open → Half-Open: first call at or after next_attempt
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails (fresh next_attempt)
//! ```
//!
//! # Design Decisions
//! - One breaker per dependency name, owned by the registry
//! - Fail fast in Open state, never sleep inside the breaker
//! - Single in-flight probe in Half-Open; a cancelled probe frees the slot
//! - The lock is held only while reading or recording, never across the call

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::error::ServiceError;
use crate::observability::metrics;
use crate::resilience::retries::should_trip_breaker;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    pub(crate) fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Custom failure classifier.
pub type TripPredicate = Arc<dyn Fn(&(dyn std::error::Error + 'static)) -> bool + Send + Sync>;

/// Which failures count toward opening the breaker.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripPolicy {
    /// Every error counts.
    #[default]
    All,
    /// Only high and critical [`ServiceError`]s count. Foreign error types count.
    Severe,
    #[serde(skip)]
    Custom(TripPredicate),
}

impl TripPolicy {
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&(dyn std::error::Error + 'static)) -> bool + Send + Sync + 'static,
    {
        TripPolicy::Custom(Arc::new(predicate))
    }

    pub fn is_tripping(&self, error: &(dyn std::error::Error + 'static)) -> bool {
        match self {
            TripPolicy::All => true,
            TripPolicy::Severe => error
                .downcast_ref::<ServiceError>()
                .map(|e| should_trip_breaker(e.severity()))
                .unwrap_or(true),
            TripPolicy::Custom(predicate) => predicate(error),
        }
    }
}

impl fmt::Debug for TripPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TripPolicy::All => f.write_str("All"),
            TripPolicy::Severe => f.write_str("Severe"),
            TripPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Per-dependency breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive tripping failures that open the breaker.
    pub threshold: u32,

    /// Time spent open before a probe is admitted, in milliseconds.
    pub timeout_ms: u64,

    /// Quiet time after which closed-state failures are forgotten (0 = never).
    pub reset_timeout_ms: u64,

    /// Window for failure-rate accounting (0 = breaker lifetime).
    pub monitoring_period_ms: u64,

    /// Failure classifier.
    pub trip_on: TripPolicy,
}

impl BreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn monitoring_period(&self) -> Duration {
        Duration::from_millis(self.monitoring_period_ms)
    }

    pub fn with_trip_policy(mut self, trip_on: TripPolicy) -> Self {
        self.trip_on = trip_on;
        self
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            timeout_ms: 60_000,
            reset_timeout_ms: 120_000,
            monitoring_period_ms: 60_000,
            trip_on: TripPolicy::All,
        }
    }
}

/// Failure surfaced by a protected call.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// Rejected without calling the dependency.
    #[error("circuit breaker '{dependency}' is open")]
    Open {
        dependency: String,
        retry_after: Duration,
    },

    /// The dependency itself failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> CallError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CallError::Open { .. })
    }

    pub fn inner(&self) -> Option<&E> {
        match self {
            CallError::Inner(e) => Some(e),
            CallError::Open { .. } => None,
        }
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            CallError::Inner(e) => Some(e),
            CallError::Open { .. } => None,
        }
    }
}

/// A state change, as delivered to monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerTransition {
    pub dependency: String,
    pub old_state: CircuitState,
    pub new_state: CircuitState,
    pub failure_count: u32,
    pub threshold: u32,
    pub next_attempt_time: Option<DateTime<Utc>>,
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u64,
    pub total_requests: u64,
    pub rejected_requests: u64,
    pub threshold: u32,
    pub failure_rate: f64,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub next_attempt_time: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u64,
    total_requests: u64,
    rejected_requests: u64,
    last_failure: Option<Instant>,
    last_failure_time: Option<DateTime<Utc>>,
    last_success_time: Option<DateTime<Utc>>,
    next_attempt: Option<Instant>,
    next_attempt_time: Option<DateTime<Utc>>,
    probe_in_flight: bool,
    period_started: Instant,
    period_successes: u64,
    period_failures: u64,
}

impl BreakerInner {
    fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            total_requests: 0,
            rejected_requests: 0,
            last_failure: None,
            last_failure_time: None,
            last_success_time: None,
            next_attempt: None,
            next_attempt_time: None,
            probe_in_flight: false,
            period_started: now,
            period_successes: 0,
            period_failures: 0,
        }
    }

    fn roll_period(&mut self, now: Instant, period: Duration) {
        if !period.is_zero() && now.duration_since(self.period_started) >= period {
            self.period_started = now;
            self.period_successes = 0;
            self.period_failures = 0;
        }
    }

    fn failure_rate(&self) -> f64 {
        let total = self.period_successes + self.period_failures;
        if total == 0 {
            0.0
        } else {
            self.period_failures as f64 / total as f64 * 100.0
        }
    }
}

/// Circuit breaker guarding one dependency.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
    events: Option<broadcast::Sender<BreakerTransition>>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a standalone breaker. Transitions are logged and counted only.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner::new(Instant::now())),
            events: None,
        }
    }

    /// Also publish transitions on `events`.
    pub fn with_events(mut self, events: broadcast::Sender<BreakerTransition>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Run `operation` under breaker protection.
    ///
    /// Fails with [`CallError::Open`] without invoking `operation` when the
    /// breaker is open or a half-open probe is already in flight. If the
    /// returned future is dropped before completion nothing is recorded.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        self.execute_with(operation, |e| self.config.trip_on.is_tripping(e))
            .await
    }

    /// Like [`execute`](Self::execute), but `trips` decides which errors
    /// count as failures instead of the configured trip policy.
    pub async fn execute_with<T, E, F, Fut, P>(&self, operation: F, trips: P) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnOnce(&E) -> bool,
    {
        let mut permit = match self.admit() {
            Ok(permit) => permit,
            Err(retry_after) => {
                return Err(CallError::Open {
                    dependency: self.name.clone(),
                    retry_after,
                })
            }
        };

        let outcome = operation().await;
        match &outcome {
            Ok(_) => permit.complete(Outcome::Success),
            Err(e) if trips(e) => permit.complete(Outcome::Failure),
            Err(_) => permit.complete(Outcome::Ignored),
        }
        outcome.map_err(CallError::Inner)
    }

    /// Record a success observed outside [`execute`](Self::execute).
    ///
    /// While half-open this decides the transition only if no trial call is
    /// in flight; otherwise that call's own outcome wins.
    pub fn record_success(&self) {
        self.on_success(Origin::Manual);
    }

    /// Record a failure observed outside [`execute`](Self::execute).
    /// Half-open handling matches [`record_success`](Self::record_success).
    pub fn record_failure(&self) {
        self.on_failure(Origin::Manual);
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn stats(&self) -> BreakerStats {
        let mut inner = self.lock();
        inner.roll_period(Instant::now(), self.config.monitoring_period());
        BreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_requests: inner.total_requests,
            rejected_requests: inner.rejected_requests,
            threshold: self.config.threshold,
            failure_rate: inner.failure_rate(),
            last_failure_time: inner.last_failure_time,
            last_success_time: inner.last_success_time,
            next_attempt_time: inner.next_attempt_time,
        }
    }

    /// Failure percentage (0-100) within the current monitoring period.
    pub fn failure_rate(&self) -> f64 {
        let mut inner = self.lock();
        inner.roll_period(Instant::now(), self.config.monitoring_period());
        inner.failure_rate()
    }

    /// Closed and failing less than half the time.
    pub fn is_healthy(&self) -> bool {
        let mut inner = self.lock();
        inner.roll_period(Instant::now(), self.config.monitoring_period());
        inner.state == CircuitState::Closed && inner.failure_rate() < 50.0
    }

    /// Open the breaker now, regardless of recorded outcomes.
    pub fn force_open(&self) {
        let now = Instant::now();
        let transition = {
            let mut inner = self.lock();
            inner.probe_in_flight = false;
            self.set_state(&mut inner, CircuitState::Open, now)
        };
        tracing::warn!(dependency = %self.name, "Circuit breaker forced open");
        self.publish(transition);
    }

    /// Close the breaker now and forget consecutive failures.
    pub fn force_closed(&self) {
        let now = Instant::now();
        let transition = {
            let mut inner = self.lock();
            inner.probe_in_flight = false;
            inner.failure_count = 0;
            self.set_state(&mut inner, CircuitState::Closed, now)
        };
        tracing::info!(dependency = %self.name, "Circuit breaker forced closed");
        self.publish(transition);
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether a call may proceed. `Err` carries the time until the
    /// next probe is due.
    fn admit(&self) -> Result<Permit<'_>, Duration> {
        let now = Instant::now();
        let mut transition = None;
        let decision = {
            let mut inner = self.lock();
            match inner.state {
                CircuitState::Closed => {
                    inner.total_requests += 1;
                    Ok(false)
                }
                CircuitState::Open => {
                    let next_attempt = inner.next_attempt.unwrap_or(now);
                    if now >= next_attempt {
                        transition = self.set_state(&mut inner, CircuitState::HalfOpen, now);
                        inner.probe_in_flight = true;
                        inner.total_requests += 1;
                        Ok(true)
                    } else {
                        inner.rejected_requests += 1;
                        Err(next_attempt - now)
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.probe_in_flight {
                        inner.rejected_requests += 1;
                        Err(Duration::ZERO)
                    } else {
                        inner.probe_in_flight = true;
                        inner.total_requests += 1;
                        Ok(true)
                    }
                }
            }
        };
        self.publish(transition);

        match decision {
            Ok(probe) => Ok(Permit {
                breaker: self,
                probe,
                done: false,
            }),
            Err(retry_after) => {
                tracing::debug!(dependency = %self.name, retry_after = ?retry_after, "Circuit breaker rejected call");
                metrics::record_breaker_rejection(&self.name);
                Err(retry_after)
            }
        }
    }

    fn on_success(&self, origin: Origin) {
        let now = Instant::now();
        let transition = {
            let mut inner = self.lock();
            inner.roll_period(now, self.config.monitoring_period());
            inner.success_count += 1;
            inner.period_successes += 1;
            inner.last_success_time = Some(Utc::now());

            match inner.state {
                CircuitState::Closed => {
                    inner.failure_count = 0;
                    None
                }
                CircuitState::HalfOpen if origin.decides(&inner) => {
                    inner.probe_in_flight = false;
                    inner.failure_count = 0;
                    self.set_state(&mut inner, CircuitState::Closed, now)
                }
                // Late outcome of a call admitted before the breaker opened.
                CircuitState::HalfOpen | CircuitState::Open => None,
            }
        };
        self.publish(transition);
    }

    fn on_failure(&self, origin: Origin) {
        let now = Instant::now();
        let transition = {
            let mut inner = self.lock();
            inner.roll_period(now, self.config.monitoring_period());
            inner.period_failures += 1;
            inner.last_failure_time = Some(Utc::now());

            let transition = match inner.state {
                CircuitState::Closed => {
                    let reset_timeout = self.config.reset_timeout();
                    let stale = inner
                        .last_failure
                        .map(|at| !reset_timeout.is_zero() && now.duration_since(at) >= reset_timeout)
                        .unwrap_or(false);
                    if stale {
                        inner.failure_count = 0;
                    }
                    inner.failure_count += 1;
                    if inner.failure_count >= self.config.threshold {
                        self.set_state(&mut inner, CircuitState::Open, now)
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen if origin.decides(&inner) => {
                    inner.probe_in_flight = false;
                    self.set_state(&mut inner, CircuitState::Open, now)
                }
                CircuitState::HalfOpen | CircuitState::Open => None,
            };
            inner.last_failure = Some(now);
            transition
        };
        self.publish(transition);
    }

    fn release_probe(&self) {
        self.lock().probe_in_flight = false;
    }

    fn set_state(
        &self,
        inner: &mut BreakerInner,
        to: CircuitState,
        now: Instant,
    ) -> Option<BreakerTransition> {
        let from = inner.state;
        match to {
            CircuitState::Open => {
                let timeout = self.config.timeout();
                inner.next_attempt = Some(now + timeout);
                inner.next_attempt_time = chrono::Duration::from_std(timeout)
                    .ok()
                    .map(|d| Utc::now() + d);
            }
            CircuitState::Closed => {
                inner.next_attempt = None;
                inner.next_attempt_time = None;
            }
            CircuitState::HalfOpen => {}
        }
        if from == to {
            return None;
        }
        inner.state = to;

        Some(BreakerTransition {
            dependency: self.name.clone(),
            old_state: from,
            new_state: to,
            failure_count: inner.failure_count,
            threshold: self.config.threshold,
            next_attempt_time: inner.next_attempt_time,
        })
    }

    fn publish(&self, transition: Option<BreakerTransition>) {
        let Some(transition) = transition else {
            return;
        };

        if transition.new_state == CircuitState::Open {
            tracing::warn!(
                dependency = %transition.dependency,
                from = %transition.old_state,
                failure_count = transition.failure_count,
                threshold = transition.threshold,
                next_attempt_time = ?transition.next_attempt_time,
                "Circuit breaker opened"
            );
        } else {
            tracing::info!(
                dependency = %transition.dependency,
                from = %transition.old_state,
                to = %transition.new_state,
                failure_count = transition.failure_count,
                "Circuit breaker state changed"
            );
        }
        metrics::record_breaker_transition(&transition.dependency, transition.old_state, transition.new_state);

        if let Some(events) = &self.events {
            // No subscribers is fine.
            let _ = events.send(transition);
        }
    }
}

enum Outcome {
    Success,
    Failure,
    Ignored,
}

/// Where a recorded outcome came from.
#[derive(Clone, Copy)]
enum Origin {
    /// The half-open trial call admitted by `execute`.
    Trial,
    /// Any other call admitted by `execute`.
    Call,
    /// `record_success` / `record_failure`.
    Manual,
}

impl Origin {
    /// Whether this outcome settles a half-open breaker.
    fn decides(self, inner: &BreakerInner) -> bool {
        match self {
            Origin::Trial => true,
            Origin::Call => false,
            Origin::Manual => !inner.probe_in_flight,
        }
    }
}

/// Admission ticket for one call. Dropping it unfinished records nothing.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    done: bool,
}

impl Permit<'_> {
    fn complete(&mut self, outcome: Outcome) {
        self.done = true;
        let origin = if self.probe { Origin::Trial } else { Origin::Call };
        match outcome {
            Outcome::Success => self.breaker.on_success(origin),
            Outcome::Failure => self.breaker.on_failure(origin),
            Outcome::Ignored if self.probe => self.breaker.release_probe(),
            Outcome::Ignored => {}
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.done && self.probe {
            self.breaker.release_probe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorContext;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::oneshot;

    fn config(threshold: u32, timeout_ms: u64) -> BreakerConfig {
        BreakerConfig {
            threshold,
            timeout_ms,
            reset_timeout_ms: 0,
            monitoring_period_ms: 0,
            trip_on: TripPolicy::All,
        }
    }

    fn boom() -> ServiceError {
        ServiceError::internal("dependency down", ErrorContext::new("test"))
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), CallError<ServiceError>> {
        breaker.execute(|| async { Err::<(), _>(boom()) }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), CallError<ServiceError>> {
        breaker.execute(|| async { Ok::<(), ServiceError>(()) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_and_fails_fast() {
        let breaker = CircuitBreaker::new("crm", config(3, 1_000));
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let result = breaker
                .execute(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(boom())
                })
                .await;
            assert!(matches!(result, Err(CallError::Inner(_))));
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let result = breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<(), ServiceError>(())
            })
            .await;
        match result {
            Err(CallError::Open { dependency, retry_after }) => {
                assert_eq!(dependency, "crm");
                assert_eq!(retry_after, Duration::from_millis(1_000));
            }
            other => panic!("expected open rejection, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(breaker.stats().rejected_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_closed_failure_count() {
        let breaker = CircuitBreaker::new("db", config(3, 1_000));
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.stats().failure_count, 2);

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.stats().failure_count, 0);

        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_reopens_then_success_closes() {
        let breaker = CircuitBreaker::new("ai", config(5, 2_000));
        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        let first_deadline = breaker.stats().next_attempt_time;

        tokio::time::advance(Duration::from_millis(2_000)).await;
        assert!(matches!(fail(&breaker).await, Err(CallError::Inner(_))));
        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.failure_count, 5);
        assert!(stats.next_attempt_time.is_some());
        assert!(stats.next_attempt_time >= first_deadline);

        // Fresh timeout: still rejected just before it elapses.
        tokio::time::advance(Duration::from_millis(1_999)).await;
        assert!(fail(&breaker).await.unwrap_err().is_open());

        tokio::time::advance(Duration::from_millis(1)).await;
        succeed(&breaker).await.unwrap();
        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failure_count, 0);
        assert!(stats.next_attempt_time.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_probe_in_half_open() {
        let breaker = CircuitBreaker::new("api", config(1, 100));
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(100)).await;

        let (tx, rx) = oneshot::channel::<()>();
        let probe = breaker.execute(|| async move {
            let _ = rx.await;
            Ok::<(), ServiceError>(())
        });
        tokio::pin!(probe);
        assert!(futures_util::poll!(&mut probe).is_pending());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        assert!(succeed(&breaker).await.unwrap_err().is_open());

        tx.send(()).unwrap();
        probe.await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_probe_records_nothing() {
        let breaker = CircuitBreaker::new("api", config(1, 100));
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(100)).await;

        {
            let probe = breaker.execute(|| std::future::pending::<Result<(), ServiceError>>());
            tokio::pin!(probe);
            assert!(futures_util::poll!(&mut probe).is_pending());
        }
        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::HalfOpen);
        assert_eq!(stats.failure_count, 1);

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_severe_policy_ignores_low_severity() {
        let breaker = CircuitBreaker::new(
            "forms",
            config(2, 1_000).with_trip_policy(TripPolicy::Severe),
        );
        for _ in 0..5 {
            let result = breaker
                .execute(|| async {
                    Err::<(), _>(ServiceError::validation("email", "missing", ErrorContext::new("submit")))
                })
                .await;
            assert!(matches!(result, Err(CallError::Inner(_))));
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().failure_count, 0);

        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_policy() {
        let policy = TripPolicy::custom(|e| e.to_string().contains("timeout"));
        let breaker = CircuitBreaker::new("cdn", config(1, 1_000).with_trip_policy(policy));

        let _ = breaker
            .execute(|| async { Err::<(), _>(ServiceError::internal("bad input", ErrorContext::new("x"))) })
            .await;
        assert_eq!(breaker.state(), CircuitState::Closed);

        let _ = breaker
            .execute(|| async { Err::<(), _>(ServiceError::internal("timeout", ErrorContext::new("x"))) })
            .await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_timeout_forgets_old_failures() {
        let mut cfg = config(3, 1_000);
        cfg.reset_timeout_ms = 500;
        let breaker = CircuitBreaker::new("db", cfg);

        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(500)).await;
        let _ = fail(&breaker).await;

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().failure_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_rate_and_health() {
        let mut cfg = config(10, 1_000);
        cfg.monitoring_period_ms = 10_000;
        let breaker = CircuitBreaker::new("mail", cfg);

        succeed(&breaker).await.unwrap();
        let _ = fail(&breaker).await;
        assert_eq!(breaker.failure_rate(), 50.0);
        assert!(!breaker.is_healthy());

        succeed(&breaker).await.unwrap();
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.failure_rate(), 25.0);
        assert!(breaker.is_healthy());

        tokio::time::advance(Duration::from_millis(10_000)).await;
        assert_eq!(breaker.failure_rate(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_open_and_closed() {
        let breaker = CircuitBreaker::new("search", config(5, 1_000));
        breaker.force_open();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(succeed(&breaker).await.unwrap_err().is_open());

        breaker.force_closed();
        assert_eq!(breaker.state(), CircuitState::Closed);
        succeed(&breaker).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_recording() {
        let breaker = CircuitBreaker::new("queue", config(2, 1_000));
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(1_000)).await;
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_success();
        assert_eq!(breaker.stats().success_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_record_defers_to_in_flight_trial() {
        let breaker = CircuitBreaker::new("queue", config(1, 100));
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(100)).await;

        let (tx, rx) = oneshot::channel::<()>();
        let trial = breaker.execute(|| async move {
            let _ = rx.await;
            Err::<(), _>(boom())
        });
        tokio::pin!(trial);
        assert!(futures_util::poll!(&mut trial).is_pending());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        // The slot still belongs to the running trial call.
        assert!(succeed(&breaker).await.unwrap_err().is_open());

        tx.send(()).unwrap();
        assert!(!trial.await.unwrap_err().is_open());
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_record_settles_idle_half_open() {
        let breaker = CircuitBreaker::new("queue", config(1, 100));
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(100)).await;
        {
            let trial = breaker.execute(|| std::future::pending::<Result<(), ServiceError>>());
            tokio::pin!(trial);
            assert!(futures_util::poll!(&mut trial).is_pending());
        }
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_with_overrides_trip_policy() {
        let breaker = CircuitBreaker::new("search", config(1, 1_000));
        let result = breaker
            .execute_with(|| async { Err::<(), _>(boom()) }, |_| false)
            .await;
        assert!(matches!(result, Err(CallError::Inner(_))));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transitions_are_published() {
        let (tx, mut rx) = broadcast::channel(16);
        let breaker = CircuitBreaker::new("crm", config(1, 1_000)).with_events(tx);

        let _ = fail(&breaker).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.dependency, "crm");
        assert_eq!(event.old_state, CircuitState::Closed);
        assert_eq!(event.new_state, CircuitState::Open);
        assert_eq!(event.failure_count, 1);
        assert_eq!(event.threshold, 1);
        assert!(event.next_attempt_time.is_some());

        tokio::time::advance(Duration::from_millis(1_000)).await;
        succeed(&breaker).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().new_state, CircuitState::HalfOpen);
        assert_eq!(rx.recv().await.unwrap().new_state, CircuitState::Closed);
    }
}
