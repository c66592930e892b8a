//! Sliding-window rate limiter.
//!
//! # Responsibilities
//! - Track exact request timestamps per key over a trailing window
//! - Admit or reject a request and report limit, remaining and reset hints
//! - Un-count the latest request when its outcome is configured not to count
//! - Sweep keys whose window has fully elapsed
//!
//! # Design Decisions
//! - True sliding window: no fixed buckets, no burst at bucket edges
//! - Entries live in a `DashMap`; a check holds only its shard lock
//! - `reset_time` is a best-effort hint: when the oldest retained request
//!   leaves the window, not a guaranteed deadline
//! - Rejection never waits; callers back off using `retry_after`

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{ErrorContext, ServiceError};
use crate::observability::metrics;
use crate::security::keys::{KeyStrategy, RequestIdentity};

/// Limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterSettings {
    /// Trailing window length in milliseconds.
    pub window_ms: u64,

    /// Requests admitted per key within the window.
    pub max_requests: u32,

    /// Key derivation.
    pub key: KeyStrategy,

    /// Successful requests give their slot back.
    pub skip_successful: bool,

    /// Failed requests give their slot back.
    pub skip_failed: bool,
}

impl LimiterSettings {
    pub fn new(window_ms: u64, max_requests: u32, key: KeyStrategy) -> Self {
        Self {
            window_ms,
            max_requests,
            key,
            skip_successful: false,
            skip_failed: false,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self::new(60_000, 60, KeyStrategy::Ip)
    }
}

/// Admission decision for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: DateTime<Utc>,
    /// Whole seconds to wait; set only on rejection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl RateLimitResult {
    /// Classified error for a rejected request.
    pub fn to_error(&self, context: ErrorContext) -> ServiceError {
        ServiceError::rate_limit_exceeded(
            context.with_metadata("remaining", self.remaining),
            self.limit,
            self.reset_time,
            self.retry_after.unwrap_or(1),
        )
    }
}

/// Counters for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct LimiterStats {
    pub name: String,
    pub window_ms: u64,
    pub max_requests: u32,
    pub tracked_keys: usize,
    pub allowed: u64,
    pub rejected: u64,
}

#[derive(Debug)]
struct WindowEntry {
    hits: VecDeque<Instant>,
    reset_at: Instant,
}

impl WindowEntry {
    fn prune(&mut self, now: Instant, window: Duration) {
        let Some(cutoff) = now.checked_sub(window) else {
            return;
        };
        while self.hits.front().is_some_and(|&t| t < cutoff) {
            self.hits.pop_front();
        }
    }
}

/// Per-key sliding-window admission control.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    name: String,
    settings: LimiterSettings,
    entries: DashMap<String, WindowEntry>,
    allowed: AtomicU64,
    rejected: AtomicU64,
}

impl SlidingWindowLimiter {
    pub fn new(name: impl Into<String>, settings: LimiterSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            entries: DashMap::new(),
            allowed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &LimiterSettings {
        &self.settings
    }

    pub fn key_for(&self, identity: &RequestIdentity) -> String {
        self.settings.key.key_for(identity)
    }

    /// Derive the key for `identity` and check it.
    pub fn check(&self, identity: &RequestIdentity) -> RateLimitResult {
        self.check_key(&self.key_for(identity))
    }

    /// Check `key` against the current time.
    pub fn check_key(&self, key: &str) -> RateLimitResult {
        self.check_with(key, Instant::now)
    }

    /// Check `key` as of `now`. Admitted requests are counted immediately.
    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitResult {
        self.check_with(key, move || now)
    }

    /// `clock` is read while the key's entry is locked, so hits for a key
    /// stay in order.
    fn check_with(&self, key: &str, clock: impl FnOnce() -> Instant) -> RateLimitResult {
        let window = self.settings.window();
        let max = self.settings.max_requests;

        let (now, allowed, count, reset_at) = {
            let mut entry = self
                .entries
                .entry(key.to_string())
                .or_insert_with(|| WindowEntry {
                    hits: VecDeque::new(),
                    reset_at: Instant::now() + window,
                });
            let now = clock();
            entry.prune(now, window);

            let allowed = (entry.hits.len() as u64) < u64::from(max);
            if allowed {
                entry.hits.push_back(now);
            }
            let reset_at = entry.hits.front().map_or(now + window, |&oldest| oldest + window);
            entry.reset_at = reset_at;
            (now, allowed, entry.hits.len() as u64, reset_at)
        };

        let until_reset = reset_at.saturating_duration_since(now);
        let retry_after = if allowed {
            self.allowed.fetch_add(1, Ordering::Relaxed);
            None
        } else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(limiter = %self.name, key = %key, "Rate limit exceeded");
            Some(ceil_secs(until_reset).max(1))
        };
        metrics::record_rate_limit(&self.name, allowed);

        RateLimitResult {
            allowed,
            limit: max,
            remaining: u64::from(max).saturating_sub(count) as u32,
            reset_time: wall_clock_after(until_reset),
            retry_after,
        }
    }

    /// Give back the slot of the request that just finished, if the
    /// limiter is configured not to count this kind of outcome.
    pub fn record_outcome(&self, key: &str, success: bool) -> bool {
        let skip = if success {
            self.settings.skip_successful
        } else {
            self.settings.skip_failed
        };
        skip && self.uncount(key)
    }

    /// Remove the most recent timestamp for `key`.
    pub fn uncount(&self, key: &str) -> bool {
        self.entries
            .get_mut(key)
            .map(|mut entry| entry.hits.pop_back().is_some())
            .unwrap_or(false)
    }

    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    /// Prune every key and drop keys with no requests left whose window has
    /// elapsed. Returns the number of keys dropped.
    pub fn cleanup_at(&self, now: Instant) -> usize {
        let window = self.settings.window();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            entry.prune(now, window);
            let stale = entry.hits.is_empty() && now >= entry.reset_at;
            if stale {
                removed += 1;
            }
            !stale
        });
        metrics::record_rate_limit_keys(&self.name, self.entries.len());
        removed
    }

    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            name: self.name.clone(),
            window_ms: self.settings.window_ms,
            max_requests: self.settings.max_requests,
            tracked_keys: self.entries.len(),
            allowed: self.allowed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let millis = d.as_millis() as u64;
    millis.div_ceil(1000)
}

fn wall_clock_after(d: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero())
}
