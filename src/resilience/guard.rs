//! Composed protection for one outbound call.
//!
//! # Data Flow
//! ```text
//! Guard::run(op)
//!     → rate limiter admission (once, optional)
//!     → retry loop (optional)
//!         → circuit breaker execute
//!             → op()
//!     → skip_successful / skip_failed correction
//! ```
//!
//! # Design Decisions
//! - Admission is checked once per logical call, not per retry attempt
//! - An open breaker ends the retry loop immediately
//! - Only high and critical errors count against the breaker, on top of its
//!   trip policy
//! - The final error of a call is reported once, not per attempt
//! - Registries are injected through [`ResilienceContext`], never global

use std::future::Future;
use std::sync::Arc;

use crate::config::ResilienceConfig;
use crate::error::{ErrorContext, ServiceError};
use crate::resilience::circuit_breaker::{CallError, CircuitBreaker};
use crate::resilience::registry::CircuitBreakerRegistry;
use crate::resilience::retries::{retry_with_policy, should_trip_breaker};
use crate::security::keys::RequestIdentity;
use crate::security::rate_limit::SlidingWindowLimiter;
use crate::security::tiers::{RateLimiterRegistry, Tier};

/// Both registries, shared by every component that makes protected calls.
#[derive(Clone)]
pub struct ResilienceContext {
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub limiters: Arc<RateLimiterRegistry>,
}

impl ResilienceContext {
    pub fn new(breakers: Arc<CircuitBreakerRegistry>, limiters: Arc<RateLimiterRegistry>) -> Self {
        Self { breakers, limiters }
    }

    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self::new(
            Arc::new(CircuitBreakerRegistry::from_config(&config.breakers)),
            Arc::new(RateLimiterRegistry::from_config(&config.rate_limits)),
        )
    }

    /// Breaker plus retries for `dependency`, no admission control.
    pub fn guard(&self, dependency: &str) -> Guard {
        Guard::new(self.breakers.get(dependency))
    }

    /// Like [`guard`](Self::guard), also admitting the caller through the
    /// limiter for `operation` or, failing that, the caller's tier.
    pub fn guard_for(
        &self,
        dependency: &str,
        operation: Option<&str>,
        tier: Tier,
        identity: &RequestIdentity,
    ) -> Guard {
        let limiter = self.limiters.resolve(operation, tier);
        let key = limiter.key_for(identity);
        let guard = self.guard(dependency).rate_limited(limiter, key);
        match operation {
            Some(operation) => guard.named(operation),
            None => guard,
        }
    }
}

impl Default for ResilienceContext {
    fn default() -> Self {
        Self::from_config(&ResilienceConfig::default())
    }
}

/// A configured breaker, limiter and retry combination.
#[derive(Debug, Clone)]
pub struct Guard {
    operation: String,
    breaker: Arc<CircuitBreaker>,
    admission: Option<(Arc<SlidingWindowLimiter>, String)>,
    retry: bool,
}

impl Guard {
    /// Retries enabled, no admission control. Logs under the breaker name.
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            operation: breaker.name().to_string(),
            breaker,
            admission: None,
            retry: true,
        }
    }

    /// Admit each call through `limiter` under `key`.
    pub fn rate_limited(mut self, limiter: Arc<SlidingWindowLimiter>, key: impl Into<String>) -> Self {
        self.admission = Some((limiter, key.into()));
        self
    }

    pub fn without_retries(mut self) -> Self {
        self.retry = false;
        self
    }

    /// Operation name used in logs and error context.
    pub fn named(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Run `op` under every configured protection.
    ///
    /// `op` is invoked once per attempt. A rate limit rejection surfaces as
    /// `CallError::Inner` with a rate limiting error and never reaches `op`.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, CallError<ServiceError>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        if let Some((limiter, key)) = &self.admission {
            let result = limiter.check_key(key);
            if !result.allowed {
                let context = ErrorContext::new(self.operation.as_str())
                    .with_component(limiter.name())
                    .with_metadata("dependency", self.breaker.name());
                let error = result.to_error(context);
                error.report();
                return Err(CallError::Inner(error));
            }
        }

        let trips = |e: &ServiceError| {
            should_trip_breaker(e.severity()) && self.breaker.config().trip_on.is_tripping(e)
        };
        let outcome = if self.retry {
            retry_with_policy(&self.operation, || self.breaker.execute_with(&op, trips)).await
        } else {
            self.breaker.execute_with(&op, trips).await
        };

        if let Some((limiter, key)) = &self.admission {
            limiter.record_outcome(key, outcome.is_ok());
        }
        if let Err(CallError::Inner(error)) = &outcome {
            error.report();
        }
        outcome
    }
}
