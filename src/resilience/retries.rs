//! Retry policy.
//!
//! # Responsibilities
//! - Map an error category to a retry decision
//! - Decide whether a severity should count against a circuit breaker
//! - Run an operation under its retry decision with a fixed delay
//!
//! # Design Decisions
//! - Authentication, validation and quota failures are never retried
//! - Transient infrastructure failures get a bounded number of attempts
//! - A breaker-open rejection is never retried here; the caller decides
//! - Sleeping happens only in the executor, never in breaker or limiter

use std::future::Future;
use std::time::Duration;

use serde::Serialize;

use crate::error::{ErrorCategory, ServiceError, Severity};
use crate::resilience::circuit_breaker::CallError;

/// What to do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryDecision {
    pub should_retry: bool,
    pub delay_ms: u64,
    /// Total attempts, including the first one.
    pub max_attempts: u32,
}

impl RetryDecision {
    pub const NEVER: RetryDecision = RetryDecision {
        should_retry: false,
        delay_ms: 0,
        max_attempts: 1,
    };

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Fixed policy table by category.
pub fn retry_decision(category: ErrorCategory) -> RetryDecision {
    match category {
        ErrorCategory::RateLimiting | ErrorCategory::Authentication | ErrorCategory::Validation => {
            RetryDecision::NEVER
        }
        ErrorCategory::Database => RetryDecision {
            should_retry: true,
            delay_ms: 1_000,
            max_attempts: 3,
        },
        ErrorCategory::Api => RetryDecision {
            should_retry: true,
            delay_ms: 2_000,
            max_attempts: 3,
        },
        ErrorCategory::System => RetryDecision {
            should_retry: true,
            delay_ms: 1_000,
            max_attempts: 2,
        },
    }
}

/// High and critical failures count against a breaker.
pub fn should_trip_breaker(severity: Severity) -> bool {
    matches!(severity, Severity::High | Severity::Critical)
}

/// Errors that carry their own retry decision.
pub trait Retryable {
    fn retry_decision(&self) -> RetryDecision;
}

impl Retryable for ServiceError {
    fn retry_decision(&self) -> RetryDecision {
        retry_decision(self.category())
    }
}

impl<E: Retryable> Retryable for CallError<E> {
    fn retry_decision(&self) -> RetryDecision {
        match self {
            CallError::Open { .. } => RetryDecision::NEVER,
            CallError::Inner(e) => e.retry_decision(),
        }
    }
}

/// Run `attempt` until it succeeds or its error's policy says stop.
pub async fn retry_with_policy<T, E, F, Fut>(operation: &str, mut attempt: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let decision = e.retry_decision();
                if !decision.should_retry || attempts >= decision.max_attempts {
                    if attempts > 1 {
                        tracing::warn!(operation, attempts, error = %e, "Giving up after retries");
                    }
                    return Err(e);
                }
                tracing::info!(
                    operation,
                    attempt = attempts,
                    max_attempts = decision.max_attempts,
                    delay_ms = decision.delay_ms,
                    error = %e,
                    "Retrying operation"
                );
                tokio::time::sleep(decision.delay()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorContext;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_policy_table() {
        for category in [ErrorCategory::RateLimiting, ErrorCategory::Authentication, ErrorCategory::Validation] {
            assert_eq!(retry_decision(category), RetryDecision::NEVER);
        }
        assert_eq!(
            retry_decision(ErrorCategory::Database),
            RetryDecision { should_retry: true, delay_ms: 1_000, max_attempts: 3 }
        );
        assert_eq!(
            retry_decision(ErrorCategory::Api),
            RetryDecision { should_retry: true, delay_ms: 2_000, max_attempts: 3 }
        );
        assert_eq!(
            retry_decision(ErrorCategory::System),
            RetryDecision { should_retry: true, delay_ms: 1_000, max_attempts: 2 }
        );
    }

    #[test]
    fn test_trip_predicate() {
        assert!(!should_trip_breaker(Severity::Low));
        assert!(!should_trip_breaker(Severity::Medium));
        assert!(should_trip_breaker(Severity::High));
        assert!(should_trip_breaker(Severity::Critical));
    }

    #[test]
    fn test_open_rejection_is_never_retried() {
        let err: CallError<ServiceError> = CallError::Open {
            dependency: "db".into(),
            retry_after: Duration::from_secs(5),
        };
        assert_eq!(err.retry_decision(), RetryDecision::NEVER);
    }

    #[tokio::test(start_paused = true)]
    async fn test_database_errors_retry_with_fixed_delay() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = retry_with_policy("load_profile", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
                Err(ServiceError::database(&io, ErrorContext::new("load_profile")))
            } else {
                Ok("profile")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "profile");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_api_errors_stop_at_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_policy("sync_leads", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::api("/leads", 502, "bad gateway", ErrorContext::new("sync_leads")))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_errors_surface_immediately() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let result: Result<(), _> = retry_with_policy("submit_form", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::validation("email", "missing", ErrorContext::new("submit_form")))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
