//! Tower middleware wrapping a service in a shared circuit breaker.
//!
//! The breaker is an `Arc` taken from the registry, so every clone of the
//! service, and every service built from the same layer, shares one state
//! machine per dependency.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use tower::{Layer, Service};

use crate::resilience::circuit_breaker::{CallError, CircuitBreaker};

#[derive(Debug, Clone)]
pub struct CircuitBreakerLayer {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerLayer {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }
}

impl<S> Layer<S> for CircuitBreakerLayer {
    type Service = CircuitBreakerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CircuitBreakerService {
            inner,
            breaker: self.breaker.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerService<S> {
    inner: S,
    breaker: Arc<CircuitBreaker>,
}

impl<S, Req> Service<Req> for CircuitBreakerService<S>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send,
    S::Response: Send + 'static,
    S::Error: std::error::Error + Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = CallError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(CallError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        // The readied service moves into the future; a fresh clone stays behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let breaker = self.breaker.clone();
        Box::pin(async move { breaker.execute(move || inner.call(req)).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorContext, ServiceError};
    use crate::resilience::circuit_breaker::{BreakerConfig, CircuitState};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tower::{service_fn, ServiceExt};

    #[tokio::test(start_paused = true)]
    async fn test_layer_opens_and_short_circuits() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let upstream = service_fn(move |id: u32| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(ServiceError::database(
                    &std::io::Error::other("connection reset"),
                    ErrorContext::new("load_lead").with_metadata("id", id),
                ))
            }
        });
        let config = BreakerConfig {
            threshold: 2,
            timeout_ms: 1_000,
            ..BreakerConfig::default()
        };
        let breaker = Arc::new(CircuitBreaker::new("database", config));
        let svc = CircuitBreakerLayer::new(breaker.clone()).layer(upstream);

        for id in 0..2 {
            let err = svc.clone().oneshot(id).await.unwrap_err();
            assert!(!err.is_open());
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = svc.clone().oneshot(3).await.unwrap_err();
        assert!(matches!(err, CallError::Open { ref dependency, .. } if dependency == "database"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::advance(std::time::Duration::from_millis(1_001)).await;
        let err = svc.oneshot(4).await.unwrap_err();
        assert!(!err.is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_layer_passes_successes_through() {
        let breaker = Arc::new(CircuitBreaker::new("echo", BreakerConfig::default()));
        let svc = CircuitBreakerLayer::new(breaker.clone())
            .layer(service_fn(|n: u32| async move { Ok::<_, ServiceError>(n * 2) }));

        assert_eq!(svc.oneshot(21).await.unwrap(), 42);
        assert_eq!(breaker.stats().success_count, 1);
    }
}
