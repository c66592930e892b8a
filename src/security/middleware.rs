//! Rate limiting middleware for axum routers.
//!
//! Every response carries `X-RateLimit-Limit`, `X-RateLimit-Remaining` and
//! `X-RateLimit-Reset` (epoch seconds). Rejections are answered with 429
//! and `Retry-After` without reaching the handler.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::ExtensionRejection, ConnectInfo, State},
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ErrorContext;
use crate::security::keys::RequestIdentity;
use crate::security::rate_limit::{RateLimitResult, SlidingWindowLimiter};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Enforce `limiter` on every request passing through the router.
///
/// Install with `axum::middleware::from_fn_with_state(limiter, rate_limit_middleware)`.
/// The client IP comes from `ConnectInfo` when the server provides it.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<SlidingWindowLimiter>>,
    connect_info: Result<ConnectInfo<SocketAddr>, ExtensionRejection>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = connect_info.ok().map(|ConnectInfo(addr)| addr.ip());
    let identity = RequestIdentity::from_headers(request.headers(), ip);
    let key = limiter.key_for(&identity);
    let result = limiter.check_key(&key);

    if !result.allowed {
        tracing::warn!(
            limiter = %limiter.name(),
            key = %key,
            path = %request.uri().path(),
            retry_after = ?result.retry_after,
            "Request rejected by rate limiter"
        );
        let context = ErrorContext::new(request.uri().path())
            .with_component(limiter.name())
            .with_endpoint(request.uri().path());
        let error = result.to_error(context);
        error.report();
        let mut response = error.into_response();
        apply_headers(response.headers_mut(), &result);
        return response;
    }

    let mut response = next.run(request).await;
    let status = response.status();
    let success = !(status.is_client_error() || status.is_server_error());
    limiter.record_outcome(&key, success);
    apply_headers(response.headers_mut(), &result);
    response
}

/// Write the standard rate limit headers for `result`.
pub fn apply_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(result.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(result.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(result.reset_time.timestamp()));
    if let Some(retry_after) = result.retry_after {
        headers.insert(axum::http::header::RETRY_AFTER, HeaderValue::from(retry_after));
    }
}
