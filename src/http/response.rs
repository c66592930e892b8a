//! Error to HTTP response mapping.
//!
//! # Responsibilities
//! - Pick a status code from the error category
//! - Serialize the error record as the JSON body
//! - Surface back-off hints as `Retry-After`
//!
//! # Design Decisions
//! - Upstream API failures answer 502, database failures 503
//! - An open breaker answers 503 with the time until the next probe

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::{codes, ErrorCategory, ServiceError};
use crate::resilience::circuit_breaker::CallError;

/// HTTP status for an error category.
pub fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::RateLimiting => StatusCode::TOO_MANY_REQUESTS,
        ErrorCategory::Authentication => StatusCode::UNAUTHORIZED,
        ErrorCategory::Validation => StatusCode::BAD_REQUEST,
        ErrorCategory::Api => StatusCode::BAD_GATEWAY,
        ErrorCategory::Database => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCategory::System => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = status_for(self.category());
        let retry_after = self.retry_after();
        let mut response = (status, Json(json!({ "error": self.to_json() }))).into_response();
        if let Some(retry_after) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after.as_secs()));
        }
        response
    }
}

impl IntoResponse for CallError<ServiceError> {
    fn into_response(self) -> Response {
        match self {
            CallError::Open {
                dependency,
                retry_after,
            } => {
                let secs = retry_after.as_millis().div_ceil(1000).max(1) as u64;
                let body = json!({
                    "error": {
                        "code": codes::CIRCUIT_OPEN,
                        "message": format!("Circuit breaker open for '{}'", dependency),
                        "dependency": dependency,
                        "retry_after": secs,
                    }
                });
                let mut response = (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                response
            }
            CallError::Inner(e) => e.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorContext;
    use chrono::Utc;
    use std::time::Duration;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        let ctx = || ErrorContext::new("op");
        let cases = [
            (ServiceError::auth_failed("bad token", ctx()), StatusCode::UNAUTHORIZED),
            (ServiceError::validation("email", "missing", ctx()), StatusCode::BAD_REQUEST),
            (ServiceError::api("/v1", 500, "boom", ctx()), StatusCode::BAD_GATEWAY),
            (ServiceError::internal("oops", ctx()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_rate_limit_response() {
        let err = ServiceError::rate_limit_exceeded(ErrorContext::new("search"), 10, Utc::now(), 42);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(body["error"]["category"], "rate_limiting");
    }

    #[tokio::test]
    async fn test_open_circuit_response() {
        let err: CallError<ServiceError> = CallError::Open {
            dependency: "ai_service".into(),
            retry_after: Duration::from_millis(1_500),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "CIRCUIT_OPEN");
        assert_eq!(body["error"]["dependency"], "ai_service");
    }
}
