use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::{ErrorContext, ServiceError};
use crate::http::server::AppState;

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let reason = match token {
        Some(token) if token == state.admin.api_key => None,
        Some(_) => Some("invalid admin token"),
        None => Some("missing bearer token"),
    };

    match reason {
        None => next.run(request).await,
        Some(reason) => reject(&request, reason),
    }
}

fn reject(request: &Request<Body>, reason: &str) -> Response {
    let context = ErrorContext::new("admin")
        .with_component("admin_auth")
        .with_endpoint(request.uri().path());
    let error = ServiceError::auth_failed(reason, context);
    error.report();
    error.into_response()
}
