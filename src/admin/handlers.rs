use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::http::server::AppState;
use crate::resilience::circuit_breaker::BreakerStats;
use crate::resilience::registry::HealthSummary;
use crate::security::rate_limit::LimiterStats;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub breakers: BreakerCounts,
    pub limiters: usize,
}

#[derive(Serialize)]
pub struct BreakerCounts {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub failed: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let summary = state.resilience.breakers.health_summary();
    let status = if summary.failed > 0 {
        "degraded"
    } else {
        "operational"
    };

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status,
        uptime_secs: state.started_at.elapsed().as_secs(),
        breakers: BreakerCounts {
            total: summary.total,
            healthy: summary.healthy,
            degraded: summary.degraded,
            failed: summary.failed,
        },
        limiters: state.resilience.limiters.all().len(),
    })
}

pub async fn list_breakers(State(state): State<AppState>) -> Json<HealthSummary> {
    Json(state.resilience.breakers.health_summary())
}

pub async fn get_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerStats>, Response> {
    match state.resilience.breakers.find(&name) {
        Some(breaker) => Ok(Json(breaker.stats())),
        None => Err(unknown_breaker(&name)),
    }
}

pub async fn open_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerStats>, Response> {
    let breaker = state
        .resilience
        .breakers
        .find(&name)
        .ok_or_else(|| unknown_breaker(&name))?;
    breaker.force_open();
    tracing::warn!(dependency = %name, "Circuit breaker opened via admin API");
    Ok(Json(breaker.stats()))
}

pub async fn close_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerStats>, Response> {
    let breaker = state
        .resilience
        .breakers
        .find(&name)
        .ok_or_else(|| unknown_breaker(&name))?;
    breaker.force_closed();
    tracing::info!(dependency = %name, "Circuit breaker closed via admin API");
    Ok(Json(breaker.stats()))
}

pub async fn reset_breakers(State(state): State<AppState>) -> Json<HealthSummary> {
    state.resilience.breakers.reset_all();
    Json(state.resilience.breakers.health_summary())
}

pub async fn list_limiters(State(state): State<AppState>) -> Json<Vec<LimiterStats>> {
    Json(state.resilience.limiters.stats())
}

fn unknown_breaker(name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("No circuit breaker named '{}'", name) })),
    )
        .into_response()
}
