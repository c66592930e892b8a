//! Metrics collection and exposition.
//!
//! # Metrics
//! - `resilience_breaker_transitions_total` (counter): by dependency, from, to
//! - `resilience_breaker_rejections_total` (counter): fail-fast rejections
//! - `resilience_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `resilience_rate_limit_decisions_total` (counter): by limiter, outcome
//! - `resilience_rate_limit_keys` (gauge): tracked keys after a sweep
//! - `resilience_errors_total` (counter): by category, severity

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{ErrorCategory, Severity};
use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_breaker_transition(dependency: &str, from: CircuitState, to: CircuitState) {
    counter!(
        "resilience_breaker_transitions_total",
        "dependency" => dependency.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    gauge!("resilience_breaker_state", "dependency" => dependency.to_string())
        .set(to.as_gauge());
}

pub fn record_breaker_rejection(dependency: &str) {
    counter!("resilience_breaker_rejections_total", "dependency" => dependency.to_string())
        .increment(1);
}

pub fn record_rate_limit(limiter: &str, allowed: bool) {
    let outcome = if allowed { "allowed" } else { "rejected" };
    counter!(
        "resilience_rate_limit_decisions_total",
        "limiter" => limiter.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_rate_limit_keys(limiter: &str, keys: usize) {
    gauge!("resilience_rate_limit_keys", "limiter" => limiter.to_string()).set(keys as f64);
}

pub fn record_error(category: ErrorCategory, severity: Severity) {
    counter!(
        "resilience_errors_total",
        "category" => category.as_str(),
        "severity" => severity.as_str()
    )
    .increment(1);
}
