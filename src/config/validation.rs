//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: ResilienceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ResilienceConfig;
use crate::resilience::circuit_breaker::BreakerConfig;
use crate::security::rate_limit::LimiterSettings;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("breaker '{name}': {reason}")]
    Breaker { name: String, reason: &'static str },

    #[error("rate limiter '{name}': {reason}")]
    Limiter { name: String, reason: &'static str },

    #[error("{field}: '{value}' is not a valid socket address")]
    Address { field: &'static str, value: String },

    #[error("observability.log_level: unknown level '{0}'")]
    LogLevel(String),

    #[error("admin.api_key must not be empty when the admin API is enabled")]
    EmptyApiKey,
}

pub fn validate_config(config: &ResilienceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.observability.log_level.to_lowercase().as_str()) {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }
    if config.observability.metrics_enabled {
        check_address(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::EmptyApiKey);
        }
    }

    check_breaker(&mut errors, "default", &config.breakers.default);
    let mut dependencies: Vec<_> = config.breakers.dependencies.iter().collect();
    dependencies.sort_by(|a, b| a.0.cmp(b.0));
    for (name, breaker) in dependencies {
        check_breaker(&mut errors, name, breaker);
    }

    let mut tiers: Vec<_> = config.rate_limits.tiers.iter().collect();
    tiers.sort_by_key(|(tier, _)| tier.as_str());
    for (tier, limiter) in tiers {
        check_limiter(&mut errors, tier.as_str(), limiter);
    }
    let mut operations: Vec<_> = config.rate_limits.operations.iter().collect();
    operations.sort_by(|a, b| a.0.cmp(b.0));
    for (name, limiter) in operations {
        check_limiter(&mut errors, name, limiter);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::Address {
            field,
            value: value.to_string(),
        });
    }
}

fn check_breaker(errors: &mut Vec<ValidationError>, name: &str, config: &BreakerConfig) {
    let mut fail = |reason| {
        errors.push(ValidationError::Breaker {
            name: name.to_string(),
            reason,
        })
    };
    if config.threshold == 0 {
        fail("threshold must be greater than 0");
    }
    if config.timeout_ms == 0 {
        fail("timeout_ms must be greater than 0");
    }
}

fn check_limiter(errors: &mut Vec<ValidationError>, name: &str, settings: &LimiterSettings) {
    let mut fail = |reason| {
        errors.push(ValidationError::Limiter {
            name: name.to_string(),
            reason,
        })
    };
    if settings.window_ms == 0 {
        fail("window_ms must be greater than 0");
    }
    if settings.max_requests == 0 {
        fail("max_requests must be greater than 0");
    }
}
