//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::resilience::circuit_breaker::BreakerConfig;
use crate::security::rate_limit::LimiterSettings;
use crate::security::tiers::Tier;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Admin API.
    pub admin: AdminConfig,

    /// Circuit breaker defaults and per-dependency overrides.
    pub breakers: BreakersConfig,

    /// Rate limiter tiers and per-operation overrides.
    pub rate_limits: RateLimitsConfig,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Prometheus endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Serve the admin API.
    pub enabled: bool,

    /// Bind address.
    pub bind_address: String,

    /// Bearer token required on every admin request.
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8081".to_string(),
            // WARNING: placeholder, override in every deployment.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BreakersConfig {
    /// Used for dependencies with neither an entry below nor a preset.
    pub default: BreakerConfig,

    /// Per-dependency configuration, keyed by dependency name.
    pub dependencies: HashMap<String, BreakerConfig>,
}

/// Rate limiting configuration. Entries replace built-in presets.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RateLimitsConfig {
    pub tiers: HashMap<Tier, LimiterSettings>,
    pub operations: HashMap<String, LimiterSettings>,
}
