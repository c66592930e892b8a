//! Stable symbolic error codes.
//!
//! Codes are part of the monitoring contract: dashboards and alerts key on
//! them, so existing values must never change.

pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
pub const AUTH_FAILED: &str = "AUTH_FAILED";
pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
pub const API_ERROR: &str = "API_ERROR";
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
pub const CIRCUIT_OPEN: &str = "CIRCUIT_OPEN";
