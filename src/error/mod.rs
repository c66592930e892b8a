//! Error taxonomy.
//!
//! # Data Flow
//! ```text
//! Failure site:
//!     → taxonomy.rs (ServiceError with category, severity, context)
//!     → propagated up with `?`
//!     → resilience::retries (retry decision by category)
//!     → resilience::circuit_breaker (trip decision by severity)
//!     → report() (structured log event + error counter)
//! ```
//!
//! # Design Decisions
//! - Category and severity are fixed at construction; context only grows
//! - Codes are stable strings so log queries survive message rewording
//! - Serialization goes through serde so monitoring sinks get the same record

pub mod codes;
pub mod taxonomy;

pub use taxonomy::{ErrorCategory, ErrorContext, ServiceError, Severity};

/// Result alias for operations that fail with a classified error.
pub type ServiceResult<T> = Result<T, ServiceError>;
