//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks)
//!     → ResilienceConfig (validated, immutable)
//!     → registries built once at startup, shared via Arc
//! ```
//!
//! # Design Decisions
//! - All fields have defaults so an empty file is a valid config
//! - Validation separates syntactic (serde) from semantic checks
//! - Breaker and limiter sections reuse the runtime config types directly

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::{
    AdminConfig, BreakersConfig, ObservabilityConfig, RateLimitsConfig, ResilienceConfig,
};
