//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call:
//!     → guard.rs (admission, then retry loop)
//!     → retries.rs (category decides retry, delay and attempt budget)
//!     → circuit_breaker.rs (fail fast while open, probe when the timeout lapses)
//!     → registry.rs (one shared breaker per dependency, preset or configured)
//! ```
//!
//! # Design Decisions
//! - Breakers are shared per dependency name, never per caller
//! - Retries never wrap an open breaker rejection
//! - The tower layer and the guard share the same breaker instances

pub mod circuit_breaker;
pub mod guard;
pub mod layer;
pub mod presets;
pub mod registry;
pub mod retries;

pub use circuit_breaker::{BreakerConfig, CallError, CircuitBreaker, CircuitState, TripPolicy};
pub use guard::{Guard, ResilienceContext};
pub use layer::CircuitBreakerLayer;
pub use registry::CircuitBreakerRegistry;
pub use retries::{retry_decision, retry_with_policy, should_trip_breaker, RetryDecision};
