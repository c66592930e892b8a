//! Resilience layer for services that call flaky dependencies.
//!
//! # Architecture Overview
//!
//! ```text
//!     Caller                       ┌──────────────────────────────────────────────┐
//!     ─────────────────────────────┼─▶ security          resilience               │
//!                                  │   rate limiter ──▶ retry loop ──▶ breaker ───┼──▶ Dependency
//!                                  │   (per key)        (by category) (per dep)   │
//!     ◀────────────────────────────┼── ServiceError / CallError ◀─────────────────┼───
//!                                  │                                              │
//!                                  │   ┌──────────────────────────────────────┐   │
//!                                  │   │        Cross-Cutting Concerns        │   │
//!                                  │   │ error taxonomy · config · logging    │   │
//!                                  │   │ metrics · admin API · lifecycle      │   │
//!                                  │   └──────────────────────────────────────┘   │
//!                                  └──────────────────────────────────────────────┘
//! ```

// Core
pub mod error;
pub mod resilience;
pub mod security;

// Surfaces
pub mod admin;
pub mod http;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::ResilienceConfig;
pub use error::{ErrorCategory, ErrorContext, ServiceError, ServiceResult, Severity};
pub use lifecycle::Shutdown;
pub use resilience::{CallError, CircuitBreaker, CircuitBreakerRegistry, Guard, ResilienceContext};
pub use security::{RateLimiterRegistry, SlidingWindowLimiter, Tier};
