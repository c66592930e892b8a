//! Admission control subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming call:
//!     → keys.rs (derive the limiter key from the caller identity)
//!     → tiers.rs (pick the operation or tier limiter)
//!     → rate_limit.rs (sliding-window check)
//!     → middleware.rs (X-RateLimit-* headers, 429 on rejection)
//! ```
//!
//! # Design Decisions
//! - Rejection is immediate; nothing queues behind a full window
//! - Each limiter owns its keyspace; keys never collide across limiters
//! - Outcome-based un-counting happens after the handler finishes

pub mod keys;
pub mod middleware;
pub mod rate_limit;
pub mod tiers;

pub use keys::{KeyStrategy, RequestIdentity};
pub use rate_limit::{LimiterSettings, RateLimitResult, SlidingWindowLimiter};
pub use tiers::{RateLimiterRegistry, Tier};
