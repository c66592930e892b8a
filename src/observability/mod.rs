//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Resilience components produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout via the fmt subscriber
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Emitting never fails the caller; sinks are external
//! - Metric updates go through the `metrics` facade and cost nothing when no
//!   recorder is installed (e.g. in tests)

pub mod logging;
pub mod metrics;
