//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build registries → Spawn sweeper → Serve admin
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C → broadcast → sweeper exits, admin server drains → Exit
//! ```
//!
//! # Design Decisions
//! - Every background task takes a shutdown receiver; nothing is detached
//! - Limiter memory is bounded by the sweeper, not by request traffic

pub mod shutdown;
pub mod sweeper;

pub use shutdown::Shutdown;
pub use sweeper::LimiterSweeper;
