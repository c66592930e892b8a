//! HTTP surface.
//!
//! # Data Flow
//! ```text
//! ServiceError / CallError
//!     → response.rs (status code, JSON body, Retry-After)
//!
//! TCP listener
//!     → server.rs (admin router, graceful shutdown)
//!     → crate::admin (auth, handlers)
//! ```

pub mod response;
pub mod server;

pub use response::status_for;
pub use server::{AdminServer, AppState};
