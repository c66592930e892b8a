//! Admin HTTP server.
//!
//! # Responsibilities
//! - Hold the state shared by admin handlers
//! - Serve the admin router on a listener
//! - Stop accepting and drain on the shutdown signal

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::admin;
use crate::config::AdminConfig;
use crate::resilience::guard::ResilienceContext;

/// Application state injected into admin handlers.
#[derive(Clone)]
pub struct AppState {
    pub resilience: ResilienceContext,
    pub admin: Arc<AdminConfig>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(resilience: ResilienceContext, admin: AdminConfig) -> Self {
        Self {
            resilience,
            admin: Arc::new(admin),
            started_at: Instant::now(),
        }
    }
}

/// HTTP server exposing the admin API.
pub struct AdminServer {
    router: Router,
}

impl AdminServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: admin::router(state),
        }
    }

    /// Serve until `shutdown` fires, then finish in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Admin server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("Admin server stopped");
        Ok(())
    }
}
