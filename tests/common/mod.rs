//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use resilience_layer::config::AdminConfig;
use resilience_layer::error::{ErrorContext, ServiceError, ServiceResult};
use resilience_layer::http::{AdminServer, AppState};
use resilience_layer::lifecycle::Shutdown;
use resilience_layer::resilience::ResilienceContext;
use tokio::net::TcpListener;

pub const ADMIN_KEY: &str = "test-admin-key";

/// Scripted outcome of one dependency call.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Ok,
    /// Upstream 503, high severity.
    Unavailable,
    /// Upstream 404, medium severity.
    NotFound,
}

/// A dependency that plays back a script, then keeps succeeding.
#[derive(Clone, Default)]
pub struct FlakyDependency {
    script: Arc<Mutex<VecDeque<Step>>>,
    calls: Arc<AtomicU32>,
}

impl FlakyDependency {
    pub fn new(script: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn call(&self) -> ServiceResult<&'static str> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Ok);
        let context = ErrorContext::new("enrich_lead").with_component("enrichment-api");
        match step {
            Step::Ok => Ok("enriched"),
            Step::Unavailable => Err(ServiceError::api("/v2/enrich", 503, "service unavailable", context)),
            Step::NotFound => Err(ServiceError::api("/v2/enrich", 404, "lead not found", context)),
        }
    }
}

/// Serve the admin API on an ephemeral port.
pub async fn start_admin(context: ResilienceContext) -> (SocketAddr, Shutdown) {
    let admin = AdminConfig {
        enabled: true,
        bind_address: "127.0.0.1:0".into(),
        api_key: ADMIN_KEY.into(),
    };
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = AdminServer::new(AppState::new(context, admin));
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });
    (addr, shutdown)
}
