//! Resilience layer host process.
//!
//! Builds the breaker and limiter registries from configuration, keeps
//! limiter memory bounded and serves the admin API until Ctrl+C.

use std::path::PathBuf;

use tokio::net::TcpListener;

use resilience_layer::config::loader::load_config;
use resilience_layer::config::ResilienceConfig;
use resilience_layer::http::{AdminServer, AppState};
use resilience_layer::lifecycle::{LimiterSweeper, Shutdown};
use resilience_layer::observability::{logging, metrics};
use resilience_layer::resilience::ResilienceContext;

const CONFIG_ENV: &str = "RESILIENCE_CONFIG";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => ResilienceConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?config_path,
        "resilience-layer starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let context = ResilienceContext::from_config(&config);
    tracing::info!(
        breaker_overrides = config.breakers.dependencies.len(),
        limiters = context.limiters.all().len(),
        "Registries initialized"
    );

    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    let sweeper = LimiterSweeper::new(context.limiters.clone());
    tasks.push(tokio::spawn(sweeper.run(shutdown.subscribe())));

    let mut transitions = context.breakers.subscribe();
    let mut stop_events = shutdown.subscribe();
    tasks.push(tokio::spawn(async move {
        loop {
            tokio::select! {
                event = transitions.recv() => match event {
                    Ok(t) => tracing::debug!(dependency = %t.dependency, from = %t.old_state, to = %t.new_state, "Breaker transition observed"),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => tracing::warn!(skipped = n, "Breaker event subscriber lagged"),
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
                _ = stop_events.recv() => break,
            }
        }
    }));

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let server = AdminServer::new(AppState::new(context.clone(), config.admin.clone()));
        let server_shutdown = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = server.run(listener, server_shutdown).await {
                tracing::error!(error = %e, "Admin server failed");
            }
        }));
    } else {
        tracing::info!("Admin API disabled");
    }

    shutdown.trigger_on_ctrl_c().await;
    for task in tasks {
        let _ = task.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
