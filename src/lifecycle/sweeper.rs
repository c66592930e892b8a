//! Periodic sweep of idle rate limiter keys.
//!
//! # Responsibilities
//! - Drop per-key windows that no longer hold any request
//! - Run at the shortest configured window so no key outlives two windows

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::security::tiers::RateLimiterRegistry;

pub struct LimiterSweeper {
    limiters: Arc<RateLimiterRegistry>,
    interval: Duration,
}

impl LimiterSweeper {
    pub fn new(limiters: Arc<RateLimiterRegistry>) -> Self {
        let interval = limiters.min_window();
        Self { limiters, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Limiter sweeper starting");

        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.limiters.cleanup_all();
                    if removed > 0 {
                        tracing::debug!(removed, "Swept idle rate limiter keys");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Limiter sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
