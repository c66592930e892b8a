//! Process-wide circuit breaker registry.
//!
//! # Responsibilities
//! - Create exactly one breaker per dependency name, lazily
//! - Resolve configuration: config file entry, then named preset, then default
//! - Fan out state transitions to subscribers
//! - Summarize health for the admin API
//!
//! # Design Decisions
//! - First writer wins: a config passed after creation is ignored
//! - Passed around by `Arc`, never a global

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::BreakersConfig;
use crate::resilience::circuit_breaker::{
    BreakerConfig, BreakerStats, BreakerTransition, CircuitBreaker, CircuitState,
};
use crate::resilience::presets::BreakerPreset;

const EVENT_CAPACITY: usize = 256;

/// Health of one breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerHealth {
    pub name: String,
    pub state: CircuitState,
    pub failure_rate: f64,
    pub healthy: bool,
}

/// Aggregate breaker health.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub failed: usize,
    pub breakers: Vec<BreakerHealth>,
}

/// Owns every circuit breaker in the process.
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    defaults: BreakerConfig,
    dependencies: HashMap<String, BreakerConfig>,
    events: broadcast::Sender<BreakerTransition>,
}

impl CircuitBreakerRegistry {
    pub fn new(defaults: BreakerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            breakers: DashMap::new(),
            defaults,
            dependencies: HashMap::new(),
            events,
        }
    }

    pub fn from_config(config: &BreakersConfig) -> Self {
        let mut registry = Self::new(config.default.clone());
        registry.dependencies = config.dependencies.clone();
        registry
    }

    /// Get the breaker for `name`, creating it on first use.
    ///
    /// `config` only applies when this call creates the breaker.
    pub fn get_breaker(&self, name: &str, config: Option<BreakerConfig>) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            if config.is_some() {
                tracing::debug!(dependency = %name, "Breaker already exists, ignoring supplied config");
            }
            return existing.value().clone();
        }

        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let config = config.unwrap_or_else(|| self.config_for(name));
                tracing::debug!(dependency = %name, threshold = config.threshold, timeout_ms = config.timeout_ms, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(name, config).with_events(self.events.clone()))
            })
            .value()
            .clone()
    }

    /// Shorthand for [`get_breaker`](Self::get_breaker) with resolved config.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_breaker(name, None)
    }

    /// Look up without creating.
    pub fn find(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|r| r.value().clone())
    }

    /// Drop a breaker. The next lookup creates a fresh one.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.breakers.remove(name).is_some();
        if removed {
            tracing::info!(dependency = %name, "Circuit breaker removed");
        }
        removed
    }

    /// Receive every state transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BreakerTransition> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Stats for all breakers, sorted by name.
    pub fn all_stats(&self) -> Vec<BreakerStats> {
        let mut stats: Vec<_> = self.snapshot().iter().map(|b| b.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    pub fn health_summary(&self) -> HealthSummary {
        let mut breakers: Vec<BreakerHealth> = self
            .snapshot()
            .iter()
            .map(|b| {
                let stats = b.stats();
                BreakerHealth {
                    healthy: stats.state == CircuitState::Closed && stats.failure_rate < 50.0,
                    name: stats.name,
                    state: stats.state,
                    failure_rate: stats.failure_rate,
                }
            })
            .collect();
        breakers.sort_by(|a, b| a.name.cmp(&b.name));

        let healthy = breakers.iter().filter(|b| b.healthy).count();
        let failed = breakers.iter().filter(|b| b.state == CircuitState::Open).count();
        HealthSummary {
            total: breakers.len(),
            healthy,
            degraded: breakers.len() - healthy - failed,
            failed,
            breakers,
        }
    }

    /// Force every breaker closed.
    pub fn reset_all(&self) {
        let breakers = self.snapshot();
        for breaker in &breakers {
            breaker.force_closed();
        }
        tracing::info!(count = breakers.len(), "All circuit breakers reset");
    }

    fn config_for(&self, name: &str) -> BreakerConfig {
        self.dependencies
            .get(name)
            .cloned()
            .or_else(|| BreakerPreset::from_name(name).map(BreakerPreset::config))
            .unwrap_or_else(|| self.defaults.clone())
    }

    // Clone out the Arcs so no shard lock is held while breakers lock.
    fn snapshot(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers.iter().map(|r| r.value().clone()).collect()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
