//! Rate limiter registry and tier presets.
//!
//! # Responsibilities
//! - Build one limiter per subscription tier and per overridden operation
//! - Resolve the limiter for a call: operation override, else tier
//! - Expose every limiter to the sweep task and the admin API
//!
//! # Design Decisions
//! - Anonymous tiers key by IP; authenticated tiers by API key or service name
//! - Config entries replace presets of the same name wholesale

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::RateLimitsConfig;
use crate::security::keys::KeyStrategy;
use crate::security::rate_limit::{LimiterSettings, LimiterStats, SlidingWindowLimiter};

/// Subscription tier of a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Basic,
    Premium,
    /// Service-to-service traffic.
    Service,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Basic, Tier::Premium, Tier::Service];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Basic => "basic",
            Tier::Premium => "premium",
            Tier::Service => "service",
        }
    }

    fn index(self) -> usize {
        match self {
            Tier::Free => 0,
            Tier::Basic => 1,
            Tier::Premium => 2,
            Tier::Service => 3,
        }
    }

    pub fn preset(self) -> LimiterSettings {
        match self {
            Tier::Free => LimiterSettings::new(60_000, 10, KeyStrategy::Ip),
            Tier::Basic => LimiterSettings::new(60_000, 60, KeyStrategy::ApiKey),
            Tier::Premium => LimiterSettings::new(60_000, 300, KeyStrategy::ApiKey),
            Tier::Service => LimiterSettings::new(60_000, 1_000, KeyStrategy::ServiceName),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Built-in per-operation overrides.
pub fn operation_presets() -> Vec<(&'static str, LimiterSettings)> {
    vec![(
        // Multi-step campaign orchestration is expensive downstream.
        "orchestration",
        LimiterSettings::new(300_000, 10, KeyStrategy::UserId),
    )]
}

/// Owns every rate limiter in the process.
#[derive(Debug)]
pub struct RateLimiterRegistry {
    /// Indexed by `Tier::index`.
    tiers: [Arc<SlidingWindowLimiter>; 4],
    operations: HashMap<String, Arc<SlidingWindowLimiter>>,
}

impl RateLimiterRegistry {
    pub fn from_config(config: &RateLimitsConfig) -> Self {
        let tiers = Tier::ALL.map(|tier| {
            let settings = config.tiers.get(&tier).cloned().unwrap_or_else(|| tier.preset());
            Arc::new(SlidingWindowLimiter::new(format!("tier:{}", tier), settings))
        });

        let mut operation_settings: HashMap<String, LimiterSettings> = operation_presets()
            .into_iter()
            .map(|(name, settings)| (name.to_string(), settings))
            .collect();
        operation_settings.extend(config.operations.clone());

        let operations = operation_settings
            .into_iter()
            .map(|(name, settings)| {
                let limiter = SlidingWindowLimiter::new(format!("op:{}", name), settings);
                (name, Arc::new(limiter))
            })
            .collect();

        Self { tiers, operations }
    }

    pub fn for_tier(&self, tier: Tier) -> Arc<SlidingWindowLimiter> {
        self.tiers[tier.index()].clone()
    }

    pub fn for_operation(&self, operation: &str) -> Option<Arc<SlidingWindowLimiter>> {
        self.operations.get(operation).cloned()
    }

    /// Operation override wins over the caller's tier.
    pub fn resolve(&self, operation: Option<&str>, tier: Tier) -> Arc<SlidingWindowLimiter> {
        operation
            .and_then(|op| self.for_operation(op))
            .unwrap_or_else(|| self.for_tier(tier))
    }

    pub fn all(&self) -> Vec<Arc<SlidingWindowLimiter>> {
        self.tiers.iter().chain(self.operations.values()).cloned().collect()
    }

    /// Stats for all limiters, sorted by name.
    pub fn stats(&self) -> Vec<LimiterStats> {
        let mut stats: Vec<_> = self.all().iter().map(|l| l.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Sweep all limiters. Returns the number of keys dropped.
    pub fn cleanup_all(&self) -> usize {
        self.all().iter().map(|l| l.cleanup()).sum()
    }

    /// Shortest configured window; the sweep runs at this interval.
    pub fn min_window(&self) -> Duration {
        self.all()
            .iter()
            .map(|l| l.settings().window())
            .min()
            .unwrap_or(Duration::from_secs(60))
    }
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::from_config(&RateLimitsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::keys::RequestIdentity;

    #[test]
    fn test_tier_presets() {
        let registry = RateLimiterRegistry::default();
        let expected = [(Tier::Free, 10), (Tier::Basic, 60), (Tier::Premium, 300), (Tier::Service, 1_000)];
        for (tier, max) in expected {
            let settings = registry.for_tier(tier).settings().clone();
            assert_eq!(settings.window_ms, 60_000);
            assert_eq!(settings.max_requests, max);
        }
    }

    #[test]
    fn test_tier_key_derivation() {
        let registry = RateLimiterRegistry::default();
        let identity = RequestIdentity::from_ip("192.0.2.1".parse().unwrap())
            .with_api_key("abc")
            .with_service_name("scoring");

        assert_eq!(registry.for_tier(Tier::Free).key_for(&identity), "ip:192.0.2.1");
        assert_eq!(registry.for_tier(Tier::Premium).key_for(&identity), "key:abc");
        assert_eq!(registry.for_tier(Tier::Service).key_for(&identity), "service:scoring");
    }

    #[test]
    fn test_operation_override_takes_precedence() {
        let registry = RateLimiterRegistry::default();
        let limiter = registry.resolve(Some("orchestration"), Tier::Premium);
        assert_eq!(limiter.name(), "op:orchestration");
        assert_eq!(limiter.settings().window_ms, 300_000);
        assert_eq!(limiter.settings().max_requests, 10);

        assert_eq!(registry.resolve(Some("unknown"), Tier::Basic).name(), "tier:basic");
        assert_eq!(registry.resolve(None, Tier::Free).name(), "tier:free");
    }

    #[test]
    fn test_config_overrides_presets() {
        let mut config = RateLimitsConfig::default();
        config.tiers.insert(Tier::Free, LimiterSettings::new(10_000, 3, KeyStrategy::Ip));
        config
            .operations
            .insert("export".into(), LimiterSettings::new(5_000, 1, KeyStrategy::UserId));
        let registry = RateLimiterRegistry::from_config(&config);

        assert_eq!(registry.for_tier(Tier::Free).settings().max_requests, 3);
        assert!(registry.for_operation("export").is_some());
        assert!(registry.for_operation("orchestration").is_some());
        assert_eq!(registry.min_window(), Duration::from_millis(5_000));
        assert_eq!(registry.stats().len(), 6);
    }
}
