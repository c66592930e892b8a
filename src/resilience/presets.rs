//! Breaker presets by operation class.
//!
//! Slow dependencies wait longer before the first probe and trip sooner, so
//! their latency does not cascade into request handling.

use serde::{Deserialize, Serialize};

use crate::resilience::circuit_breaker::{BreakerConfig, TripPolicy};

/// Known dependency classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerPreset {
    /// Generic third-party marketing APIs.
    ExternalApi,
    /// Model-backed services (content generation, scoring).
    AiService,
    Database,
    Personalization,
}

impl BreakerPreset {
    pub const ALL: [BreakerPreset; 4] = [
        BreakerPreset::ExternalApi,
        BreakerPreset::AiService,
        BreakerPreset::Database,
        BreakerPreset::Personalization,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BreakerPreset::ExternalApi => "external_api",
            BreakerPreset::AiService => "ai_service",
            BreakerPreset::Database => "database",
            BreakerPreset::Personalization => "personalization",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn config(self) -> BreakerConfig {
        let (threshold, timeout_ms, reset_timeout_ms) = match self {
            BreakerPreset::ExternalApi => (5, 60_000, 120_000),
            BreakerPreset::AiService => (3, 180_000, 300_000),
            BreakerPreset::Database => (5, 30_000, 60_000),
            BreakerPreset::Personalization => (3, 60_000, 120_000),
        };
        BreakerConfig {
            threshold,
            timeout_ms,
            reset_timeout_ms,
            monitoring_period_ms: 60_000,
            trip_on: TripPolicy::Severe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ai_trips_sooner_and_waits_longer() {
        let ai = BreakerPreset::AiService.config();
        let api = BreakerPreset::ExternalApi.config();
        assert_eq!((ai.threshold, ai.timeout_ms), (3, 180_000));
        assert_eq!((api.threshold, api.timeout_ms), (5, 60_000));
    }

    #[test]
    fn test_lookup_by_name() {
        for preset in BreakerPreset::ALL {
            assert_eq!(BreakerPreset::from_name(preset.name()), Some(preset));
        }
        assert_eq!(BreakerPreset::from_name("mainframe"), None);
    }
}
