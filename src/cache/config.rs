//! Cache configuration.
//!
//! Controls the fast (process-local) and durable (database) render tiers via `vellum.toml`.

use std::{num::NonZeroUsize, time::Duration};

use serde::Deserialize;

const DEFAULT_FAST_TIER_CAPACITY: usize = 1024;
const DEFAULT_FAST_TIER_TTL_SECS: u64 = 300;
const DEFAULT_DURABLE_TIER_TTL_SECS: u64 = 86_400;

/// Longest accepted entry lifetime (ten years); larger values are clamped.
pub const MAX_TTL_SECS: u64 = 10 * 365 * 86_400;

/// Render cache configuration from `vellum.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the process-local tier.
    pub enable_fast_tier: bool,
    /// Enable the database-backed tier.
    pub enable_durable_tier: bool,
    /// Maximum entries held by the fast tier.
    pub fast_tier_capacity: usize,
    /// Lifetime of a fast-tier entry in seconds.
    pub fast_tier_ttl_seconds: u64,
    /// Lifetime of a durable-tier entry in seconds.
    pub durable_tier_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_fast_tier: true,
            enable_durable_tier: true,
            fast_tier_capacity: DEFAULT_FAST_TIER_CAPACITY,
            fast_tier_ttl_seconds: DEFAULT_FAST_TIER_TTL_SECS,
            durable_tier_ttl_seconds: DEFAULT_DURABLE_TIER_TTL_SECS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enable_fast_tier: settings.enable_fast_tier,
            enable_durable_tier: settings.enable_durable_tier,
            fast_tier_capacity: settings.fast_tier_capacity.get(),
            fast_tier_ttl_seconds: settings.fast_tier_ttl.as_secs(),
            durable_tier_ttl_seconds: settings.durable_tier_ttl.as_secs(),
        }
    }
}

impl CacheConfig {
    /// Returns true if any tier is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enable_fast_tier || self.enable_durable_tier
    }

    /// Returns the fast tier capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn fast_tier_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.fast_tier_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn fast_tier_ttl(&self) -> Duration {
        Duration::from_secs(self.fast_tier_ttl_seconds.min(MAX_TTL_SECS))
    }

    pub fn durable_tier_ttl(&self) -> Duration {
        Duration::from_secs(self.durable_tier_ttl_seconds.min(MAX_TTL_SECS))
    }
}
