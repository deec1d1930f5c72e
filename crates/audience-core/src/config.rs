//! Engine configuration
//!
//! Every section deserializes with per-field defaults so a partial TOML file
//! (or none at all) yields a working engine.

use crate::error::{SegmentError, SegmentResult};
use audience_types::IdentifierKind;
use serde::Deserialize;
use std::time::Duration;

/// Backend used for the server-side aggregate cache.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    #[default]
    InMemory,
    Redis,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CachingConfig {
    #[serde(default)]
    pub cache_type: CacheType,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
    /// TTL for stable outcomes of `<`, `<=`, `>=`, `>` rules
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,
    /// TTL for the permanently-false outcome of `=` rules
    #[serde(default = "default_equality_ttl_seconds")]
    pub equality_ttl_seconds: u64,
    /// Upper bound on TTL for rules with a rolling window
    #[serde(default = "default_windowed_ttl_cap_seconds")]
    pub windowed_ttl_cap_seconds: u64,
}

impl Default for CachingConfig {
    fn default() -> Self {
        Self {
            cache_type: CacheType::default(),
            redis_url: None,
            max_capacity: default_max_capacity(),
            default_ttl_seconds: default_ttl_seconds(),
            equality_ttl_seconds: default_equality_ttl_seconds(),
            windowed_ttl_cap_seconds: default_windowed_ttl_cap_seconds(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct RegistryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_refresh_interval_seconds")]
    pub refresh_interval_seconds: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { enabled: true, refresh_interval_seconds: default_refresh_interval_seconds() }
    }
}

impl RegistryConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }
}

/// Longest accepted round-trip max age, one leap year.
pub const MAX_ROUND_TRIP_AGE_MINUTES: i64 = 366 * 24 * 60;

#[derive(Deserialize, Debug, Clone)]
pub struct RoundTripConfig {
    #[serde(default = "default_user_max_age_minutes")]
    pub user_max_age_minutes: i64,
    #[serde(default = "default_browser_max_age_minutes")]
    pub browser_max_age_minutes: i64,
}

impl Default for RoundTripConfig {
    fn default() -> Self {
        Self {
            user_max_age_minutes: default_user_max_age_minutes(),
            browser_max_age_minutes: default_browser_max_age_minutes(),
        }
    }
}

impl RoundTripConfig {
    /// How long a snapshot entry stays trustworthy for the given check mode.
    ///
    /// Clamped to `0..=MAX_ROUND_TRIP_AGE_MINUTES` for configs that skipped
    /// [`EngineConfig::validate`].
    pub fn max_age(&self, kind: IdentifierKind) -> chrono::Duration {
        let minutes = match kind {
            IdentifierKind::User => self.user_max_age_minutes,
            IdentifierKind::Browser => self.browser_max_age_minutes,
        };
        chrono::Duration::minutes(minutes.clamp(0, MAX_ROUND_TRIP_AGE_MINUTES))
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct IntersectionConfig {
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for IntersectionConfig {
    fn default() -> Self {
        Self { parallel: true }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub caching: CachingConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub round_trip: RoundTripConfig,
    #[serde(default)]
    pub intersection: IntersectionConfig,
}

impl EngineConfig {
    /// Rejects settings the engine cannot work with.
    pub fn validate(&self) -> SegmentResult<()> {
        if self.caching.cache_type == CacheType::Redis && self.caching.redis_url.is_none() {
            return Err(SegmentError::configuration("redis cache selected without redis_url"));
        }
        if self.registry.enabled && self.registry.refresh_interval_seconds == 0 {
            return Err(SegmentError::configuration("refresh_interval_seconds must be positive"));
        }
        let round_trip = &self.round_trip;
        if round_trip.user_max_age_minutes < 0 || round_trip.browser_max_age_minutes < 0 {
            return Err(SegmentError::configuration("round-trip max ages must not be negative"));
        }
        if round_trip.user_max_age_minutes > MAX_ROUND_TRIP_AGE_MINUTES
            || round_trip.browser_max_age_minutes > MAX_ROUND_TRIP_AGE_MINUTES
        {
            return Err(SegmentError::configuration(format!(
                "round-trip max ages must not exceed {MAX_ROUND_TRIP_AGE_MINUTES} minutes"
            )));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
fn default_max_capacity() -> u64 {
    10_000
}
fn default_ttl_seconds() -> u64 {
    3600
}
fn default_equality_ttl_seconds() -> u64 {
    120
}
fn default_windowed_ttl_cap_seconds() -> u64 {
    60
}
fn default_refresh_interval_seconds() -> u64 {
    60
}
fn default_user_max_age_minutes() -> i64 {
    60
}
fn default_browser_max_age_minutes() -> i64 {
    24 * 60
}
