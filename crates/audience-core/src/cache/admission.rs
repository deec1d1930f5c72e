//! Cache admission policy
//!
//! Event counts only grow, so some outcomes can never change again: a `>=`
//! rule that is already satisfied stays satisfied, a `<=` rule whose count is
//! already above the threshold stays unsatisfied. Only those outcomes are
//! cached. An outcome that more events could still flip is always re-queried.

use crate::config::CachingConfig;
use audience_types::Operator;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    pub default_ttl: Duration,
    pub equality_ttl: Duration,
    /// Events roll off rolling windows, so windowed outcomes are trusted briefly
    pub windowed_ttl_cap: Duration,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self::from_config(&CachingConfig::default())
    }
}

impl AdmissionPolicy {
    pub fn from_config(config: &CachingConfig) -> Self {
        Self {
            default_ttl: Duration::from_secs(config.default_ttl_seconds),
            equality_ttl: Duration::from_secs(config.equality_ttl_seconds),
            windowed_ttl_cap: Duration::from_secs(config.windowed_ttl_cap_seconds),
        }
    }

    /// Whether `operator` evaluated at `count` can no longer change as count grows.
    pub fn is_stable(operator: Operator, count: u64, threshold: u64) -> bool {
        match operator {
            // permanently true
            Operator::GreaterThanOrEqual => count >= threshold,
            Operator::GreaterThan => count > threshold,
            // permanently false
            Operator::LessThanOrEqual | Operator::Equal => count > threshold,
            Operator::LessThan => count >= threshold,
        }
    }

    /// TTL to cache the observed count with, or `None` to skip caching.
    pub fn ttl_for(
        &self,
        operator: Operator,
        count: u64,
        threshold: u64,
        timespan_minutes: Option<u32>,
    ) -> Option<Duration> {
        if !Self::is_stable(operator, count, threshold) {
            return None;
        }

        let ttl = match operator {
            Operator::Equal => self.equality_ttl,
            _ => self.default_ttl,
        };
        let ttl = match timespan_minutes {
            Some(minutes) => ttl
                .min(self.windowed_ttl_cap)
                .min(Duration::from_secs(u64::from(minutes) * 60)),
            None => ttl,
        };

        (!ttl.is_zero()).then_some(ttl)
    }
}
