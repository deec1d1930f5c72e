//! Server-side aggregate cache
//!
//! Memoizes event store counts per (identifier, rule, effective conditions).
//! Entries carry their own TTL, chosen by the [`admission`] policy; nothing is
//! invalidated when events arrive.

use crate::conditions::EventFilter;
use crate::config::{CacheType, CachingConfig};
use crate::error::{SegmentError, SegmentResult};
use async_trait::async_trait;
use audience_types::{IdentifierKind, Operator, SegmentRule};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};
use std::sync::Arc;
use std::time::Duration;

pub mod admission;
pub mod in_memory_provider;

#[cfg(feature = "redis-cache")]
pub mod redis_provider;

pub use admission::AdmissionPolicy;
pub use in_memory_provider::InMemoryCacheProvider;

/// Count read from the event store and when it was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCount {
    pub count: u64,
    pub synced_at: DateTime<Utc>,
}

/// Statistics for the aggregate cache.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub admitted: u64,
    pub hit_rate: f64,
}

impl CacheStats {
    pub fn new(cache_hits: u64, cache_misses: u64, admitted: u64) -> Self {
        let lookups = cache_hits + cache_misses;
        let hit_rate = if lookups == 0 { 0.0 } else { cache_hits as f64 / lookups as f64 };
        Self { cache_hits, cache_misses, admitted, hit_rate }
    }
}

/// Shared TTL key-value store for aggregate counts.
///
/// Backend failures are logged by the provider and reported as misses; a
/// broken cache never fails a check.
#[async_trait]
pub trait AggregateCache: Send + Sync + fmt::Debug {
    async fn get(&self, key: &str) -> Option<CachedCount>;
    async fn set(&self, key: String, value: CachedCount, ttl: Duration);
    async fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

/// Deterministic signature of everything that determines a rule count.
///
/// Conditions come from the built filter, so overrides are already applied
/// and empty conditions already dropped. Free-form strings are written as
/// `{len}:{value}` so distinct filters never share a key.
pub fn rule_cache_key(
    kind: IdentifierKind,
    identifier: &str,
    rule: &SegmentRule,
    operator: Operator,
    filter: &EventFilter,
) -> String {
    let mut key = format!("{kind}|");
    push_part(&mut key, identifier);
    let _ = write!(key, "|{}|", rule.id);
    push_part(&mut key, &rule.event_category);
    key.push('|');
    push_part(&mut key, &rule.event_action);
    let _ = write!(key, "|{operator}{}|", rule.count);
    match rule.timespan {
        Some(minutes) => {
            let _ = write!(key, "{minutes}");
        }
        None => key.push('-'),
    }
    for condition in &filter.conditions {
        key.push('|');
        push_part(&mut key, &condition.field);
        key.push('=');
        push_part(&mut key, &condition.value);
    }
    key
}

fn push_part(key: &mut String, part: &str) {
    let _ = write!(key, "{}:{}", part.len(), part);
}

/// Builds the cache provider selected by configuration.
pub async fn build_cache(config: &CachingConfig) -> SegmentResult<Arc<dyn AggregateCache>> {
    match config.cache_type {
        CacheType::InMemory => Ok(Arc::new(InMemoryCacheProvider::new(config.max_capacity))),
        #[cfg(feature = "redis-cache")]
        CacheType::Redis => {
            let url = config.redis_url.as_deref().ok_or_else(|| {
                SegmentError::configuration("redis cache selected without redis_url")
            })?;
            let provider = redis_provider::RedisCacheProvider::new(url).await.map_err(|e| {
                SegmentError::configuration(format!("unable to connect to redis: {e}"))
            })?;
            Ok(Arc::new(provider))
        }
        #[cfg(not(feature = "redis-cache"))]
        CacheType::Redis => {
            Err(SegmentError::configuration(
                "redis cache requested but the redis-cache feature is disabled",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::build_filter;
    use audience_types::{RuleCondition, RuleOverrides};
    use chrono::TimeZone;

    fn rule() -> SegmentRule {
        SegmentRule {
            id: 4,
            segment_id: 1,
            event_category: "pageview".to_string(),
            event_action: "load".to_string(),
            operator: ">=".to_string(),
            count: 5,
            timespan: Some(60),
            fields: vec![RuleCondition::new("author_id", "1")],
            flags: vec![],
        }
    }

    fn key_with(rule: &SegmentRule, overrides: &RuleOverrides, kind: IdentifierKind) -> String {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let filter = build_filter(rule, overrides, now);
        rule_cache_key(kind, "u1", rule, Operator::GreaterThanOrEqual, &filter)
    }

    fn key_for(overrides: &RuleOverrides, kind: IdentifierKind) -> String {
        key_with(&rule(), overrides, kind)
    }

    #[test]
    fn key_is_deterministic() {
        let overrides = RuleOverrides::default();
        let user = IdentifierKind::User;
        assert_eq!(key_for(&overrides, user), key_for(&overrides, user));
        assert_eq!(
            key_for(&overrides, user),
            "user|2:u1|4|8:pageview|4:load|>=5|60|9:author_id=1:1"
        );
    }

    #[test]
    fn key_reflects_overrides_and_identifier_kind() {
        let plain = key_for(&RuleOverrides::default(), IdentifierKind::User);
        let author_two = RuleOverrides::default().with_field("author_id", "2");
        let overridden = key_for(&author_two, IdentifierKind::User);
        let browser = key_for(&RuleOverrides::default(), IdentifierKind::Browser);
        assert_ne!(plain, overridden);
        assert_ne!(plain, browser);
    }

    #[test]
    fn separators_inside_values_cannot_forge_another_key() {
        let mut r = rule();
        r.fields = vec![RuleCondition::new("author_id", "1"), RuleCondition::new("section", "")];

        let section = RuleOverrides::default().with_field("section", "sport");
        let smuggled = RuleOverrides::default().with_field("author_id", "1,section/sport");
        assert_ne!(
            key_with(&r, &section, IdentifierKind::User),
            key_with(&r, &smuggled, IdentifierKind::User)
        );

        let piped = RuleOverrides::default().with_field("author_id", "1|7:section=5:sport");
        assert_ne!(
            key_with(&r, &section, IdentifierKind::User),
            key_with(&r, &piped, IdentifierKind::User)
        );
    }

    #[test]
    fn hit_rate() {
        assert_eq!(CacheStats::new(3, 1, 2).hit_rate, 0.75);
        assert_eq!(CacheStats::new(0, 0, 0).hit_rate, 0.0);
    }

    #[tokio::test]
    async fn builds_in_memory_provider_by_default() {
        let cache = build_cache(&CachingConfig::default()).await.unwrap();
        assert!(cache.get("missing").await.is_none());
    }
}
