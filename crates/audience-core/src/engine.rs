//! Segment engine facade
//!
//! Ties the registry, event store, aggregate cache and intersection engine
//! together behind the two operations the API layer calls.

use crate::cache::{
    AdmissionPolicy, AggregateCache, CacheStats, CachedCount, build_cache, rule_cache_key,
};
use crate::conditions::build_filter;
use crate::config::{EngineConfig, RegistryConfig, RoundTripConfig};
use crate::definition_store::DefinitionStore;
use crate::error::{SegmentError, SegmentResult};
use crate::event_store::EventStore;
use crate::intersection::IntersectionEngine;
use crate::refresh::RegistryRefresher;
use crate::registry::SegmentRegistry;
use audience_types::{
    IdentifierKind, Operator, RoundTripSnapshot, RuleCacheEntry, RuleOverrides, SegmentCheck,
    SegmentRule, SegmentSummary,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Parses caller overrides. A missing or blank string means no overrides.
pub fn parse_overrides(raw: Option<&str>) -> SegmentResult<RuleOverrides> {
    match raw.map(str::trim) {
        None | Some("") => Ok(RuleOverrides::default()),
        Some(raw) => RuleOverrides::from_json(raw)
            .map_err(|e| SegmentError::OverrideFormat { message: e.to_string() }),
    }
}

/// Parses a resubmitted round-trip snapshot. A missing or blank string is an
/// empty snapshot.
pub fn parse_snapshot(raw: Option<&str>) -> SegmentResult<RoundTripSnapshot> {
    match raw.map(str::trim) {
        None | Some("") => Ok(RoundTripSnapshot::default()),
        Some(raw) => RoundTripSnapshot::from_json(raw)
            .map_err(|e| SegmentError::SnapshotFormat { message: e.to_string() }),
    }
}

#[derive(Debug)]
pub struct SegmentEngine {
    registry: Arc<SegmentRegistry>,
    events: Arc<dyn EventStore>,
    cache: Arc<dyn AggregateCache>,
    intersection: IntersectionEngine,
    admission: AdmissionPolicy,
    round_trip: RoundTripConfig,
    registry_config: RegistryConfig,
}

impl SegmentEngine {
    pub fn new(
        config: &EngineConfig,
        registry: Arc<SegmentRegistry>,
        events: Arc<dyn EventStore>,
        cache: Arc<dyn AggregateCache>,
    ) -> Self {
        Self {
            intersection: IntersectionEngine::new(
                Arc::clone(&events),
                config.intersection.parallel,
            ),
            admission: AdmissionPolicy::from_config(&config.caching),
            round_trip: config.round_trip.clone(),
            registry_config: config.registry.clone(),
            registry,
            events,
            cache,
        }
    }

    /// Validates `config`, builds the configured cache and loads the first
    /// registry generation.
    ///
    /// A failed initial load is logged and leaves the registry empty; lookups
    /// then fall back to direct definition store loads.
    pub async fn from_config(
        config: &EngineConfig,
        definitions: Arc<dyn DefinitionStore>,
        events: Arc<dyn EventStore>,
    ) -> SegmentResult<Self> {
        config.validate()?;
        let cache = build_cache(&config.caching).await?;
        let registry = Arc::new(SegmentRegistry::new(definitions));
        registry.refresh_or_keep().await;
        Ok(Self::new(config, registry, events, cache))
    }

    pub fn registry(&self) -> &Arc<SegmentRegistry> {
        &self.registry
    }

    /// Background refresher for this engine's registry.
    pub fn refresher(&self) -> Arc<RegistryRefresher> {
        Arc::new(RegistryRefresher::new(Arc::clone(&self.registry), self.registry_config.clone()))
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Code, name and group of every segment.
    #[instrument(skip(self))]
    pub async fn list_segments(&self) -> SegmentResult<Vec<SegmentSummary>> {
        self.registry.store().list_segments().await
    }

    /// Checks whether `identifier` belongs to the segment `code`.
    ///
    /// Returns `Ok(None)` for an unknown segment.
    pub async fn check_identifier(
        &self,
        code: &str,
        identifier: &str,
        kind: IdentifierKind,
        overrides: &RuleOverrides,
        snapshot: RoundTripSnapshot,
    ) -> SegmentResult<Option<SegmentCheck>> {
        self.check_identifier_at(code, identifier, kind, overrides, snapshot, Utc::now())
            .await
    }

    /// [`SegmentEngine::check_identifier`] as of `now`.
    ///
    /// Stale snapshot entries are pruned first. Each rule is then served from
    /// the snapshot, the aggregate cache or the event store, in that order,
    /// stopping at the first unsatisfied rule.
    #[instrument(skip(self, overrides, snapshot, now), fields(snapshot_entries = snapshot.len()))]
    pub async fn check_identifier_at(
        &self,
        code: &str,
        identifier: &str,
        kind: IdentifierKind,
        overrides: &RuleOverrides,
        snapshot: RoundTripSnapshot,
        now: DateTime<Utc>,
    ) -> SegmentResult<Option<SegmentCheck>> {
        let Some(segment) = self.registry.get(code).await? else {
            debug!("Unknown segment");
            return Ok(None);
        };

        let operators = segment
            .rules
            .iter()
            .map(SegmentRule::operator)
            .collect::<Result<Vec<_>, _>>()?;

        let snapshot = snapshot.prune(now, self.round_trip.max_age(kind));
        let mut updates = Vec::new();
        let mut check = true;

        for (rule, operator) in segment.rules.iter().zip(operators) {
            let count = match snapshot.get(rule.id) {
                Some(entry) => {
                    debug!(
                        rule_id = rule.id,
                        count = entry.count,
                        "Served from round-trip snapshot"
                    );
                    entry.count
                }
                None => {
                    let entry =
                        self.fetch_count(rule, operator, identifier, kind, overrides, now).await?;
                    updates.push((rule.id, entry));
                    entry.count
                }
            };

            if !operator.evaluate(count, rule.count) {
                debug!(
                    rule_id = rule.id,
                    count,
                    threshold = rule.count,
                    %operator,
                    "Rule not satisfied"
                );
                check = false;
                break;
            }
        }

        Ok(Some(SegmentCheck::new(&segment, check, snapshot.merge(updates))))
    }

    /// Count for one rule from the aggregate cache, or the event store on a
    /// miss. Stable outcomes read from the store are admitted to the cache.
    async fn fetch_count(
        &self,
        rule: &SegmentRule,
        operator: Operator,
        identifier: &str,
        kind: IdentifierKind,
        overrides: &RuleOverrides,
        now: DateTime<Utc>,
    ) -> SegmentResult<RuleCacheEntry> {
        let filter = build_filter(rule, overrides, now).for_identifier(kind, identifier);
        let key = rule_cache_key(kind, identifier, rule, operator, &filter);

        if let Some(cached) = self.cache.get(&key).await {
            return Ok(RuleCacheEntry::new(cached.synced_at, cached.count));
        }

        let count = self.events.count(&filter).await?;
        match self.admission.ttl_for(operator, count, rule.count, rule.timespan) {
            Some(ttl) => {
                debug!(
                    rule_id = rule.id,
                    count,
                    ttl_secs = ttl.as_secs(),
                    "Admitting count to aggregate cache"
                );
                self.cache.set(key, CachedCount { count, synced_at: now }, ttl).await;
            }
            None => debug!(rule_id = rule.id, count, "Outcome may still change, not caching"),
        }
        Ok(RuleCacheEntry::new(now, count))
    }

    /// All user identifiers belonging to the segment `code`.
    ///
    /// Returns `Ok(None)` for an unknown segment.
    pub async fn resolve_members(
        &self,
        code: &str,
        overrides: &RuleOverrides,
    ) -> SegmentResult<Option<Vec<String>>> {
        self.resolve_members_at(code, overrides, Utc::now()).await
    }

    /// [`SegmentEngine::resolve_members`] as of `now`.
    #[instrument(skip(self, overrides, now))]
    pub async fn resolve_members_at(
        &self,
        code: &str,
        overrides: &RuleOverrides,
        now: DateTime<Utc>,
    ) -> SegmentResult<Option<Vec<String>>> {
        let Some(segment) = self.registry.get(code).await? else {
            debug!("Unknown segment");
            return Ok(None);
        };
        self.intersection.resolve(&segment, overrides, now).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_inputs_parse_as_empty() {
        assert!(parse_overrides(None).unwrap().fields.is_empty());
        assert!(parse_overrides(Some("  ")).unwrap().fields.is_empty());
        assert!(parse_snapshot(Some("")).unwrap().is_empty());
    }

    #[test]
    fn malformed_inputs_are_caller_errors() {
        let err = parse_overrides(Some("{\"author_id\": ")).unwrap_err();
        assert!(matches!(err, SegmentError::OverrideFormat { .. }));
        assert!(err.is_caller_error());

        let err = parse_snapshot(Some("[1, 2]")).unwrap_err();
        assert!(matches!(err, SegmentError::SnapshotFormat { .. }));
    }

    #[test]
    fn well_formed_inputs() {
        let overrides = parse_overrides(Some(r#"{"author_id": "42"}"#)).unwrap();
        assert_eq!(overrides.get("author_id"), Some("42"));

        let raw = r#"{"7": {"s": "2024-03-01T12:00:00Z", "c": 3}}"#;
        let snapshot = parse_snapshot(Some(raw)).unwrap();
        assert_eq!(snapshot.get(7).map(|e| e.count), Some(3));
    }
}
