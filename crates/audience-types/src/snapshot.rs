use crate::segment::RuleId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Count observed for one rule and when it was read from the event store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCacheEntry {
    /// When the count was last synced with the event store.
    #[serde(rename = "s")]
    pub synced_at: DateTime<Utc>,
    /// Number of matching events at `synced_at`.
    #[serde(rename = "c")]
    pub count: u64,
}

impl RuleCacheEntry {
    /// Creates an entry.
    #[must_use]
    pub const fn new(synced_at: DateTime<Utc>, count: u64) -> Self {
        Self { synced_at, count }
    }
}

/// Caller-owned map of prior per-rule counts, resubmitted with each check.
///
/// The engine never stores it. It only prunes stale entries, reads fresh ones
/// and hands back an updated copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundTripSnapshot {
    entries: BTreeMap<RuleId, RuleCacheEntry>,
}

impl RoundTripSnapshot {
    /// Empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the JSON object clients send back.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Drops entries synced before `now - max_age`.
    ///
    /// An entry synced exactly at the boundary is kept.
    #[must_use]
    pub fn prune(mut self, now: DateTime<Utc>, max_age: Duration) -> Self {
        let oldest = now - max_age;
        self.entries.retain(|_, entry| entry.synced_at >= oldest);
        self
    }

    /// Writes `updates` over the existing entries.
    #[must_use]
    pub fn merge<I>(mut self, updates: I) -> Self
    where
        I: IntoIterator<Item = (RuleId, RuleCacheEntry)>,
    {
        self.entries.extend(updates);
        self
    }

    /// Entry for `rule_id`, if present.
    #[must_use]
    pub fn get(&self, rule_id: RuleId) -> Option<&RuleCacheEntry> {
        self.entries.get(&rule_id)
    }

    /// Inserts a single entry.
    pub fn insert(&mut self, rule_id: RuleId, entry: RuleCacheEntry) {
        self.entries.insert(rule_id, entry);
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in rule id order.
    pub fn iter(&self) -> impl Iterator<Item = (RuleId, &RuleCacheEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }
}

impl FromIterator<(RuleId, RuleCacheEntry)> for RoundTripSnapshot {
    fn from_iter<T: IntoIterator<Item = (RuleId, RuleCacheEntry)>>(iter: T) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn prune_boundary() {
        let max_age = Duration::hours(1);
        let snapshot: RoundTripSnapshot = [
            (1, RuleCacheEntry::new(now() - max_age - Duration::seconds(1), 3)),
            (2, RuleCacheEntry::new(now() - max_age + Duration::seconds(1), 4)),
            (3, RuleCacheEntry::new(now() - max_age, 5)),
        ]
        .into_iter()
        .collect();

        let pruned = snapshot.prune(now(), max_age);
        assert!(pruned.get(1).is_none());
        assert_eq!(pruned.get(2).map(|e| e.count), Some(4));
        assert_eq!(pruned.get(3).map(|e| e.count), Some(5));
    }

    #[test]
    fn merge_replaces_existing() {
        let base: RoundTripSnapshot =
            [(1, RuleCacheEntry::new(now() - Duration::minutes(5), 1))].into_iter().collect();
        let merged =
            base.merge([(1, RuleCacheEntry::new(now(), 9)), (2, RuleCacheEntry::new(now(), 2))]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get(1), Some(&RuleCacheEntry::new(now(), 9)));
    }

    #[test]
    fn wire_format_uses_short_keys() {
        let snapshot: RoundTripSnapshot =
            [(12, RuleCacheEntry::new(now(), 3))].into_iter().collect();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["12"]["c"], 3);
        assert!(json["12"]["s"].is_string());

        let parsed = RoundTripSnapshot::from_json(&json.to_string()).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(RoundTripSnapshot::from_json(r#"{"1":{"c":"many"}}"#).is_err());
    }
}
