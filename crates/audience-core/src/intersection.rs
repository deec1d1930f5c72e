//! Bulk membership resolution
//!
//! Every rule of a segment becomes one grouped event store query. Each rule's
//! satisfying identifiers are intersected into the final membership, using the
//! same operator evaluation as single-identifier checks.
//!
//! Grouped results only list identifiers with at least one matching event, so
//! a missing identifier has count 0. Rules that hold at count 0 (`< 3`,
//! `<= 0`, `= 0`) cannot seed candidates from their grouped result; they only
//! filter candidates seeded by other rules, or the set of known identifiers
//! when no other rule can seed.

use crate::conditions::build_filter;
use crate::error::SegmentResult;
use crate::event_store::EventStore;
use ahash::AHashSet;
use audience_types::{IdentifierKind, Operator, RuleId, RuleOverrides, Segment, SegmentRule};
use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Per-identifier counts returned for one rule.
#[derive(Debug, Clone)]
pub struct RuleCounts {
    pub rule_id: RuleId,
    pub operator: Operator,
    pub threshold: u64,
    pub counts: HashMap<String, u64>,
}

impl RuleCounts {
    pub fn count_for(&self, identifier: &str) -> u64 {
        self.counts.get(identifier).copied().unwrap_or(0)
    }

    pub fn satisfied_by(&self, identifier: &str) -> bool {
        self.operator.evaluate(self.count_for(identifier), self.threshold)
    }

    /// Whether an identifier with no matching events satisfies the rule.
    pub fn satisfied_at_zero(&self) -> bool {
        self.operator.evaluate(0, self.threshold)
    }

    fn matching(&self) -> AHashSet<String> {
        self.counts
            .iter()
            .filter(|(_, count)| self.operator.evaluate(**count, self.threshold))
            .map(|(identifier, _)| identifier.clone())
            .collect()
    }
}

/// Intersects the identifiers satisfying every rule.
///
/// `universe` is only consulted when every rule holds at count 0, and must
/// then contain every identifier to consider.
pub fn intersect(rules: &[RuleCounts], universe: Option<&HashSet<String>>) -> AHashSet<String> {
    let (seeding, filtering): (Vec<&RuleCounts>, Vec<&RuleCounts>) =
        rules.iter().partition(|rule| !rule.satisfied_at_zero());

    let mut seeding = seeding.into_iter();
    let mut candidates = match seeding.next() {
        Some(first) => first.matching(),
        None => universe.map(|u| u.iter().cloned().collect()).unwrap_or_default(),
    };

    for rule in seeding.chain(filtering) {
        if candidates.is_empty() {
            break;
        }
        candidates.retain(|identifier| rule.satisfied_by(identifier));
    }
    candidates
}

/// Resolves segment membership against an event store.
#[derive(Debug, Clone)]
pub struct IntersectionEngine {
    events: Arc<dyn EventStore>,
    parallel: bool,
}

impl IntersectionEngine {
    pub fn new(events: Arc<dyn EventStore>, parallel: bool) -> Self {
        Self { events, parallel }
    }

    /// Every user identifier satisfying all rules of `segment`, sorted.
    ///
    /// Nothing is returned until every rule query has completed.
    #[instrument(
        skip(self, segment, overrides),
        fields(segment = %segment.code, rules = segment.rules.len())
    )]
    pub async fn resolve(
        &self,
        segment: &Segment,
        overrides: &RuleOverrides,
        now: DateTime<Utc>,
    ) -> SegmentResult<Vec<String>> {
        let operators = segment
            .rules
            .iter()
            .map(SegmentRule::operator)
            .collect::<Result<Vec<_>, _>>()?;

        let grouped = self.grouped_counts(&segment.rules, overrides, now).await?;
        let rule_counts: Vec<RuleCounts> = segment
            .rules
            .iter()
            .zip(operators)
            .zip(grouped)
            .map(|((rule, operator), counts)| RuleCounts {
                rule_id: rule.id,
                operator,
                threshold: rule.count,
                counts,
            })
            .collect();

        let universe = if rule_counts.iter().all(RuleCounts::satisfied_at_zero) {
            debug!("No rule can seed candidates, enumerating known identifiers");
            Some(self.events.known_identifiers(IdentifierKind::User).await?)
        } else {
            None
        };

        let mut members: Vec<String> =
            intersect(&rule_counts, universe.as_ref()).into_iter().collect();
        members.sort_unstable();
        debug!(members = members.len(), "Resolved segment members");
        Ok(members)
    }

    async fn grouped_counts(
        &self,
        rules: &[SegmentRule],
        overrides: &RuleOverrides,
        now: DateTime<Utc>,
    ) -> SegmentResult<Vec<HashMap<String, u64>>> {
        let filters: Vec<_> = rules.iter().map(|rule| build_filter(rule, overrides, now)).collect();

        if self.parallel {
            let queries = filters
                .iter()
                .map(|filter| self.events.grouped_counts(filter, IdentifierKind::User));
            return try_join_all(queries).await;
        }

        let mut grouped = Vec::with_capacity(filters.len());
        for filter in &filters {
            grouped.push(self.events.grouped_counts(filter, IdentifierKind::User).await?);
        }
        Ok(grouped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(
        rule_id: RuleId,
        operator: Operator,
        threshold: u64,
        pairs: &[(&str, u64)],
    ) -> RuleCounts {
        RuleCounts {
            rule_id,
            operator,
            threshold,
            counts: pairs.iter().map(|(id, c)| (id.to_string(), *c)).collect(),
        }
    }

    fn sorted(set: AHashSet<String>) -> Vec<String> {
        let mut v: Vec<_> = set.into_iter().collect();
        v.sort();
        v
    }

    #[test]
    fn first_seeding_rule_initializes_candidates() {
        let rules = [
            counts(1, Operator::GreaterThanOrEqual, 3, &[("a", 5), ("b", 3), ("c", 1)]),
            counts(2, Operator::GreaterThanOrEqual, 1, &[("a", 1), ("c", 4)]),
        ];
        assert_eq!(sorted(intersect(&rules, None)), vec!["a"]);
    }

    #[test]
    fn zero_satisfiable_rules_only_filter() {
        let rules = [
            counts(1, Operator::LessThan, 2, &[("a", 5)]),
            counts(2, Operator::GreaterThanOrEqual, 1, &[("a", 1), ("b", 1)]),
        ];
        // b has no events for rule 1, so count 0 < 2 holds
        assert_eq!(sorted(intersect(&rules, None)), vec!["b"]);
    }

    #[test]
    fn universe_used_when_no_rule_can_seed() {
        let rules = [counts(1, Operator::LessThanOrEqual, 1, &[("a", 2), ("b", 1)])];
        let universe = HashSet::from(["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(sorted(intersect(&rules, Some(&universe))), vec!["b", "c"]);
        assert!(intersect(&rules, None).is_empty());
    }

    #[test]
    fn equality_excludes_other_counts() {
        let rules = [counts(1, Operator::Equal, 2, &[("a", 2), ("b", 3)])];
        assert_eq!(sorted(intersect(&rules, None)), vec!["a"]);
    }

    #[test]
    fn no_rules_yields_universe() {
        let universe = HashSet::from(["x".to_string()]);
        assert_eq!(sorted(intersect(&[], Some(&universe))), vec!["x"]);
    }
}
