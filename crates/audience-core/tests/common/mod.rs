//! Shared fixtures for the audience-core integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use audience_core::cache::InMemoryCacheProvider;
use audience_core::conditions::EventFilter;
use audience_core::{
    DefinitionStore, EngineConfig, EventStore, IdentifierKind, InMemoryDefinitionStore,
    InMemoryEventStore, RuleCondition, Segment, SegmentEngine, SegmentError, SegmentRegistry,
    SegmentResult, SegmentRule, TrackedEvent,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    now() - Duration::minutes(minutes)
}

pub fn rule(
    id: i64,
    category: &str,
    action: &str,
    operator: &str,
    count: u64,
    timespan: Option<u32>,
) -> SegmentRule {
    SegmentRule {
        id,
        segment_id: 1,
        event_category: category.to_string(),
        event_action: action.to_string(),
        operator: operator.to_string(),
        count,
        timespan,
        fields: vec![],
        flags: vec![],
    }
}

pub fn segment(id: i64, code: &str, rules: Vec<SegmentRule>) -> Segment {
    Segment {
        id,
        code: code.to_string(),
        name: code.replace('_', " "),
        active: true,
        group: None,
        rules: rules.into_iter().map(|r| SegmentRule { segment_id: id, ..r }).collect(),
    }
}

pub fn pageviews(user: &str, n: usize, minutes_back: i64) -> Vec<TrackedEvent> {
    (0..n)
        .map(|_| TrackedEvent::new("pageview", "load", minutes_ago(minutes_back)).with_user(user))
        .collect()
}

pub fn author_pageview(user: &str, author: &str) -> TrackedEvent {
    TrackedEvent::new("pageview", "load", minutes_ago(1))
        .with_user(user)
        .with_tag("author_id", author)
}

pub fn with_author_field(mut rule: SegmentRule, default: &str) -> SegmentRule {
    rule.fields.push(RuleCondition::new("author_id", default));
    rule
}

/// Event store counting the queries it answers.
#[derive(Debug, Default)]
pub struct CountingEventStore {
    pub inner: InMemoryEventStore,
    pub queries: AtomicUsize,
    pub down: AtomicBool,
}

impl CountingEventStore {
    pub fn new(events: Vec<TrackedEvent>) -> Self {
        Self { inner: InMemoryEventStore::with_events(events), ..Self::default() }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn begin(&self) -> SegmentResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(SegmentError::event_store("query timed out"));
        }
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl EventStore for CountingEventStore {
    async fn count(&self, filter: &EventFilter) -> SegmentResult<u64> {
        self.begin()?;
        self.inner.count(filter).await
    }

    async fn grouped_counts(
        &self,
        filter: &EventFilter,
        group_by: IdentifierKind,
    ) -> SegmentResult<HashMap<String, u64>> {
        self.begin()?;
        self.inner.grouped_counts(filter, group_by).await
    }

    async fn known_identifiers(&self, kind: IdentifierKind) -> SegmentResult<HashSet<String>> {
        self.begin()?;
        self.inner.known_identifiers(kind).await
    }
}

pub struct Harness {
    pub engine: SegmentEngine,
    pub events: Arc<CountingEventStore>,
    pub definitions: Arc<InMemoryDefinitionStore>,
}

/// Engine over in-memory stores with a loaded registry.
pub async fn harness(segments: Vec<Segment>, events: Vec<TrackedEvent>) -> Harness {
    harness_with_config(segments, events, &EngineConfig::default()).await
}

pub async fn harness_with_config(
    segments: Vec<Segment>,
    events: Vec<TrackedEvent>,
    config: &EngineConfig,
) -> Harness {
    let definitions = Arc::new(InMemoryDefinitionStore::new(segments));
    let events = Arc::new(CountingEventStore::new(events));
    let registry = Arc::new(SegmentRegistry::new(definitions.clone() as Arc<dyn DefinitionStore>));
    registry.refresh().await.unwrap();
    let cache = Arc::new(InMemoryCacheProvider::new(config.caching.max_capacity));
    let engine = SegmentEngine::new(config, registry, events.clone(), cache);
    Harness { engine, events, definitions }
}
