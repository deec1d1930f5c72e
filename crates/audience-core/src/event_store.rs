//! Event store capability
//!
//! The engine only ever asks an event store two questions: how many events
//! match a filter, and how many match per identifier. Each time-series backend
//! implements [`EventStore`]; the engine never branches on which one it has.

use crate::conditions::{EventFilter, EventTable, FIELD_ACTION, FIELD_CATEGORY, FIELD_STEP};
use crate::error::SegmentResult;
use async_trait::async_trait;
use audience_types::IdentifierKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tracing::instrument;

/// Read-only access to tracked events.
#[async_trait]
pub trait EventStore: Send + Sync + fmt::Debug {
    /// Number of events matching `filter`.
    async fn count(&self, filter: &EventFilter) -> SegmentResult<u64>;

    /// Matching event counts per identifier of `group_by` kind.
    ///
    /// Identifiers without a matching event are absent from the result.
    async fn grouped_counts(
        &self,
        filter: &EventFilter,
        group_by: IdentifierKind,
    ) -> SegmentResult<HashMap<String, u64>>;

    /// Every identifier of `kind` that has any tracked event.
    async fn known_identifiers(&self, kind: IdentifierKind) -> SegmentResult<HashSet<String>>;
}

/// A single tracked event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEvent {
    pub category: String,
    pub action: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub browser_id: Option<String>,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl TrackedEvent {
    pub fn new(
        category: impl Into<String>,
        action: impl Into<String>,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            category: category.into(),
            action: action.into(),
            user_id: None,
            browser_id: None,
            time,
            tags: HashMap::new(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_browser(mut self, browser_id: impl Into<String>) -> Self {
        self.browser_id = Some(browser_id.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn table(&self) -> EventTable {
        EventTable::for_category(&self.category)
    }

    pub fn identifier(&self, kind: IdentifierKind) -> Option<&str> {
        self.field(kind.field())
    }

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "user_id" => self.user_id.as_deref(),
            "browser_id" => self.browser_id.as_deref(),
            FIELD_CATEGORY => Some(self.category.as_str()),
            FIELD_ACTION => Some(self.action.as_str()),
            // commerce events record their funnel step as the action
            FIELD_STEP if self.table() == EventTable::Commerce => Some(self.action.as_str()),
            _ => self.tags.get(name).map(String::as_str),
        }
    }

    /// Whether the event satisfies every part of `filter`.
    pub fn matches(&self, filter: &EventFilter) -> bool {
        if self.table() != filter.table {
            return false;
        }
        if filter.time_after.is_some_and(|after| self.time < after) {
            return false;
        }
        if let Some(identifier) = &filter.identifier {
            if self.identifier(identifier.kind) != Some(identifier.value.as_str()) {
                return false;
            }
        }
        filter.conditions.iter().all(|c| self.field(&c.field) == Some(c.value.as_str()))
    }
}

/// Event store holding events in process memory.
///
/// Backs tests and the file-driven CLI.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<TrackedEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<TrackedEvent>) -> Self {
        Self { events: RwLock::new(events) }
    }

    pub fn record(&self, event: TrackedEvent) {
        self.events.write().unwrap_or_else(PoisonError::into_inner).push(event);
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    #[instrument(level = "trace", skip(self))]
    async fn count(&self, filter: &EventFilter) -> SegmentResult<u64> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        Ok(events.iter().filter(|e| e.matches(filter)).count() as u64)
    }

    #[instrument(level = "trace", skip(self))]
    async fn grouped_counts(
        &self,
        filter: &EventFilter,
        group_by: IdentifierKind,
    ) -> SegmentResult<HashMap<String, u64>> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        let mut counts: HashMap<String, u64> = HashMap::new();
        for event in events.iter().filter(|e| e.matches(filter)) {
            if let Some(identifier) = event.identifier(group_by) {
                *counts.entry(identifier.to_string()).or_default() += 1;
            }
        }
        Ok(counts)
    }

    async fn known_identifiers(&self, kind: IdentifierKind) -> SegmentResult<HashSet<String>> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        Ok(events.iter().filter_map(|e| e.identifier(kind)).map(str::to_string).collect())
    }
}
