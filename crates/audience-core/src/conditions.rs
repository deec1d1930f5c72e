//! Condition building for segment rules
//!
//! Translates a [`SegmentRule`] plus per-request overrides into an
//! [`EventFilter`]: a backend-agnostic description of which events to count.
//! Event store adapters turn the filter into their own query language.

use audience_types::{
    CATEGORY_COMMERCE, CATEGORY_PAGEVIEW, IdentifierKind, RuleOverrides, SegmentRule,
};
use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Event field matched against a rule's category.
pub const FIELD_CATEGORY: &str = "category";
/// Event field matched against a rule's action.
pub const FIELD_ACTION: &str = "action";
/// Commerce funnel step field.
pub const FIELD_STEP: &str = "step";

/// Table (or stream) holding the events a rule counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTable {
    Pageviews,
    Commerce,
    Events,
}

impl EventTable {
    pub fn for_category(category: &str) -> Self {
        match category {
            CATEGORY_PAGEVIEW => EventTable::Pageviews,
            CATEGORY_COMMERCE => EventTable::Commerce,
            _ => EventTable::Events,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EventTable::Pageviews => "pageviews",
            EventTable::Commerce => "commerce",
            EventTable::Events => "events",
        }
    }
}

impl fmt::Display for EventTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Equality condition on one event field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldCondition {
    pub field: String,
    pub value: String,
}

impl FieldCondition {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self { field: field.into(), value: value.into() }
    }
}

/// Restricts a filter to one identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentifierFilter {
    pub kind: IdentifierKind,
    pub value: String,
}

/// Backend-agnostic description of the events a rule counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub table: EventTable,
    /// ANDed equality conditions, in rule order
    pub conditions: Vec<FieldCondition>,
    /// Inclusive lower time bound; `None` covers all history
    pub time_after: Option<DateTime<Utc>>,
    pub identifier: Option<IdentifierFilter>,
}

impl EventFilter {
    /// Narrows the filter to events of a single identifier.
    pub fn for_identifier(mut self, kind: IdentifierKind, identifier: impl Into<String>) -> Self {
        self.identifier = Some(IdentifierFilter { kind, value: identifier.into() });
        self
    }

    /// Value required for `field`, if any condition targets it.
    pub fn condition(&self, field: &str) -> Option<&str> {
        self.conditions.iter().find(|c| c.field == field).map(|c| c.value.as_str())
    }
}

/// Builds the filter for `rule` as of `now`.
///
/// Override values replace field defaults by key. Field and flag conditions
/// whose effective value (or key) is empty are omitted.
pub fn build_filter(
    rule: &SegmentRule,
    overrides: &RuleOverrides,
    now: DateTime<Utc>,
) -> EventFilter {
    let table = EventTable::for_category(&rule.event_category);
    let mut conditions = Vec::with_capacity(2 + rule.fields.len() + rule.flags.len());

    match table {
        // load action is implicit for pageviews
        EventTable::Pageviews => {}
        EventTable::Commerce => {
            conditions.push(FieldCondition::new(FIELD_STEP, rule.event_action.as_str()));
        }
        EventTable::Events => {
            conditions.push(FieldCondition::new(FIELD_CATEGORY, rule.event_category.as_str()));
            conditions.push(FieldCondition::new(FIELD_ACTION, rule.event_action.as_str()));
        }
    }

    for field in &rule.fields {
        let value = overrides.get(&field.key).unwrap_or(field.value.as_str());
        if field.key.is_empty() || value.is_empty() {
            continue;
        }
        conditions.push(FieldCondition::new(field.key.as_str(), value));
    }

    for flag in &rule.flags {
        if flag.key.is_empty() || flag.value.is_empty() {
            continue;
        }
        conditions.push(FieldCondition::new(flag.key.as_str(), flag.value.as_str()));
    }

    let time_after = rule.timespan.map(|minutes| now - Duration::minutes(i64::from(minutes)));

    EventFilter { table, conditions, time_after, identifier: None }
}
