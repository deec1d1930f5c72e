//! Definition store capability
//!
//! Segment and rule definitions live in a relational store administered
//! elsewhere. The engine reads segment rows and their rule rows separately,
//! the same way the store keeps them.

use crate::error::SegmentResult;
use async_trait::async_trait;
use audience_types::{Segment, SegmentId, SegmentRule, SegmentSummary};
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tracing::instrument;

/// Read-only access to segment definitions.
#[async_trait]
pub trait DefinitionStore: Send + Sync + fmt::Debug {
    /// Segment row for `code`, without its rules.
    async fn get_segment(&self, code: &str) -> SegmentResult<Option<Segment>>;

    /// Code, name and group of every segment, in store order.
    async fn list_segments(&self) -> SegmentResult<Vec<SegmentSummary>>;

    /// Every segment row, without rules.
    async fn all_segments(&self) -> SegmentResult<Vec<Segment>>;

    /// Rule rows belonging to `segment_id`, in store order.
    async fn rules_for_segment(&self, segment_id: SegmentId) -> SegmentResult<Vec<SegmentRule>>;
}

/// Loads a segment row together with its rules.
pub async fn load_segment<S>(store: &S, code: &str) -> SegmentResult<Option<Segment>>
where
    S: DefinitionStore + ?Sized,
{
    let Some(mut segment) = store.get_segment(code).await? else {
        return Ok(None);
    };
    segment.rules = store.rules_for_segment(segment.id).await?;
    Ok(Some(segment))
}

/// Definition store holding segments in process memory.
#[derive(Debug, Default)]
pub struct InMemoryDefinitionStore {
    segments: RwLock<Vec<Segment>>,
}

impl InMemoryDefinitionStore {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments: RwLock::new(segments) }
    }

    /// Inserts `segment`, replacing any segment with the same code.
    pub fn upsert(&self, segment: Segment) {
        let mut segments = self.segments.write().unwrap_or_else(PoisonError::into_inner);
        match segments.iter_mut().find(|s| s.code == segment.code) {
            Some(existing) => *existing = segment,
            None => segments.push(segment),
        }
    }

    pub fn remove(&self, code: &str) -> bool {
        let mut segments = self.segments.write().unwrap_or_else(PoisonError::into_inner);
        let before = segments.len();
        segments.retain(|s| s.code != code);
        segments.len() != before
    }
}

fn without_rules(segment: &Segment) -> Segment {
    Segment { rules: Vec::new(), ..segment.clone() }
}

#[async_trait]
impl DefinitionStore for InMemoryDefinitionStore {
    #[instrument(level = "trace", skip(self))]
    async fn get_segment(&self, code: &str) -> SegmentResult<Option<Segment>> {
        let segments = self.segments.read().unwrap_or_else(PoisonError::into_inner);
        Ok(segments.iter().find(|s| s.code == code).map(without_rules))
    }

    async fn list_segments(&self) -> SegmentResult<Vec<SegmentSummary>> {
        let segments = self.segments.read().unwrap_or_else(PoisonError::into_inner);
        Ok(segments.iter().map(SegmentSummary::from).collect())
    }

    async fn all_segments(&self) -> SegmentResult<Vec<Segment>> {
        let segments = self.segments.read().unwrap_or_else(PoisonError::into_inner);
        Ok(segments.iter().map(without_rules).collect())
    }

    #[instrument(level = "trace", skip(self))]
    async fn rules_for_segment(&self, segment_id: SegmentId) -> SegmentResult<Vec<SegmentRule>> {
        let segments = self.segments.read().unwrap_or_else(PoisonError::into_inner);
        Ok(segments
            .iter()
            .filter(|s| s.id == segment_id)
            .flat_map(|s| s.rules.iter().cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(id: SegmentId, code: &str) -> Segment {
        Segment {
            id,
            code: code.to_string(),
            name: code.to_uppercase(),
            active: true,
            group: None,
            rules: vec![SegmentRule {
                id: id * 10,
                segment_id: id,
                event_category: "pageview".to_string(),
                event_action: "load".to_string(),
                operator: ">=".to_string(),
                count: 3,
                timespan: None,
                fields: vec![],
                flags: vec![],
            }],
        }
    }

    #[tokio::test]
    async fn rows_are_returned_without_rules() {
        let store = InMemoryDefinitionStore::new(vec![segment(1, "readers")]);
        let row = store.get_segment("readers").await.unwrap().unwrap();
        assert!(row.rules.is_empty());
        assert_eq!(store.rules_for_segment(1).await.unwrap().len(), 1);
        assert!(store.get_segment("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_segment_hydrates_rules() {
        let store = InMemoryDefinitionStore::new(vec![segment(1, "readers"), segment(2, "buyers")]);
        let loaded = load_segment(&store, "buyers").await.unwrap().unwrap();
        assert_eq!(loaded, segment(2, "buyers"));
        assert!(load_segment(&store, "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_and_remove() {
        let store = InMemoryDefinitionStore::new(vec![segment(1, "readers")]);
        let mut renamed = segment(1, "readers");
        renamed.name = "Loyal readers".to_string();
        store.upsert(renamed);
        store.upsert(segment(2, "buyers"));

        let listed = store.list_segments().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "Loyal readers");

        assert!(store.remove("buyers"));
        assert!(!store.remove("buyers"));
    }
}
