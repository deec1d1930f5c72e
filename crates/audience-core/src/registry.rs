//! In-memory segment registry
//!
//! Holds an immutable generation of segment definitions behind a single
//! reference. A refresh builds the next generation off to the side and swaps
//! the reference, so readers always see one complete generation.

use crate::definition_store::{DefinitionStore, load_segment};
use crate::error::SegmentResult;
use audience_types::Segment;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// One complete, immutable set of segment definitions.
#[derive(Debug, Default)]
pub struct RegistryGeneration {
    pub generation: u64,
    pub loaded_at: Option<DateTime<Utc>>,
    segments: HashMap<String, Arc<Segment>>,
}

impl RegistryGeneration {
    pub fn get(&self, code: &str) -> Option<&Arc<Segment>> {
        self.segments.get(code)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.segments.keys().map(String::as_str)
    }

    fn differs_from(&self, next: &HashMap<String, Arc<Segment>>) -> bool {
        self.segments.len() != next.len()
            || next.iter().any(|(code, segment)| self.segments.get(code) != Some(segment))
    }
}

/// Outcome of a successful refresh cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshStats {
    pub generation: u64,
    pub segments: usize,
    pub changed: bool,
    pub duration_ms: u64,
}

/// Segment definitions mirrored from the definition store.
#[derive(Debug)]
pub struct SegmentRegistry {
    store: Arc<dyn DefinitionStore>,
    current: RwLock<Arc<RegistryGeneration>>,
}

impl SegmentRegistry {
    /// Creates an empty registry; call [`SegmentRegistry::refresh`] to populate it.
    pub fn new(store: Arc<dyn DefinitionStore>) -> Self {
        Self { store, current: RwLock::new(Arc::new(RegistryGeneration::default())) }
    }

    pub fn store(&self) -> &Arc<dyn DefinitionStore> {
        &self.store
    }

    /// The generation currently served to readers.
    pub fn current(&self) -> Arc<RegistryGeneration> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Looks a segment up, falling back to a direct store load on a miss.
    ///
    /// Directly loaded segments are not memoized; only refreshes populate the
    /// registry.
    #[instrument(skip(self))]
    pub async fn get(&self, code: &str) -> SegmentResult<Option<Arc<Segment>>> {
        if let Some(segment) = self.current().get(code) {
            return Ok(Some(Arc::clone(segment)));
        }
        debug!(%code, "Segment not in registry, loading from definition store");
        Ok(load_segment(self.store.as_ref(), code).await?.map(Arc::new))
    }

    /// Reloads every segment and its rules, then swaps in the new generation.
    ///
    /// On failure the current generation is left untouched.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> SegmentResult<RefreshStats> {
        let start = Instant::now();

        let rows = self.store.all_segments().await?;
        let mut segments = HashMap::with_capacity(rows.len());
        for mut segment in rows {
            segment.rules = self.store.rules_for_segment(segment.id).await?;
            for rule in &segment.rules {
                if let Err(e) = rule.validate() {
                    warn!(
                        segment = %segment.code,
                        rule_id = rule.id,
                        "Invalid rule definition: {}",
                        e
                    );
                }
            }
            segments.insert(segment.code.clone(), Arc::new(segment));
        }

        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let changed = current.differs_from(&segments);
        let next = RegistryGeneration {
            generation: current.generation + 1,
            loaded_at: Some(Utc::now()),
            segments,
        };
        let stats = RefreshStats {
            generation: next.generation,
            segments: next.len(),
            changed,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        *current = Arc::new(next);
        drop(current);

        if changed {
            info!(
                generation = stats.generation,
                segments = stats.segments,
                "Segment cache reloaded"
            );
        }
        Ok(stats)
    }

    /// Refreshes, keeping the last good generation if the store fails.
    pub async fn refresh_or_keep(&self) -> Option<RefreshStats> {
        match self.refresh().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                let current = self.current();
                warn!(
                    generation = current.generation,
                    segments = current.len(),
                    "Segment refresh failed, serving previous generation: {}",
                    e
                );
                None
            }
        }
    }
}
