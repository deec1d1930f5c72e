#![allow(missing_docs)]
//! Core functionality for the audience segment engine.
//!
//! This crate decides whether an identifier belongs to a segment of ANDed
//! event-count rules, and resolves every member of a segment in bulk. Counts
//! come from an [`EventStore`]; definitions from a [`DefinitionStore`] mirrored
//! by the [`SegmentRegistry`].

/// Server-side aggregate cache and its admission policy
pub mod cache;
/// Translation of rules into backend-agnostic event filters
pub mod conditions;
/// Engine configuration
pub mod config;
/// Segment definition store capability
pub mod definition_store;
/// Check and membership facade
pub mod engine;
pub mod error;
/// Event store capability
pub mod event_store;
/// Bulk membership resolution by set intersection
pub mod intersection;
/// Scheduled registry refresh
pub mod refresh;
/// Generational in-memory segment registry
pub mod registry;

pub use audience_types::*;
pub use cache::{AggregateCache, CacheStats, CachedCount};
pub use conditions::{EventFilter, EventTable, build_filter};
pub use config::EngineConfig;
pub use definition_store::{DefinitionStore, InMemoryDefinitionStore};
pub use engine::{SegmentEngine, parse_overrides, parse_snapshot};
pub use error::{SegmentError, SegmentResult, StoreKind};
pub use event_store::{EventStore, InMemoryEventStore, TrackedEvent};
pub use intersection::IntersectionEngine;
pub use refresh::RegistryRefresher;
pub use registry::{RefreshStats, SegmentRegistry};
