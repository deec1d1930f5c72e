//! Audience Types
//!
//! This crate defines the data model shared by the audience crates: segment and
//! rule definitions, the rule operator table, per-request overrides and the
//! caller-owned round-trip snapshot. Keeping them here lets `audience-core` and
//! the CLI agree on wire formats without depending on each other.

#![warn(missing_docs)]

mod check;
mod operator;
mod segment;
mod snapshot;

pub use check::{SegmentCheck, SegmentSummary};
pub use operator::{DefinitionError, Operator};
pub use segment::{
    IdentifierKind, RuleCondition, RuleId, RuleOverrides, Segment, SegmentGroup, SegmentId,
    SegmentRule,
};
pub use snapshot::{RoundTripSnapshot, RuleCacheEntry};

/// Event category whose events live in the pageviews table with an implicit `load` action.
pub const CATEGORY_PAGEVIEW: &str = "pageview";
/// Event category whose events live in the commerce table keyed by funnel step.
pub const CATEGORY_COMMERCE: &str = "commerce";
