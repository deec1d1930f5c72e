use crate::segment::{RuleId, Segment, SegmentGroup};
use crate::snapshot::RoundTripSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lightweight listing row for a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentSummary {
    /// Unique segment code.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Group the segment is filed under.
    #[serde(default)]
    pub group: Option<SegmentGroup>,
}

impl From<&Segment> for SegmentSummary {
    fn from(segment: &Segment) -> Self {
        Self {
            code: segment.code.clone(),
            name: segment.name.clone(),
            group: segment.group.clone(),
        }
    }
}

/// Outcome of a single-identifier membership check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentCheck {
    /// Whether the identifier belongs to the segment.
    pub check: bool,
    /// Updated round-trip snapshot to resubmit on the next check.
    pub cache: RoundTripSnapshot,
    /// `category/action` to the rules counting those events.
    pub event_rules: BTreeMap<String, Vec<RuleId>>,
    /// Rule to the field keys callers may override.
    pub overridable_fields: BTreeMap<RuleId, Vec<String>>,
    /// Rule to its flag conditions.
    pub flags: BTreeMap<RuleId, BTreeMap<String, String>>,
}

impl SegmentCheck {
    /// Builds a check result, deriving the rule metadata from `segment`.
    #[must_use]
    pub fn new(segment: &Segment, check: bool, cache: RoundTripSnapshot) -> Self {
        let mut event_rules: BTreeMap<String, Vec<RuleId>> = BTreeMap::new();
        let mut overridable_fields = BTreeMap::new();
        let mut flags = BTreeMap::new();

        for rule in &segment.rules {
            event_rules.entry(rule.event_label()).or_default().push(rule.id);
            overridable_fields.insert(
                rule.id,
                rule.fields.iter().filter(|f| !f.key.is_empty()).map(|f| f.key.clone()).collect(),
            );
            flags.insert(
                rule.id,
                rule.flags.iter().map(|f| (f.key.clone(), f.value.clone())).collect(),
            );
        }

        Self { check, cache, event_rules, overridable_fields, flags }
    }
}
