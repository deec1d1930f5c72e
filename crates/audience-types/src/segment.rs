use crate::operator::{DefinitionError, Operator};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifier of a segment row in the definition store.
pub type SegmentId = i64;
/// Identifier of a rule row in the definition store.
pub type RuleId = i64;

/// Which identifier namespace a check targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    /// Logged-in user, possibly spanning several devices.
    User,
    /// Single browser instance.
    Browser,
}

impl IdentifierKind {
    /// Event field holding identifiers of this kind.
    #[must_use]
    pub const fn field(self) -> &'static str {
        match self {
            Self::User => "user_id",
            Self::Browser => "browser_id",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Browser => f.write_str("browser"),
        }
    }
}

/// Grouping metadata used by administration screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentGroup {
    /// Group row id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Sort position.
    #[serde(default)]
    pub sorting: i64,
}

/// Named audience definition whose rules are ANDed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Segment row id.
    pub id: SegmentId,
    /// Unique, stable code used for lookups.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Whether the segment is enabled for targeting.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Optional group the segment is filed under.
    #[serde(default)]
    pub group: Option<SegmentGroup>,
    /// Rules, all of which must hold.
    #[serde(default)]
    pub rules: Vec<SegmentRule>,
}

const fn default_active() -> bool {
    true
}

/// Key/value pair used for field and flag conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleCondition {
    /// Event field name.
    pub key: String,
    /// Required value; empty means "no condition".
    #[serde(default)]
    pub value: String,
}

impl RuleCondition {
    /// Builds a condition from anything string-like.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

/// Threshold condition over a count of matching events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRule {
    /// Rule row id.
    pub id: RuleId,
    /// Owning segment.
    pub segment_id: SegmentId,
    /// Event category (`pageview`, `commerce` or a custom one).
    pub event_category: String,
    /// Event action (funnel step for `commerce`).
    pub event_action: String,
    /// Raw operator as stored; parsed at evaluation time.
    pub operator: String,
    /// Threshold the count is compared with.
    pub count: u64,
    /// Rolling window in minutes, `None` for all history.
    #[serde(default)]
    pub timespan: Option<u32>,
    /// Field conditions whose values callers may override.
    #[serde(default)]
    pub fields: Vec<RuleCondition>,
    /// Fixed flag conditions.
    #[serde(default)]
    pub flags: Vec<RuleCondition>,
}

impl SegmentRule {
    /// Parses the stored operator, tagging failures with this rule's id.
    pub fn operator(&self) -> Result<Operator, DefinitionError> {
        self.operator.parse().map_err(|_| DefinitionError::UnknownOperator {
            rule_id: self.id,
            operator: self.operator.clone(),
        })
    }

    /// Evaluates the rule against an observed count.
    ///
    /// Fails closed: an unknown operator is an error, never a default outcome.
    pub fn evaluate(&self, count: u64) -> Result<bool, DefinitionError> {
        Ok(self.operator()?.evaluate(count, self.count))
    }

    /// Checks the parts of a rule the engine relies on.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        self.operator()?;
        if self.event_category.is_empty() {
            return Err(DefinitionError::MalformedRule {
                rule_id: self.id,
                reason: "event category is empty".to_string(),
            });
        }
        Ok(())
    }

    /// `category/action` label used to tell clients which events feed this rule.
    #[must_use]
    pub fn event_label(&self) -> String {
        format!("{}/{}", self.event_category, self.event_action)
    }
}

/// Per-request replacements for field condition defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleOverrides {
    /// Field key to caller-supplied value.
    pub fields: HashMap<String, String>,
}

impl RuleOverrides {
    /// Parses the flat `{"field": "value"}` JSON object callers send.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Adds or replaces one override.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Value supplied for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}
