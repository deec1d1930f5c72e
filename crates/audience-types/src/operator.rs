use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors in a stored segment or rule definition.
///
/// Definitions are validated when they are written, so hitting one of these at
/// evaluation time means the definition store holds something it should not.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// The rule's operator is not one of `<`, `<=`, `=`, `>=`, `>`.
    #[error("unhandled operator '{operator}' in rule {rule_id}")]
    UnknownOperator {
        /// Rule carrying the operator, `0` when not known.
        rule_id: i64,
        /// Raw operator value as stored.
        operator: String,
    },

    /// The rule is structurally unusable (e.g. no event category).
    #[error("malformed rule {rule_id}: {reason}")]
    MalformedRule {
        /// Offending rule.
        rule_id: i64,
        /// Human readable explanation.
        reason: String,
    },
}

/// Comparison applied between an observed event count and a rule threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// `<`
    #[serde(rename = "<")]
    LessThan,
    /// `<=`
    #[serde(rename = "<=")]
    LessThanOrEqual,
    /// `=`
    #[serde(rename = "=")]
    Equal,
    /// `>=`
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    /// `>`
    #[serde(rename = ">")]
    GreaterThan,
}

impl Operator {
    /// All supported operators, in table order.
    pub const ALL: [Self; 5] = [
        Self::LessThan,
        Self::LessThanOrEqual,
        Self::Equal,
        Self::GreaterThanOrEqual,
        Self::GreaterThan,
    ];

    /// Evaluates `count <op> threshold`.
    #[must_use]
    pub const fn evaluate(self, count: u64, threshold: u64) -> bool {
        match self {
            Self::LessThanOrEqual => count <= threshold,
            Self::LessThan => count < threshold,
            Self::Equal => count == threshold,
            Self::GreaterThanOrEqual => count >= threshold,
            Self::GreaterThan => count > threshold,
        }
    }

    /// Symbol as stored in rule definitions.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::Equal => "=",
            Self::GreaterThanOrEqual => ">=",
            Self::GreaterThan => ">",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = DefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(Self::LessThan),
            "<=" => Ok(Self::LessThanOrEqual),
            "=" => Ok(Self::Equal),
            ">=" => Ok(Self::GreaterThanOrEqual),
            ">" => Ok(Self::GreaterThan),
            other => {
                Err(DefinitionError::UnknownOperator { rule_id: 0, operator: other.to_string() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_table() {
        assert!(Operator::LessThan.evaluate(2, 3));
        assert!(!Operator::LessThan.evaluate(3, 3));
        assert!(Operator::LessThanOrEqual.evaluate(3, 3));
        assert!(!Operator::LessThanOrEqual.evaluate(4, 3));
        assert!(Operator::Equal.evaluate(3, 3));
        assert!(!Operator::Equal.evaluate(4, 3));
        assert!(Operator::GreaterThanOrEqual.evaluate(3, 3));
        assert!(!Operator::GreaterThanOrEqual.evaluate(2, 3));
        assert!(Operator::GreaterThan.evaluate(4, 3));
        assert!(!Operator::GreaterThan.evaluate(3, 3));
    }

    #[test]
    fn parse_round_trips_symbols() {
        for op in Operator::ALL {
            assert_eq!(op.as_str().parse::<Operator>(), Ok(op));
        }
    }

    #[test]
    fn unknown_symbol_is_definition_error() {
        let err = "!=".parse::<Operator>().unwrap_err();
        assert!(matches!(
            err,
            DefinitionError::UnknownOperator { ref operator, .. } if operator == "!="
        ));
    }

    #[test]
    fn serde_uses_symbols() {
        let json = serde_json::to_string(&Operator::GreaterThanOrEqual).unwrap();
        assert_eq!(json, "\">=\"");
    }
}
