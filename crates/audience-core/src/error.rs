//! Error handling for the audience engine
//!
//! Every failure a check or membership resolution can surface is a
//! [`SegmentError`]. Unknown segments are not errors; lookups return `Ok(None)`.

use audience_types::DefinitionError;
use std::fmt;
use thiserror::Error;

/// Error type for segment evaluation and resolution
#[derive(Error, Debug, Clone)]
pub enum SegmentError {
    /// Stored segment or rule definition is unusable
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    /// Caller-supplied rule overrides could not be parsed
    #[error("Invalid format of fields JSON string: {message}")]
    OverrideFormat { message: String },

    /// Caller-supplied round-trip snapshot could not be parsed
    #[error("Invalid format of cache JSON string: {message}")]
    SnapshotFormat { message: String },

    /// Event store or definition store I/O failure
    #[error("{store} unavailable: {message}")]
    StoreUnavailable { store: StoreKind, message: String },

    /// Invalid engine configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

/// Which external store failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    EventStore,
    DefinitionStore,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::EventStore => write!(f, "event store"),
            StoreKind::DefinitionStore => write!(f, "definition store"),
        }
    }
}

impl SegmentError {
    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            SegmentError::Definition(_) => "definition",
            SegmentError::OverrideFormat { .. } => "override_format",
            SegmentError::SnapshotFormat { .. } => "snapshot_format",
            SegmentError::StoreUnavailable { .. } => "store_unavailable",
            SegmentError::Configuration { .. } => "configuration",
        }
    }

    /// Whether the caller may retry the whole operation.
    ///
    /// The engine never retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SegmentError::StoreUnavailable { .. })
    }

    /// Whether the error was caused by caller input
    pub fn is_caller_error(&self) -> bool {
        matches!(self, SegmentError::OverrideFormat { .. } | SegmentError::SnapshotFormat { .. })
    }

    pub fn event_store(message: impl Into<String>) -> Self {
        Self::StoreUnavailable { store: StoreKind::EventStore, message: message.into() }
    }

    pub fn definition_store(message: impl Into<String>) -> Self {
        Self::StoreUnavailable { store: StoreKind::DefinitionStore, message: message.into() }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }
}

/// Result type alias for engine operations
pub type SegmentResult<T> = Result<T, SegmentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_failures_are_retryable() {
        assert!(SegmentError::event_store("timeout").is_retryable());
        assert!(SegmentError::definition_store("connection refused").is_retryable());
        assert!(!SegmentError::OverrideFormat { message: "eof".into() }.is_retryable());

        let definition: SegmentError =
            DefinitionError::UnknownOperator { rule_id: 1, operator: "!".into() }.into();
        assert!(!definition.is_retryable());
        assert_eq!(definition.category(), "definition");
    }

    #[test]
    fn store_failures_name_the_store() {
        let err = SegmentError::event_store("timeout");
        assert_eq!(err.to_string(), "event store unavailable: timeout");
    }

    #[test]
    fn caller_errors() {
        assert!(SegmentError::SnapshotFormat { message: "eof".into() }.is_caller_error());
        assert!(!SegmentError::configuration("bad").is_caller_error());
    }
}
