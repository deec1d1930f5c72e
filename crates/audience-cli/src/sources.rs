//! File-backed stores for the command line
//!
//! Definitions are a JSON array of segments with their rules. Events are JSON
//! lines, one tracked event per line.

use anyhow::{Context, Result};
use audience_core::{InMemoryDefinitionStore, InMemoryEventStore, Segment, TrackedEvent};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

pub fn load_definitions(path: &Path) -> Result<InMemoryDefinitionStore> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("unable to read definitions from '{}'", path.display()))?;
    let segments: Vec<Segment> = serde_json::from_str(&raw)
        .with_context(|| format!("invalid segment definitions in '{}'", path.display()))?;

    for segment in &segments {
        for rule in &segment.rules {
            if let Err(e) = rule.validate() {
                warn!(segment = %segment.code, "Invalid rule definition: {}", e);
            }
        }
    }

    debug!(segments = segments.len(), "Loaded segment definitions");
    Ok(InMemoryDefinitionStore::new(segments))
}

/// Reads JSON-lines events. A missing file is an empty store.
pub fn load_events(path: &Path) -> Result<InMemoryEventStore> {
    if !path.exists() {
        warn!("Events file '{}' not found, counting against no events", path.display());
        return Ok(InMemoryEventStore::new());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("unable to read events from '{}'", path.display()))?;
    let mut events = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event: TrackedEvent = serde_json::from_str(line).with_context(|| {
            format!("invalid event on line {} of '{}'", index + 1, path.display())
        })?;
        events.push(event);
    }

    debug!(events = events.len(), "Loaded tracked events");
    Ok(InMemoryEventStore::with_events(events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn events_skip_blank_lines_and_report_bad_ones() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let pageview = serde_json::json!({
            "category": "pageview", "action": "load", "user_id": "u1",
            "time": "2024-03-01T11:00:00Z"
        });
        let purchase = serde_json::json!({
            "category": "commerce", "action": "purchase", "user_id": "u1",
            "time": "2024-03-01T11:05:00Z"
        });
        writeln!(file, "{pageview}").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{purchase}").unwrap();
        assert_eq!(load_events(file.path()).unwrap().len(), 2);

        writeln!(file, "not json").unwrap();
        let err = load_events(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("line 4"));
    }

    #[test]
    fn missing_events_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_events(&dir.path().join("none.jsonl")).unwrap().is_empty());
    }

    #[test]
    fn definitions_must_exist_and_parse() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_definitions(&dir.path().join("none.json")).is_err());

        let path = dir.path().join("segments.json");
        fs::write(&path, "{}").unwrap();
        assert!(load_definitions(&path).is_err());

        fs::write(&path, "[]").unwrap();
        assert!(load_definitions(&path).is_ok());
    }
}
