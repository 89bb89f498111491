//! Structured sequencing log: the audit trail of navigation decisions.
//!
//! Every entry is also emitted through `tracing`; the structured copy is only
//! kept when `NavigatorConfig::record_sequencing_log` is set.

use crate::sequencing::NavigationCommand;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencingEventType {
    /// A step inside the sequencing process (skip, flow, rule fired).
    IntermediateNavigation,
    /// Outcome of a whole navigation request.
    FinalNavigation,
    Rollup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencingLogEntry {
    pub timestamp: DateTime<Utc>,
    pub event: SequencingEventType,
    pub command: Option<NavigationCommand>,
    /// Key of the activity the entry is about.
    pub activity: Option<String>,
    pub message: String,
}

/// Append-only list of entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequencingLog {
    entries: Vec<SequencingLogEntry>,
}

impl SequencingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[SequencingLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, entry: SequencingLogEntry) {
        self.entries.push(entry);
    }

    /// Move every entry of `other` to the end of this log.
    pub fn append(&mut self, other: &mut SequencingLog) {
        self.entries.append(&mut other.entries);
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries)
    }
}

/// Emit one event through `tracing` at the level its type calls for.
pub(crate) fn emit(
    event: SequencingEventType,
    command: Option<NavigationCommand>,
    activity: Option<&str>,
    message: &str,
) {
    let command = command.map(|c| c.as_str()).unwrap_or("-");
    let activity = activity.unwrap_or("-");
    match event {
        SequencingEventType::FinalNavigation => info!(command, activity, "{message}"),
        SequencingEventType::IntermediateNavigation => debug!(command, activity, "{message}"),
        SequencingEventType::Rollup => trace!(command, activity, "{message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(message: &str) -> SequencingLogEntry {
        SequencingLogEntry {
            timestamp: Utc::now(),
            event: SequencingEventType::FinalNavigation,
            command: Some(NavigationCommand::Continue),
            activity: Some("a".into()),
            message: message.into(),
        }
    }

    #[test]
    fn test_append_drains_other() {
        let mut log = SequencingLog::new();
        log.push(entry("first"));
        let mut other = SequencingLog::new();
        other.push(entry("second"));

        log.append(&mut other);
        assert_eq!(log.len(), 2);
        assert!(other.is_empty());
        assert_eq!(log.entries()[1].message, "second");
    }

    #[test]
    fn test_json_uses_snake_case_names() {
        let mut log = SequencingLog::new();
        log.push(entry("done"));
        let json = log.to_json().unwrap();
        assert!(json.contains("\"final_navigation\""));
        assert!(json.contains("\"continue\""));
    }
}
