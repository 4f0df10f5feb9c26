//! Bounded orchestration log
//!
//! In-memory display sink for transitions and delegation outcomes. Oldest
//! entries are evicted once the capacity is reached. Every entry is mirrored
//! to `tracing`.

use super::state::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};

pub const DEFAULT_LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Which execution path produced an entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPath {
    Remote,
    Fallback,
}

impl ExecutionPath {
    fn tag(&self) -> &'static str {
        match self {
            ExecutionPath::Remote => "[remote]",
            ExecutionPath::Fallback => "[fallback]",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub stage: Stage,
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<ExecutionPath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl LogEntry {
    pub fn new(stage: Stage, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stage,
            message: message.into(),
            severity,
            path: None,
            project_id: None,
        }
    }

    /// Tag with the execution path; the message text carries the tag too
    pub fn on_path(mut self, path: ExecutionPath) -> Self {
        self.message = format!("{} {}", path.tag(), self.message);
        self.path = Some(path);
        self
    }

    pub fn for_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

/// Shared handle to a bounded log
#[derive(Clone)]
pub struct OrchestrationLog {
    capacity: usize,
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
}

impl OrchestrationLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    /// Append one entry, evicting the oldest when full
    pub fn push(&self, entry: LogEntry) {
        match entry.severity {
            Severity::Error => error!(stage = ?entry.stage, "{}", entry.message),
            Severity::Warning => warn!(stage = ?entry.stage, "{}", entry.message),
            Severity::Info | Severity::Success => info!(stage = ?entry.stage, "{}", entry.message),
        }

        let mut entries = self.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Snapshot, oldest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Entries for one project, oldest first
    pub fn for_project(&self, project_id: &str) -> Vec<LogEntry> {
        self.lock()
            .iter()
            .filter(|e| e.project_id.as_deref() == Some(project_id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for OrchestrationLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_past_capacity() {
        let log = OrchestrationLog::default();
        for i in 0..101 {
            log.push(LogEntry::new(Stage::Analyzing, Severity::Info, format!("entry {}", i)));
        }
        let entries = log.entries();
        assert_eq!(entries.len(), 100);
        assert_eq!(entries[0].message, "entry 1");
        assert_eq!(entries[99].message, "entry 100");
    }

    #[test]
    fn test_path_tag_in_message() {
        let remote = LogEntry::new(Stage::Monitoring, Severity::Info, "monitoring").on_path(ExecutionPath::Remote);
        let fallback = LogEntry::new(Stage::Monitoring, Severity::Info, "monitoring").on_path(ExecutionPath::Fallback);
        assert!(remote.message.starts_with("[remote]"));
        assert!(fallback.message.starts_with("[fallback]"));
        assert_ne!(remote.message, fallback.message);
    }

    #[test]
    fn test_clones_share_entries() {
        let log = OrchestrationLog::new(5);
        let handle = log.clone();
        handle.push(LogEntry::new(Stage::Idle, Severity::Info, "hello").for_project("p1"));
        assert_eq!(log.len(), 1);
        assert_eq!(log.for_project("p1").len(), 1);
        assert!(log.for_project("p2").is_empty());
    }
}
