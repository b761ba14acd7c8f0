//! Bounded trailing activity log.

use std::collections::VecDeque;

use shared::domain::LogEntry;

/// Retention window of the operator-facing activity log.
pub const LOG_CAPACITY: usize = 10;

/// Append-only ring of the most recent entries. Older entries are evicted
/// silently and never persisted; no component reads the log for control
/// decisions.
#[derive(Debug, Default)]
pub struct ActivityLog {
    entries: VecDeque<LogEntry>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() == LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Entries in insertion order, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
