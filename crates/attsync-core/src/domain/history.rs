//! Sync history
//!
//! Each committed cycle appends one [`HistoryEntry`]. The [`HistoryLog`]
//! keeps only the most recent entries, evicting the oldest first. History
//! is observability data: it feeds the `status` command and the rendered
//! document, and is never read back by the reconciliation logic.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary of one committed sync cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    /// What triggered the cycle, e.g. `startup` or `watcher (3 changes)`
    #[serde(default)]
    pub reason: String,
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
    /// Planned operations never attempted, e.g. after an authorization failure
    #[serde(default)]
    pub skipped: usize,
}

impl HistoryEntry {
    /// Create an entry stamped with the current time
    pub fn now(
        reason: impl Into<String>,
        added: usize,
        updated: usize,
        deleted: usize,
        failed: usize,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            reason: reason.into(),
            added,
            updated,
            deleted,
            failed,
            skipped: 0,
        }
    }

    pub fn with_skipped(mut self, skipped: usize) -> Self {
        self.skipped = skipped;
        self
    }

    /// Human-readable one-line description
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.added > 0 {
            parts.push(format!("added {}", self.added));
        }
        if self.updated > 0 {
            parts.push(format!("updated {}", self.updated));
        }
        if self.deleted > 0 {
            parts.push(format!("deleted {}", self.deleted));
        }
        if self.failed > 0 {
            parts.push(format!("failed {}", self.failed));
        }
        if self.skipped > 0 {
            parts.push(format!("skipped {}", self.skipped));
        }
        if parts.is_empty() {
            "no changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Bounded ring of history entries, oldest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryLog {
    entries: VecDeque<HistoryEntry>,
    retention: usize,
}

impl HistoryLog {
    /// Create an empty log keeping at most `retention` entries (minimum 1)
    pub fn new(retention: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            retention: retention.max(1),
        }
    }

    /// Build a log from stored entries (oldest first), dropping any excess
    pub fn from_entries(entries: Vec<HistoryEntry>, retention: usize) -> Self {
        let mut log = Self::new(retention);
        for entry in entries {
            log.push(entry);
        }
        log
    }

    /// Append an entry, evicting the oldest ones past the retention limit
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.retention {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Entries oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Entries newest first, as displayed
    pub fn newest_first(&self) -> Vec<HistoryEntry> {
        self.entries.iter().rev().cloned().collect()
    }

    /// Consume the log, returning entries oldest first
    pub fn into_vec(self) -> Vec<HistoryEntry> {
        self.entries.into()
    }
}
