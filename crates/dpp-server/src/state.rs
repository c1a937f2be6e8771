//! Latest status per panel.
//!
//! Entries are created on the first event for a panel and overwritten by
//! every later one, in processing order. Nothing is ever evicted; the map
//! grows with the number of distinct panels seen since startup.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Status of one panel and when the relay recorded it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PanelStatus {
    /// Event kind of the most recently processed event.
    pub status: String,
    /// Wall-clock time the entry was written.
    pub updated_at: DateTime<Utc>,
}

/// Concurrent map from panel id to its latest status.
#[derive(Default)]
pub struct StateCache {
    entries: RwLock<HashMap<String, PanelStatus>>,
}

impl StateCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the status for `id`. Last call wins.
    pub fn set(&self, id: impl Into<String>, status: impl Into<String>) {
        let entry = PanelStatus {
            status: status.into(),
            updated_at: Utc::now(),
        };
        let _ = self.entries.write().insert(id.into(), entry);
    }

    /// Full record for one panel.
    pub fn get(&self, id: &str) -> Option<PanelStatus> {
        self.entries.read().get(id).cloned()
    }

    /// Point-in-time copy of `id → status`, sorted by id.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .read()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.status.clone()))
            .collect()
    }

    /// Number of tracked panels.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no panel has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
