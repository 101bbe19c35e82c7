//! Bounded in-memory index over the most recent log entries.
//!
//! This module provides:
//! - [`QueryIndex`]: FIFO-bounded collection with O(1) lookup by event id
//! - Multi-predicate filtered search with pagination

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::types::{EventId, LogEntry, LogRecord, QueryFilter, QueryResult};

/// Default number of resident entries.
pub const DEFAULT_MAX_SIZE: usize = 10_000;

/// The ordered collection and its lookup map, always mutated together.
#[derive(Debug, Default)]
struct IndexState {
    /// Resident entries, oldest first by insertion
    entries: VecDeque<Arc<LogEntry>>,
    /// Fast lookup by event id
    by_id: HashMap<EventId, Arc<LogEntry>>,
}

impl IndexState {
    fn push(&mut self, entry: Arc<LogEntry>) {
        self.by_id.insert(entry.event_id.clone(), Arc::clone(&entry));
        self.entries.push_back(entry);
    }

    fn evict_oldest(&mut self) -> Option<Arc<LogEntry>> {
        let oldest = self.entries.pop_front()?;
        self.by_id.remove(&oldest.event_id);
        Some(oldest)
    }

    fn retain(&mut self, keep: impl Fn(&LogEntry) -> bool) {
        self.entries.retain(|entry| keep(&**entry));
        self.by_id.retain(|_, entry| keep(&**entry));
    }
}

/// Bounded, insertion-ordered index of log entries.
///
/// Holds at most `max_size` entries. A single reader-writer lock guards the
/// ordered collection together with the lookup map, so readers never see one
/// without the other.
#[derive(Debug)]
pub struct QueryIndex {
    max_size: usize,
    state: RwLock<IndexState>,
}

impl Default for QueryIndex {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl QueryIndex {
    /// Creates an empty index holding at most `max_size` entries.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Returns the capacity fixed at construction.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns the number of resident entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Returns true if no entries are resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Replaces the index contents with `entries`.
    ///
    /// Only the last `max_size` entries are kept; older ones stay in storage
    /// but are not resident.
    pub fn build(&self, entries: Vec<LogEntry>) {
        let skip = entries.len().saturating_sub(self.max_size);
        let mut fresh = IndexState::default();
        for entry in entries.into_iter().skip(skip) {
            fresh.push(Arc::new(entry));
        }

        debug!(resident = fresh.entries.len(), dropped = skip, "Rebuilt query index");
        *self.state.write() = fresh;
    }

    /// Appends an entry, evicting the oldest resident entry when full.
    pub fn add(&self, entry: LogEntry) {
        let mut state = self.state.write();
        while state.entries.len() >= self.max_size {
            if state.evict_oldest().is_none() {
                break;
            }
        }
        if self.max_size > 0 {
            state.push(Arc::new(entry));
        }
    }

    /// Looks up an entry by id.
    ///
    /// `None` is a normal outcome: the entry may only exist in storage.
    #[must_use]
    pub fn get_by_id(&self, event_id: &EventId) -> Option<LogEntry> {
        self.state
            .read()
            .by_id
            .get(event_id)
            .map(|entry| LogEntry::clone(entry))
    }

    /// Returns true if the entry is resident.
    #[must_use]
    pub fn contains(&self, event_id: &EventId) -> bool {
        self.state.read().by_id.contains_key(event_id)
    }

    /// Searches resident entries in insertion order.
    ///
    /// `total` counts every match; `entries` holds one page of them.
    #[must_use]
    pub fn query(&self, filter: &QueryFilter) -> QueryResult {
        let offset = filter.effective_offset();
        let limit = filter.effective_limit();
        let lightweight = filter.is_lightweight();

        let state = self.state.read();
        let mut total = 0;
        let mut entries = Vec::new();

        for entry in state.entries.iter().filter(|e| e.matches(filter)) {
            if total >= offset && entries.len() < limit {
                entries.push(if lightweight {
                    LogRecord::Summary(entry.summary())
                } else {
                    LogRecord::Full(LogEntry::clone(entry))
                });
            }
            total += 1;
        }

        QueryResult { entries, total }
    }

    /// Removes the given ids. Ids that are not resident are ignored.
    pub fn remove_by_ids(&self, event_ids: &HashSet<EventId>) {
        if event_ids.is_empty() {
            return;
        }
        self.state
            .write()
            .retain(|entry| !event_ids.contains(&entry.event_id));
    }

    /// Removes every entry except those whose id is in `keep_ids`.
    pub fn clear(&self, keep_ids: Option<&HashSet<EventId>>) {
        let mut state = self.state.write();
        match keep_ids {
            Some(keep) => state.retain(|entry| keep.contains(&entry.event_id)),
            None => *state = IndexState::default(),
        }
    }

    /// Returns a copy of all resident entries in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.state
            .read()
            .entries
            .iter()
            .map(|entry| LogEntry::clone(entry))
            .collect()
    }
}
