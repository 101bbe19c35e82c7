//! Shared test doubles.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{LogError, Result};
use crate::hub::{DeliveryError, Deliverable};
use crate::traits::{DeleteCounts, LogStorage};
use crate::types::{EventId, LogEntry, Runtime};

/// In-memory [`LogStorage`] with switchable failures.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    partitions: Mutex<HashMap<Runtime, Vec<LogEntry>>>,
    pub fail_appends: AtomicBool,
    pub fail_reads: AtomicBool,
    pub fail_deletes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = LogEntry>) -> Self {
        let storage = Self::new();
        for entry in entries {
            storage
                .partitions
                .lock()
                .entry(entry.source.runtime)
                .or_default()
                .push(entry);
        }
        storage
    }

    pub fn ids(&self) -> HashSet<String> {
        self.partitions
            .lock()
            .values()
            .flatten()
            .map(|e| e.event_id.to_string())
            .collect()
    }

    fn injected(flag: &AtomicBool) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(LogError::Io(std::io::Error::other("injected failure")));
        }
        Ok(())
    }
}

impl LogStorage for MemoryStorage {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn append_log(&self, entry: &LogEntry) -> Result<()> {
        Self::injected(&self.fail_appends)?;
        self.partitions
            .lock()
            .entry(entry.source.runtime)
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    fn read_logs(&self, runtime: Runtime) -> Result<Vec<LogEntry>> {
        Self::injected(&self.fail_reads)?;
        Ok(self
            .partitions
            .lock()
            .get(&runtime)
            .cloned()
            .unwrap_or_default())
    }

    fn get_log_by_id(&self, event_id: &EventId) -> Result<Option<LogEntry>> {
        Self::injected(&self.fail_reads)?;
        Ok(self
            .partitions
            .lock()
            .values()
            .flatten()
            .find(|e| &e.event_id == event_id)
            .cloned())
    }

    fn delete_logs_by_ids(&self, event_ids: &HashSet<EventId>) -> Result<DeleteCounts> {
        Self::injected(&self.fail_deletes)?;
        let mut counts = DeleteCounts::default();
        for (runtime, entries) in self.partitions.lock().iter_mut() {
            let before = entries.len();
            entries.retain(|e| !event_ids.contains(&e.event_id));
            counts.record(*runtime, before - entries.len());
        }
        Ok(counts)
    }

    fn total_log_count(&self) -> Result<usize> {
        Self::injected(&self.fail_reads)?;
        Ok(self.partitions.lock().values().map(Vec::len).sum())
    }

    fn clear_logs(&self, keep_ids: Option<&HashSet<EventId>>) -> Result<DeleteCounts> {
        Self::injected(&self.fail_deletes)?;
        let mut counts = DeleteCounts::default();
        for (runtime, entries) in self.partitions.lock().iter_mut() {
            let before = entries.len();
            entries.retain(|e| keep_ids.is_some_and(|keep| keep.contains(&e.event_id)));
            counts.record(*runtime, before - entries.len());
        }
        Ok(counts)
    }
}

/// [`Deliverable`] that records every frame, optionally refusing them.
#[derive(Debug, Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<String>>,
    pub closed: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn closed() -> Self {
        let sink = Self::default();
        sink.closed.store(true, Ordering::SeqCst);
        sink
    }

    pub fn frames(&self) -> Vec<serde_json::Value> {
        self.frames
            .lock()
            .iter()
            .filter_map(|f| serde_json::from_str(f).ok())
            .collect()
    }

    pub fn frames_of_type(&self, kind: &str) -> Vec<serde_json::Value> {
        self.frames()
            .into_iter()
            .filter(|f| f["type"] == kind)
            .collect()
    }
}

impl Deliverable for RecordingSink {
    fn send(&self, frame: &str) -> std::result::Result<(), DeliveryError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DeliveryError::Closed);
        }
        self.frames.lock().push(frame.to_string());
        Ok(())
    }
}
