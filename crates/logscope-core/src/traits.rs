//! Traits for durable log storage.
//!
//! This module provides the [`LogStorage`] trait that the pipeline persists
//! through, so the index, retention engine and ingestion path never depend on a
//! concrete on-disk layout.

use std::collections::HashSet;
use std::ops::AddAssign;

use serde::Serialize;

use crate::error::Result;
use crate::types::{EventId, LogEntry, Runtime};

/// Number of entries removed from each runtime partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeleteCounts {
    /// Entries removed from the backend partition
    pub backend: usize,
    /// Entries removed from the frontend partition
    pub frontend: usize,
}

impl DeleteCounts {
    /// Returns the combined count.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.backend + self.frontend
    }

    /// Adds `count` to the partition for `runtime`.
    pub fn record(&mut self, runtime: Runtime, count: usize) {
        match runtime {
            Runtime::Backend => self.backend += count,
            Runtime::Frontend => self.frontend += count,
        }
    }
}

impl AddAssign for DeleteCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.backend += rhs.backend;
        self.frontend += rhs.frontend;
    }
}

/// Append-only durable store partitioned by [`Runtime`].
///
/// Calls may block on I/O; async callers should run them on the blocking pool.
pub trait LogStorage: Send + Sync {
    /// Prepares the store (creates directories, files, etc.).
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be prepared.
    fn initialize(&self) -> Result<()>;

    /// Appends an entry to the partition of its runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be written.
    fn append_log(&self, entry: &LogEntry) -> Result<()>;

    /// Reads every entry of one partition in append order.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition cannot be read.
    fn read_logs(&self, runtime: Runtime) -> Result<Vec<LogEntry>>;

    /// Finds an entry by id across partitions.
    ///
    /// # Errors
    ///
    /// Returns an error only on read failure; a miss is `Ok(None)`.
    fn get_log_by_id(&self, event_id: &EventId) -> Result<Option<LogEntry>>;

    /// Deletes the given ids from every partition.
    ///
    /// # Errors
    ///
    /// Returns an error if a partition cannot be rewritten.
    fn delete_logs_by_ids(&self, event_ids: &HashSet<EventId>) -> Result<DeleteCounts>;

    /// Counts all stored entries.
    ///
    /// # Errors
    ///
    /// Returns an error if a partition cannot be read.
    fn total_log_count(&self) -> Result<usize>;

    /// Deletes every entry except those in `keep_ids`.
    ///
    /// # Errors
    ///
    /// Returns an error if a partition cannot be rewritten.
    fn clear_logs(&self, keep_ids: Option<&HashSet<EventId>>) -> Result<DeleteCounts>;

    /// Reads every partition, backend first.
    ///
    /// # Errors
    ///
    /// Returns an error if any partition cannot be read.
    fn read_all(&self) -> Result<Vec<LogEntry>> {
        let mut all = Vec::new();
        for runtime in Runtime::ALL {
            all.extend(self.read_logs(runtime)?);
        }
        Ok(all)
    }
}
