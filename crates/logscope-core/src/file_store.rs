//! File-based log storage partitioned by runtime.
//!
//! This module provides:
//! - [`FileLogStorage`]: Persistent storage backed by one JSON-lines file per runtime
//! - Implementation of [`LogStorage`]
//!
//! Deletions rewrite the affected partition through a temporary file that is
//! renamed over the original, so a crash mid-rewrite leaves the old file intact.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::Result;
use crate::traits::{DeleteCounts, LogStorage};
use crate::types::{EventId, LogEntry, Runtime};

/// File extension used for partition files.
const PARTITION_EXT: &str = "jsonl";

/// File-based log storage.
///
/// Stores entries as JSON-lines in `<dir>/backend.jsonl` and
/// `<dir>/frontend.jsonl`. All file access is serialized through one lock.
pub struct FileLogStorage {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl FileLogStorage {
    /// Creates a storage rooted at `dir`. Nothing is touched on disk until
    /// [`LogStorage::initialize`] or the first append.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: RwLock::new(()),
        }
    }

    /// Returns the storage directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the partition file for `runtime`.
    #[must_use]
    pub fn partition_path(&self, runtime: Runtime) -> PathBuf {
        self.dir.join(format!("{}.{PARTITION_EXT}", runtime.as_str()))
    }

    // ========== Internal Methods ==========

    fn read_partition(path: &Path) -> Result<Vec<LogEntry>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    error = %e,
                    "Skipping malformed log line"
                ),
            }
        }
        Ok(entries)
    }

    fn write_partition(path: &Path, entries: &[LogEntry]) -> Result<()> {
        let tmp = path.with_extension(format!("{PARTITION_EXT}.tmp"));
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            for entry in entries {
                serde_json::to_writer(&mut writer, entry)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Keeps only the entries of one partition for which `keep` holds.
    /// Returns the number removed; the file is untouched when nothing goes.
    fn retain_partition(&self, runtime: Runtime, keep: impl Fn(&LogEntry) -> bool) -> Result<usize> {
        let path = self.partition_path(runtime);
        let entries = Self::read_partition(&path)?;
        let before = entries.len();
        let kept: Vec<LogEntry> = entries.into_iter().filter(|e| keep(e)).collect();
        let removed = before - kept.len();
        if removed > 0 {
            Self::write_partition(&path, &kept)?;
        }
        Ok(removed)
    }
}

impl LogStorage for FileLogStorage {
    fn initialize(&self) -> Result<()> {
        let _guard = self.lock.write();
        fs::create_dir_all(&self.dir)?;
        for runtime in Runtime::ALL {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.partition_path(runtime))?;
        }
        debug!(dir = %self.dir.display(), "Log storage initialized");
        Ok(())
    }

    fn append_log(&self, entry: &LogEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.lock.write();
        fs::create_dir_all(&self.dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.partition_path(entry.source.runtime))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    fn read_logs(&self, runtime: Runtime) -> Result<Vec<LogEntry>> {
        let _guard = self.lock.read();
        Self::read_partition(&self.partition_path(runtime))
    }

    fn get_log_by_id(&self, event_id: &EventId) -> Result<Option<LogEntry>> {
        let _guard = self.lock.read();
        for runtime in Runtime::ALL {
            let found = Self::read_partition(&self.partition_path(runtime))?
                .into_iter()
                .find(|e| &e.event_id == event_id);
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    fn delete_logs_by_ids(&self, event_ids: &HashSet<EventId>) -> Result<DeleteCounts> {
        let mut counts = DeleteCounts::default();
        if event_ids.is_empty() {
            return Ok(counts);
        }

        let _guard = self.lock.write();
        for runtime in Runtime::ALL {
            let removed = self.retain_partition(runtime, |e| !event_ids.contains(&e.event_id))?;
            counts.record(runtime, removed);
        }
        Ok(counts)
    }

    fn total_log_count(&self) -> Result<usize> {
        let _guard = self.lock.read();
        let mut total = 0;
        for runtime in Runtime::ALL {
            total += Self::read_partition(&self.partition_path(runtime))?.len();
        }
        Ok(total)
    }

    fn clear_logs(&self, keep_ids: Option<&HashSet<EventId>>) -> Result<DeleteCounts> {
        let mut counts = DeleteCounts::default();
        let _guard = self.lock.write();
        for runtime in Runtime::ALL {
            let removed = self.retain_partition(runtime, |e| {
                keep_ids.is_some_and(|keep| keep.contains(&e.event_id))
            })?;
            counts.record(runtime, removed);
        }
        Ok(counts)
    }
}
