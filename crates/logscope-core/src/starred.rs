//! Pinned entries that retention must never delete.
//!
//! The set lives in memory and is mirrored to a pretty-printed JSON array of
//! ids after every mutation.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::types::EventId;

/// File name of the persisted set inside the log directory.
pub const STARRED_FILE: &str = "starred.json";

/// Set of starred event ids with file persistence.
#[derive(Debug)]
pub struct StarredSet {
    path: PathBuf,
    ids: RwLock<HashSet<EventId>>,
}

impl StarredSet {
    /// Creates an empty set persisted at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ids: RwLock::new(HashSet::new()),
        }
    }

    /// Creates an empty set persisted as [`STARRED_FILE`] inside `log_dir`.
    #[must_use]
    pub fn in_dir(log_dir: impl AsRef<Path>) -> Self {
        Self::new(log_dir.as_ref().join(STARRED_FILE))
    }

    /// Returns the persistence path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the in-memory set with the persisted one.
    ///
    /// A missing file yields an empty set. Array members that are not strings
    /// are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<usize> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No starred file, starting empty");
                self.ids.write().clear();
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        let values: Vec<serde_json::Value> = serde_json::from_str(&raw)?;
        let total = values.len();
        let loaded: HashSet<EventId> = values
            .into_iter()
            .filter_map(|v| v.as_str().map(EventId::from))
            .collect();
        if loaded.len() < total {
            warn!(dropped = total - loaded.len(), "Ignored non-string starred ids");
        }

        let count = loaded.len();
        *self.ids.write() = loaded;
        info!(count, "Loaded starred ids");
        Ok(count)
    }

    /// Stars `id` and persists. Starring a member again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the set cannot be persisted; the set is left
    /// unchanged.
    pub fn add(&self, id: EventId) -> Result<()> {
        let mut ids = self.ids.write();
        if !ids.insert(id.clone()) {
            return Ok(());
        }
        self.persist(&ids).inspect_err(|_| {
            ids.remove(&id);
        })
    }

    /// Unstars `id` and persists. Removing a non-member is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the set cannot be persisted; the set is left
    /// unchanged.
    pub fn remove(&self, id: &EventId) -> Result<()> {
        let mut ids = self.ids.write();
        if !ids.remove(id) {
            return Ok(());
        }
        self.persist(&ids).inspect_err(|_| {
            ids.insert(id.clone());
        })
    }

    /// Checks membership without touching the file.
    #[must_use]
    pub fn is_starred(&self, id: &EventId) -> bool {
        self.ids.read().contains(id)
    }

    /// Returns a copy of the set.
    #[must_use]
    pub fn get_all(&self) -> HashSet<EventId> {
        self.ids.read().clone()
    }

    /// Returns the members in sorted order.
    #[must_use]
    pub fn sorted(&self) -> Vec<EventId> {
        let mut ids: Vec<EventId> = self.ids.read().iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the number of starred ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.read().len()
    }

    /// Returns true if nothing is starred.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.read().is_empty()
    }

    /// Empties the set and persists.
    ///
    /// # Errors
    ///
    /// Returns an error if the set cannot be persisted; the set is left
    /// unchanged.
    pub fn clear(&self) -> Result<()> {
        let mut ids = self.ids.write();
        let previous = std::mem::take(&mut *ids);
        self.persist(&ids).inspect_err(|_| {
            *ids = previous;
        })
    }

    fn persist(&self, ids: &HashSet<EventId>) -> Result<()> {
        let mut sorted: Vec<&EventId> = ids.iter().collect();
        sorted.sort();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&sorted)?)?;
        Ok(())
    }
}
