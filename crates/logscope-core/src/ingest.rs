//! Ingestion and the service operations built on top of it.
//!
//! [`LogService`] ties storage, the query index, the broadcast hub and the
//! starred set together. Ingestion persists first; only a persisted entry is
//! indexed and broadcast.

use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::hub::BroadcastHub;
use crate::index::QueryIndex;
use crate::retention::{RetentionEngine, SweepReport};
use crate::starred::StarredSet;
use crate::traits::{DeleteCounts, LogStorage};
use crate::types::{EventId, IncomingLog, LogEntry, QueryFilter, QueryResult, Runtime};

/// Entry counts per partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StorageHealth {
    /// Entries in the backend partition
    pub backend: usize,
    /// Entries in the frontend partition
    pub frontend: usize,
    /// Sum of both partitions
    pub total: usize,
    /// Entries currently resident in the query index
    pub indexed: usize,
}

/// The log pipeline as seen by a transport.
pub struct LogService {
    storage: Arc<dyn LogStorage>,
    index: Arc<QueryIndex>,
    hub: Arc<BroadcastHub>,
    starred: Arc<StarredSet>,
    retention: Arc<RetentionEngine>,
}

impl std::fmt::Debug for LogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogService")
            .field("indexed", &self.index.len())
            .field("subscribers", &self.hub.active_count())
            .finish_non_exhaustive()
    }
}

impl LogService {
    /// Creates a service over the given components.
    ///
    /// The retention engine must share the same storage, index and starred set.
    #[must_use]
    pub fn new(
        storage: Arc<dyn LogStorage>,
        index: Arc<QueryIndex>,
        hub: Arc<BroadcastHub>,
        starred: Arc<StarredSet>,
        retention: Arc<RetentionEngine>,
    ) -> Self {
        Self {
            storage,
            index,
            hub,
            starred,
            retention,
        }
    }

    /// Prepares storage, loads the starred set and fills the index from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be initialized or read, or the
    /// starred file is unreadable.
    pub fn bootstrap(&self) -> Result<usize> {
        self.storage.initialize()?;
        self.starred.load()?;
        let mut entries = self.storage.read_all()?;
        // Partitions are read one after the other; interleave them by time so
        // the index keeps the newest entries. Unparseable timestamps sort first.
        entries.sort_by_key(LogEntry::parsed_timestamp);
        let on_disk = entries.len();
        self.index.build(entries);
        info!(on_disk, indexed = self.index.len(), "Query index built from storage");
        Ok(on_disk)
    }

    /// Returns the broadcast hub.
    #[must_use]
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Returns the query index.
    #[must_use]
    pub fn index(&self) -> &Arc<QueryIndex> {
        &self.index
    }

    /// Returns the retention engine.
    #[must_use]
    pub fn retention(&self) -> &Arc<RetentionEngine> {
        &self.retention
    }

    /// Assigns an id, persists, indexes and broadcasts one event.
    ///
    /// Indexing and broadcast are best-effort once the entry is persisted.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the entry cannot be persisted; nothing is
    /// indexed or broadcast in that case.
    pub fn ingest(&self, incoming: IncomingLog) -> Result<LogEntry> {
        let entry = incoming.into_entry(EventId::generate());
        self.storage.append_log(&entry)?;

        let indexed = catch_unwind(AssertUnwindSafe(|| self.index.add(entry.clone())));
        if indexed.is_err() {
            warn!(event_id = %entry.event_id, "Entry persisted but not indexed");
        }

        let delivered = self.hub.broadcast(&entry);
        debug!(
            event_id = %entry.event_id,
            level = %entry.level,
            runtime = %entry.source.runtime,
            delivered,
            "Log ingested"
        );
        Ok(entry)
    }

    /// Runs a query against the index.
    #[must_use]
    pub fn search(&self, filter: &QueryFilter) -> QueryResult {
        self.index.query(filter)
    }

    /// Looks an entry up in the index, falling back to storage.
    ///
    /// # Errors
    ///
    /// Returns an error only if the storage fallback fails to read.
    pub fn get_log(&self, event_id: &EventId) -> Result<Option<LogEntry>> {
        if let Some(entry) = self.index.get_by_id(event_id) {
            return Ok(Some(entry));
        }
        self.storage.get_log_by_id(event_id)
    }

    /// Deletes every entry that is not starred, from storage and the index.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be rewritten.
    pub fn clear_all(&self) -> Result<DeleteCounts> {
        let keep = self.starred.get_all();
        let counts = self.storage.clear_logs(Some(&keep))?;
        self.index.clear(Some(&keep));
        info!(backend = counts.backend, frontend = counts.frontend, kept = keep.len(), "Logs cleared");
        Ok(counts)
    }

    /// Stars `event_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the starred set cannot be persisted.
    pub fn star(&self, event_id: EventId) -> Result<()> {
        debug!(event_id = %event_id, "Starring entry");
        self.starred.add(event_id)
    }

    /// Unstars `event_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the starred set cannot be persisted.
    pub fn unstar(&self, event_id: &EventId) -> Result<()> {
        debug!(event_id = %event_id, "Unstarring entry");
        self.starred.remove(event_id)
    }

    /// Returns true if `event_id` is starred.
    #[must_use]
    pub fn is_starred(&self, event_id: &EventId) -> bool {
        self.starred.is_starred(event_id)
    }

    /// Returns the starred ids in sorted order.
    #[must_use]
    pub fn starred(&self) -> Vec<EventId> {
        self.starred.sorted()
    }

    /// Returns the starred ids as a set.
    #[must_use]
    pub fn starred_set(&self) -> HashSet<EventId> {
        self.starred.get_all()
    }

    /// Counts entries per partition.
    ///
    /// # Errors
    ///
    /// Returns an error if a partition cannot be read.
    pub fn storage_health(&self) -> Result<StorageHealth> {
        let backend = self.storage.read_logs(Runtime::Backend)?.len();
        let frontend = self.storage.read_logs(Runtime::Frontend)?.len();
        Ok(StorageHealth {
            backend,
            frontend,
            total: backend + frontend,
            indexed: self.index.len(),
        })
    }

    /// Runs one retention sweep now.
    pub fn run_cleanup(&self) -> SweepReport {
        self.retention.run_cleanup()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retention::RetentionConfig;
    use crate::testutil::{MemoryStorage, RecordingSink};
    use crate::types::{IncomingSource, LogLevel, LogSource, UNKNOWN};
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    struct Fixture {
        service: LogService,
        storage: Arc<MemoryStorage>,
        _dir: TempDir,
    }

    fn fixture_with(storage: MemoryStorage) -> Fixture {
        fixture_sized(storage, crate::index::DEFAULT_MAX_SIZE)
    }

    fn fixture_sized(storage: MemoryStorage, max_index: usize) -> Fixture {
        let dir = TempDir::new().expect("create temp dir");
        let storage = Arc::new(storage);
        let index = Arc::new(QueryIndex::new(max_index));
        let starred = Arc::new(StarredSet::in_dir(dir.path()));
        let retention = Arc::new(RetentionEngine::new(
            RetentionConfig::default(),
            storage.clone(),
            Arc::clone(&index),
            Arc::clone(&starred),
        ));
        let service = LogService::new(
            storage.clone(),
            index,
            Arc::new(BroadcastHub::new()),
            starred,
            retention,
        );
        Fixture {
            service,
            storage,
            _dir: dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MemoryStorage::new())
    }

    fn incoming(subject: &str, runtime: Runtime) -> IncomingLog {
        IncomingLog {
            timestamp: "2024-05-01T12:00:00.000Z".to_string(),
            level: LogLevel::Info,
            subject: subject.to_string(),
            message: Some(format!("{subject} happened")),
            data: None,
            source: IncomingSource {
                function: None,
                file: Some("app.ts".to_string()),
                process: None,
                runtime,
                service_name: None,
            },
            correlation: None,
        }
    }

    // ===== Ingestion Tests =====

    #[test]
    fn ingest_persists_indexes_and_broadcasts() {
        let f = fixture();
        let sink = Arc::new(RecordingSink::new());
        f.service.hub().on_connect(sink.clone());

        let entry = f
            .service
            .ingest(incoming("checkout", Runtime::Frontend))
            .expect("ingest");

        assert_eq!(entry.event_id.as_str().len(), 36);
        assert_eq!(entry.source.file, "app.ts");
        assert_eq!(entry.source.function, UNKNOWN);
        assert!(f.storage.ids().contains(entry.event_id.as_str()));
        assert!(f.service.index().contains(&entry.event_id));

        let logs = sink.frames_of_type("log");
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0]["data"]["eventId"], entry.event_id.as_str());
    }

    #[test]
    fn ingest_storage_failure_skips_index_and_broadcast() {
        let storage = MemoryStorage::new();
        storage.fail_appends.store(true, Ordering::SeqCst);
        let f = fixture_with(storage);
        let sink = Arc::new(RecordingSink::new());
        f.service.hub().on_connect(sink.clone());

        let result = f.service.ingest(incoming("checkout", Runtime::Backend));

        assert!(result.is_err_and(|e| e.is_persistence()));
        assert!(f.service.index().is_empty());
        assert!(sink.frames_of_type("log").is_empty());
    }

    #[test]
    fn ingest_survives_broken_subscriber() {
        let f = fixture();
        f.service.hub().on_connect(Arc::new(RecordingSink::closed()));

        let result = f.service.ingest(incoming("x", Runtime::Backend));
        assert!(result.is_ok());
    }

    // ===== Lookup Tests =====

    #[test]
    fn get_log_falls_back_to_storage() {
        let evicted = LogEntry::builder()
            .event_id("on-disk-only")
            .level(LogLevel::Warn)
            .subject("old")
            .build()
            .expect("should build");
        let f = fixture_with(MemoryStorage::with_entries([evicted]));

        let found = f
            .service
            .get_log(&EventId::from("on-disk-only"))
            .expect("lookup");
        assert_eq!(found.map(|e| e.subject), Some("old".to_string()));
        assert!(
            f.service
                .get_log(&EventId::from("missing"))
                .expect("lookup")
                .is_none()
        );
    }

    #[test]
    fn bootstrap_builds_index_from_storage() {
        let entries = (0..3).map(|i| {
            LogEntry::builder()
                .event_id(format!("e{i}"))
                .level(LogLevel::Debug)
                .subject("boot")
                .build()
                .expect("should build")
        });
        let f = fixture_with(MemoryStorage::with_entries(entries));

        assert_eq!(f.service.bootstrap().expect("bootstrap"), 3);
        assert_eq!(f.service.search(&QueryFilter::new()).total, 3);
    }

    #[test]
    fn bootstrap_keeps_newest_entries_across_partitions() {
        let at = |id: &str, runtime: Runtime, ts: &str| {
            LogEntry::builder()
                .event_id(id)
                .timestamp(ts)
                .level(LogLevel::Info)
                .subject("boot")
                .source(LogSource::unknown(runtime))
                .build()
                .expect("should build")
        };
        let storage = MemoryStorage::with_entries([
            at("b_new", Runtime::Backend, "2024-05-01T12:00:10Z"),
            at("b_mid", Runtime::Backend, "2024-05-01T12:00:05Z"),
            at("f_old1", Runtime::Frontend, "2024-05-01T12:00:01Z"),
            at("f_old2", Runtime::Frontend, "2024-05-01T12:00:02Z"),
            at("f_new", Runtime::Frontend, "2024-05-01T12:00:08Z"),
        ]);
        let f = fixture_sized(storage, 3);

        assert_eq!(f.service.bootstrap().expect("bootstrap"), 5);

        let resident: Vec<String> = f
            .service
            .index()
            .snapshot()
            .into_iter()
            .map(|e| e.event_id.to_string())
            .collect();
        assert_eq!(resident, vec!["b_mid", "f_new", "b_new"]);
        assert!(!f.service.index().contains(&EventId::from("f_old1")));
    }

    #[test]
    fn bootstrap_puts_unparseable_timestamps_first() {
        let odd = LogEntry::builder()
            .event_id("odd")
            .timestamp("garbage")
            .level(LogLevel::Info)
            .subject("boot")
            .source(LogSource::unknown(Runtime::Frontend))
            .build()
            .expect("should build");
        let dated = LogEntry::builder()
            .event_id("dated")
            .timestamp("2024-05-01T12:00:00Z")
            .level(LogLevel::Info)
            .subject("boot")
            .source(LogSource::unknown(Runtime::Backend))
            .build()
            .expect("should build");
        let f = fixture_sized(MemoryStorage::with_entries([dated, odd]), 1);

        f.service.bootstrap().expect("bootstrap");
        assert!(f.service.index().contains(&EventId::from("dated")));
        assert!(!f.service.index().contains(&EventId::from("odd")));
    }

    // ===== Starred / Clear Tests =====

    #[test]
    fn clear_all_keeps_starred() {
        let f = fixture();
        let keep = f.service.ingest(incoming("keep", Runtime::Backend)).expect("ingest");
        f.service.ingest(incoming("drop", Runtime::Frontend)).expect("ingest");
        f.service.star(keep.event_id.clone()).expect("star");

        let counts = f.service.clear_all().expect("clear");

        assert_eq!(counts.total(), 1);
        assert_eq!(f.storage.ids().len(), 1);
        assert_eq!(f.service.index().len(), 1);
        assert!(f.service.index().contains(&keep.event_id));
    }

    #[test]
    fn star_and_unstar_round_trip() {
        let f = fixture();
        let id = EventId::from("abc");
        f.service.star(id.clone()).expect("star");
        assert!(f.service.is_starred(&id));
        assert_eq!(f.service.starred(), vec![id.clone()]);

        f.service.unstar(&id).expect("unstar");
        assert!(f.service.starred_set().is_empty());
    }

    #[test]
    fn storage_health_counts_partitions() {
        let f = fixture();
        f.service.ingest(incoming("a", Runtime::Backend)).expect("ingest");
        f.service.ingest(incoming("b", Runtime::Backend)).expect("ingest");
        f.service.ingest(incoming("c", Runtime::Frontend)).expect("ingest");

        let health = f.service.storage_health().expect("health");
        assert_eq!(
            health,
            StorageHealth {
                backend: 2,
                frontend: 1,
                total: 3,
                indexed: 3,
            }
        );
    }
}
