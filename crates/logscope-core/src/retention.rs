//! Periodic retention sweeps.
//!
//! This module provides:
//! - [`RetentionConfig`]: Age and capacity limits plus the sweep interval
//! - [`RetentionEngine`]: One sweep: an age pass then a capacity pass
//! - [`RetentionScheduler`]: Background task that runs sweeps on an interval
//!
//! Starred entries are exempt from both passes. Sweeps never overlap; a
//! request that arrives while one is running is skipped.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::index::QueryIndex;
use crate::starred::StarredSet;
use crate::traits::LogStorage;
use crate::types::{EventId, LogEntry};

/// Default maximum entry age: one hour.
pub const DEFAULT_MAX_AGE_MS: u64 = 3_600_000;
/// Default number of entries kept before the capacity pass kicks in.
pub const DEFAULT_MAX_TOTAL: usize = 500;
/// Default minimum batch size of the capacity pass.
pub const DEFAULT_DELETE_COUNT: usize = 100;
/// Default time between scheduled sweeps.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Retention limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionConfig {
    /// Entries older than this many milliseconds are expired.
    pub max_age_ms: u64,
    /// Capacity threshold across both partitions.
    pub max_total: usize,
    /// Minimum number of entries removed when over capacity.
    pub delete_count: usize,
    /// Time between scheduled sweeps.
    pub interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_ms: DEFAULT_MAX_AGE_MS,
            max_total: DEFAULT_MAX_TOTAL,
            delete_count: DEFAULT_DELETE_COUNT,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl RetentionConfig {
    /// Sets the maximum entry age in milliseconds.
    #[must_use]
    pub const fn with_max_age_ms(mut self, max_age_ms: u64) -> Self {
        self.max_age_ms = max_age_ms;
        self
    }

    /// Sets the capacity threshold.
    #[must_use]
    pub const fn with_max_total(mut self, max_total: usize) -> Self {
        self.max_total = max_total;
        self
    }

    /// Sets the minimum capacity batch.
    #[must_use]
    pub const fn with_delete_count(mut self, delete_count: usize) -> Self {
        self.delete_count = delete_count;
        self
    }

    /// Sets the sweep interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Returns the age cutoff relative to `now`.
    #[must_use]
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let age = i64::try_from(self.max_age_ms).unwrap_or(i64::MAX);
        chrono::Duration::try_milliseconds(age)
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Entries removed by the age pass
    pub expired: usize,
    /// Entries removed by the capacity pass
    pub evicted: usize,
    /// True if the sweep did not run because another was in progress
    pub skipped: bool,
}

impl SweepReport {
    /// Total entries removed.
    #[must_use]
    pub const fn removed(&self) -> usize {
        self.expired + self.evicted
    }
}

/// Resets the running flag when a sweep ends, including by panic.
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Deletes expired and excess entries from storage and the index.
pub struct RetentionEngine {
    config: RetentionConfig,
    storage: Arc<dyn LogStorage>,
    index: Arc<QueryIndex>,
    starred: Arc<StarredSet>,
    running: AtomicBool,
}

impl std::fmt::Debug for RetentionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionEngine")
            .field("config", &self.config)
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RetentionEngine {
    /// Creates an engine over the given components.
    #[must_use]
    pub fn new(
        config: RetentionConfig,
        storage: Arc<dyn LogStorage>,
        index: Arc<QueryIndex>,
        starred: Arc<StarredSet>,
    ) -> Self {
        Self {
            config,
            storage,
            index,
            starred,
            running: AtomicBool::new(false),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Returns true while a sweep is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs one sweep against the current time.
    ///
    /// Failures are logged and never propagated; whatever was deleted before
    /// the failure stays deleted.
    pub fn run_cleanup(&self) -> SweepReport {
        self.run_cleanup_at(Utc::now())
    }

    /// Runs one sweep as if the current time were `now`.
    pub fn run_cleanup_at(&self, now: DateTime<Utc>) -> SweepReport {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Retention sweep already running, skipping");
            return SweepReport {
                skipped: true,
                ..SweepReport::default()
            };
        }
        let _guard = SweepGuard(&self.running);

        let mut report = SweepReport::default();
        if let Err(e) = self.sweep(now, &mut report) {
            error!(error = %e, expired = report.expired, evicted = report.evicted, "Retention sweep failed");
            return report;
        }

        if report.removed() > 0 {
            info!(expired = report.expired, evicted = report.evicted, "Retention sweep completed");
        } else {
            debug!("Retention sweep found nothing to delete");
        }
        report
    }

    fn sweep(&self, now: DateTime<Utc>, report: &mut SweepReport) -> Result<()> {
        let starred = self.starred.get_all();

        // Age pass
        let cutoff = self.config.cutoff(now);
        let all = self.storage.read_all()?;
        let total_before = all.len();
        let expired: HashSet<EventId> = all
            .into_iter()
            .filter(|e| is_expired(e, cutoff) && !starred.contains(&e.event_id))
            .map(|e| e.event_id)
            .collect();

        if !expired.is_empty() {
            report.expired = self.storage.delete_logs_by_ids(&expired)?.total();
            self.index.remove_by_ids(&expired);
        }

        // Capacity pass. `remaining` is derived from the first read rather than
        // a recount, matching what the age pass intended to delete.
        let remaining = total_before - expired.len();
        if remaining <= self.config.max_total {
            return Ok(());
        }

        let mut survivors = self.storage.read_all()?;
        survivors.sort_by_key(LogEntry::parsed_timestamp);
        let target = self.config.delete_count.max(remaining - self.config.max_total);
        let evict: HashSet<EventId> = survivors
            .into_iter()
            .filter(|e| !starred.contains(&e.event_id))
            .take(target)
            .map(|e| e.event_id)
            .collect();

        if evict.is_empty() {
            warn!(remaining, max_total = self.config.max_total, "Over capacity but every entry is starred");
            return Ok(());
        }

        report.evicted = self.storage.delete_logs_by_ids(&evict)?.total();
        self.index.remove_by_ids(&evict);
        Ok(())
    }
}

/// Unparseable timestamps never expire.
fn is_expired(entry: &LogEntry, cutoff: DateTime<Utc>) -> bool {
    entry.parsed_timestamp().is_some_and(|ts| ts < cutoff)
}

/// Runs [`RetentionEngine::run_cleanup`] on a fixed interval.
///
/// Each sweep runs on the blocking pool. The first sweep runs immediately.
#[derive(Debug)]
pub struct RetentionScheduler {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RetentionScheduler {
    /// Spawns the scheduler task on the current tokio runtime.
    #[must_use]
    pub fn start(engine: Arc<RetentionEngine>) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let period = engine.config().interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs = period.as_secs(), "Retention scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let engine = Arc::clone(&engine);
                        if let Err(e) = tokio::task::spawn_blocking(move || engine.run_cleanup()).await {
                            error!(error = %e, "Retention sweep task panicked");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Retention scheduler stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signals the task to stop and waits for it. An in-flight sweep finishes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Retention scheduler task ended abnormally");
        }
    }
}
