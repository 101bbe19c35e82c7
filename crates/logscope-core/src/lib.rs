//! # logscope-core
//!
//! Ingestion, indexing, live broadcast and retention for structured
//! application logs.
//!
//! This crate provides:
//!
//! - [`LogEntry`]: Structured log entries with source and correlation metadata
//! - [`QueryIndex`]: Bounded in-memory index with filtered, paginated queries
//! - [`BroadcastHub`]: Live fan-out to filtered subscribers
//! - [`RetentionEngine`]: Age and capacity sweeps that spare starred entries
//! - [`StarredSet`]: Persisted set of pinned entries
//! - [`LogStorage`]: Abstract durable store, with [`FileLogStorage`] on disk
//! - [`LogService`]: Ingestion and the service operations a transport needs
//!
//! ## Example
//!
//! ```rust
//! use logscope_core::{LogEntry, LogLevel, QueryFilter, QueryIndex};
//!
//! let index = QueryIndex::new(2);
//! for subject in ["auth", "billing", "auth-refresh"] {
//!     let entry = LogEntry::builder()
//!         .level(LogLevel::Info)
//!         .subject(subject)
//!         .build()
//!         .expect("level and subject are set");
//!     index.add(entry);
//! }
//!
//! let result = index.query(&QueryFilter::new().with_subject("AUTH"));
//! assert_eq!(result.total, 1);
//! assert_eq!(index.len(), 2);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod file_store;
pub mod hub;
pub mod index;
pub mod ingest;
pub mod retention;
pub mod starred;
pub mod traits;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export main types
pub use error::{LogError, Result};
pub use file_store::FileLogStorage;
pub use hub::{
    BroadcastHub, ClientMessage, Deliverable, DeliveryError, ServerMessage, SubscriberFilter,
    SubscriberId,
};
pub use index::QueryIndex;
pub use ingest::{LogService, StorageHealth};
pub use retention::{RetentionConfig, RetentionEngine, RetentionScheduler, SweepReport};
pub use starred::StarredSet;
pub use traits::{DeleteCounts, LogStorage};
pub use types::{
    Correlation, EventId, IncomingLog, IncomingSource, LogEntry, LogEntryBuilder, LogLevel,
    LogRecord, LogSource, LogSummary, QueryFilter, QueryResult, Runtime, SummarySource,
};
