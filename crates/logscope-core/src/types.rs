//! Core types for the log pipeline.
//!
//! This module provides:
//! - [`EventId`]: Unique identifier assigned at ingestion
//! - [`LogLevel`]: Severity levels for log entries
//! - [`Runtime`]: Which side of the application produced an entry
//! - [`LogEntry`]: Canonical structured log entry
//! - [`LogSummary`]: Lightweight projection used by list views
//! - [`LogRecord`]: Either a full entry or a summary, tagged explicitly
//! - [`QueryFilter`]: Search predicates and pagination
//! - [`IncomingLog`]: A validated event payload awaiting an identity

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LogError;

/// Sentinel used for source fields the client did not provide.
pub const UNKNOWN: &str = "unknown";

/// Default page size for queries.
pub const DEFAULT_LIMIT: usize = 100;

/// Largest page size a query may request.
pub const MAX_LIMIT: usize = 1000;

/// Unique identifier for a log entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EventId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Log severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debugging information
    Debug,
    /// General information
    Info,
    /// Warning conditions
    Warn,
    /// Error conditions
    Error,
    /// Failures that need immediate attention
    Critical,
    /// A successfully completed operation
    Success,
}

impl LogLevel {
    /// Every level, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Debug,
        Self::Info,
        Self::Warn,
        Self::Error,
        Self::Critical,
        Self::Success,
    ];

    /// Returns the string representation of this level.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Success => "success",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| LogError::InvalidLevel(s.to_string()))
    }
}

/// The runtime that produced a log entry. Storage is partitioned by runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    /// Server-side code.
    #[serde(alias = "node")]
    Backend,
    /// Browser code.
    #[serde(alias = "browser")]
    Frontend,
}

impl Runtime {
    /// Both runtimes, backend first.
    pub const ALL: [Self; 2] = [Self::Backend, Self::Frontend];

    /// Returns the string representation of this runtime.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Frontend => "frontend",
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Runtime {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backend" | "node" => Ok(Self::Backend),
            "frontend" | "browser" => Ok(Self::Frontend),
            other => Err(LogError::InvalidRuntime(other.to_string())),
        }
    }
}

/// Where a log entry came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSource {
    /// Function that emitted the entry
    pub function: String,
    /// Source file that emitted the entry
    pub file: String,
    /// Process name or identifier
    pub process: String,
    /// Producing runtime
    pub runtime: Runtime,
    /// Logical service name
    pub service_name: String,
}

impl LogSource {
    /// Creates a source with every descriptive field set to [`UNKNOWN`].
    #[must_use]
    pub fn unknown(runtime: Runtime) -> Self {
        Self {
            function: UNKNOWN.to_string(),
            file: UNKNOWN.to_string(),
            process: UNKNOWN.to_string(),
            runtime,
            service_name: UNKNOWN.to_string(),
        }
    }
}

/// Identifiers linking related entries across services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correlation {
    /// Request identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Session identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// User identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// A structured log entry.
///
/// Created once at ingestion and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Unique identifier for this entry
    pub event_id: EventId,
    /// Client-supplied ISO-8601 timestamp, kept verbatim
    pub timestamp: String,
    /// Severity level
    pub level: LogLevel,
    /// Short category label
    pub subject: String,
    /// Free-text body
    #[serde(default)]
    pub message: String,
    /// Optional payload, either a JSON string or a structured value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Origin of the entry
    pub source: LogSource,
    /// Correlation identifiers
    #[serde(default)]
    pub correlation: Correlation,
}

impl LogEntry {
    /// Creates a new log entry builder.
    #[must_use]
    pub fn builder() -> LogEntryBuilder {
        LogEntryBuilder::default()
    }

    /// Parses the timestamp, returning `None` when it is not valid RFC 3339.
    #[must_use]
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }

    /// Returns the payload as searchable text.
    ///
    /// String payloads are returned as-is; structured payloads are serialized.
    #[must_use]
    pub fn data_text(&self) -> Option<Cow<'_, str>> {
        match self.data.as_ref()? {
            serde_json::Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            serde_json::Value::Null => None,
            other => Some(Cow::Owned(other.to_string())),
        }
    }

    /// Projects this entry onto its lightweight summary.
    #[must_use]
    pub fn summary(&self) -> LogSummary {
        LogSummary {
            event_id: self.event_id.clone(),
            timestamp: self.timestamp.clone(),
            level: self.level,
            subject: self.subject.clone(),
            message: self.message.clone(),
            source: SummarySource {
                runtime: self.source.runtime,
                service_name: self.source.service_name.clone(),
            },
        }
    }

    /// Checks the search predicates of `filter` against this entry.
    ///
    /// Pagination fields are ignored. Predicates are evaluated in a fixed
    /// order and all of them must hold.
    #[must_use]
    pub fn matches(&self, filter: &QueryFilter) -> bool {
        if filter.time_from.is_some() || filter.time_to.is_some() {
            let Some(timestamp) = self.parsed_timestamp() else {
                return false;
            };
            if filter.time_from.is_some_and(|from| timestamp < from) {
                return false;
            }
            if filter.time_to.is_some_and(|to| timestamp > to) {
                return false;
            }
        }

        if filter.level.is_some_and(|level| level != self.level) {
            return false;
        }

        if let Some(ref subject) = filter.subject {
            if !contains_ignore_case(&self.subject, subject) {
                return false;
            }
        }

        if let Some(ref text) = filter.text {
            let in_message = contains_ignore_case(&self.message, text);
            let in_data = self
                .data_text()
                .is_some_and(|data| contains_ignore_case(&data, text));
            if !in_message && !in_data {
                return false;
            }
        }

        if let Some(ref request_id) = filter.request_id {
            if self.correlation.request_id.as_ref() != Some(request_id) {
                return false;
            }
        }

        if let Some(ref session_id) = filter.session_id {
            if self.correlation.session_id.as_ref() != Some(session_id) {
                return false;
            }
        }

        true
    }
}

/// Parses an RFC 3339 timestamp into UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Case-insensitive substring test.
pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// The two source fields kept by [`LogSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarySource {
    /// Producing runtime
    pub runtime: Runtime,
    /// Logical service name
    pub service_name: String,
}

/// Lightweight projection of a [`LogEntry`] for bulk list responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSummary {
    /// Unique identifier of the projected entry
    pub event_id: EventId,
    /// Client-supplied timestamp
    pub timestamp: String,
    /// Severity level
    pub level: LogLevel,
    /// Short category label
    pub subject: String,
    /// Free-text body
    pub message: String,
    /// Runtime and service of the origin
    pub source: SummarySource,
}

/// A query result item: a full entry or its summary.
///
/// Serialized untagged, so the wire shape is exactly the inner object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LogRecord {
    /// The complete entry.
    Full(LogEntry),
    /// The lightweight projection.
    Summary(LogSummary),
}

impl LogRecord {
    /// Returns the identifier of the underlying entry.
    #[must_use]
    pub fn event_id(&self) -> &EventId {
        match self {
            Self::Full(entry) => &entry.event_id,
            Self::Summary(summary) => &summary.event_id,
        }
    }

    /// Returns true for the summary variant.
    #[must_use]
    pub const fn is_lightweight(&self) -> bool {
        matches!(self, Self::Summary(_))
    }
}

/// Search predicates and pagination for [`crate::QueryIndex::query`].
///
/// Every predicate is optional; absent predicates are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    /// Inclusive lower time bound
    pub time_from: Option<DateTime<Utc>>,
    /// Inclusive upper time bound
    pub time_to: Option<DateTime<Utc>>,
    /// Exact level match
    pub level: Option<LogLevel>,
    /// Case-insensitive substring of the subject
    pub subject: Option<String>,
    /// Case-insensitive substring of the message or payload
    pub text: Option<String>,
    /// Exact correlation request id
    pub request_id: Option<String>,
    /// Exact correlation session id
    pub session_id: Option<String>,
    /// Page size, defaults to [`DEFAULT_LIMIT`]
    pub limit: Option<usize>,
    /// Entries to skip, defaults to 0
    pub offset: Option<usize>,
    /// Return summaries instead of full entries, defaults to true
    pub lightweight: Option<bool>,
}

impl QueryFilter {
    /// Creates an empty filter that matches every resident entry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the inclusive lower time bound.
    #[must_use]
    pub const fn with_time_from(mut self, from: DateTime<Utc>) -> Self {
        self.time_from = Some(from);
        self
    }

    /// Sets the inclusive upper time bound.
    #[must_use]
    pub const fn with_time_to(mut self, to: DateTime<Utc>) -> Self {
        self.time_to = Some(to);
        self
    }

    /// Adds a level filter.
    #[must_use]
    pub const fn with_level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// Adds a subject filter.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Adds a text search filter.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Adds a request id filter.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Adds a session id filter.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Sets the page size.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the number of entries to skip.
    #[must_use]
    pub const fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Chooses between summaries and full entries.
    #[must_use]
    pub const fn with_lightweight(mut self, lightweight: bool) -> Self {
        self.lightweight = Some(lightweight);
        self
    }

    /// Page size after defaulting and clamping to `1..=MAX_LIMIT`.
    #[must_use]
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    /// Number of entries to skip.
    #[must_use]
    pub fn effective_offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    /// Whether results are projected to summaries.
    #[must_use]
    pub fn is_lightweight(&self) -> bool {
        self.lightweight.unwrap_or(true)
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// Matching entries on this page
    pub entries: Vec<LogRecord>,
    /// Number of matching entries before pagination
    pub total: usize,
}

/// Source description as supplied by a client; descriptive fields may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingSource {
    /// Function that emitted the entry
    #[serde(default)]
    pub function: Option<String>,
    /// Source file that emitted the entry
    #[serde(default)]
    pub file: Option<String>,
    /// Process name or identifier
    #[serde(default)]
    pub process: Option<String>,
    /// Producing runtime
    pub runtime: Runtime,
    /// Logical service name
    #[serde(default)]
    pub service_name: Option<String>,
}

/// A validated event payload that has not yet been assigned an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingLog {
    /// Client-supplied timestamp
    pub timestamp: String,
    /// Severity level
    pub level: LogLevel,
    /// Short category label
    pub subject: String,
    /// Free-text body
    #[serde(default)]
    pub message: Option<String>,
    /// Optional payload
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    /// Origin of the entry
    pub source: IncomingSource,
    /// Correlation identifiers
    #[serde(default)]
    pub correlation: Option<Correlation>,
}

impl IncomingLog {
    /// Builds the canonical entry, filling in defaults for absent fields.
    #[must_use]
    pub fn into_entry(self, event_id: EventId) -> LogEntry {
        let or_unknown = |value: Option<String>| value.unwrap_or_else(|| UNKNOWN.to_string());

        LogEntry {
            event_id,
            timestamp: self.timestamp,
            level: self.level,
            subject: self.subject,
            message: self.message.unwrap_or_default(),
            data: self.data,
            source: LogSource {
                function: or_unknown(self.source.function),
                file: or_unknown(self.source.file),
                process: or_unknown(self.source.process),
                runtime: self.source.runtime,
                service_name: or_unknown(self.source.service_name),
            },
            correlation: self.correlation.unwrap_or_default(),
        }
    }
}

/// Builder for constructing log entries.
#[derive(Debug, Default)]
pub struct LogEntryBuilder {
    event_id: Option<EventId>,
    timestamp: Option<String>,
    level: Option<LogLevel>,
    subject: Option<String>,
    message: String,
    data: Option<serde_json::Value>,
    source: Option<LogSource>,
    correlation: Correlation,
}

impl LogEntryBuilder {
    /// Sets the event id. A random id is generated when unset.
    #[must_use]
    pub fn event_id(mut self, event_id: impl Into<EventId>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    /// Sets the timestamp from a raw string.
    #[must_use]
    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Sets the timestamp from a UTC date-time.
    #[must_use]
    pub fn timestamp_at(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true));
        self
    }

    /// Sets the log level.
    #[must_use]
    pub const fn level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Sets the full source description.
    #[must_use]
    pub fn source(mut self, source: LogSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets the correlation request id.
    #[must_use]
    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.correlation.request_id = Some(request_id.into());
        self
    }

    /// Sets the correlation session id.
    #[must_use]
    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.correlation.session_id = Some(session_id.into());
        self
    }

    /// Sets the correlation user id.
    #[must_use]
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.correlation.user_id = Some(user_id.into());
        self
    }

    /// Builds the log entry.
    ///
    /// The event id, timestamp and source default to a random id, the current
    /// time and an unknown backend source.
    ///
    /// # Errors
    ///
    /// Returns an error if the level or subject is not set.
    pub fn build(self) -> Result<LogEntry, LogError> {
        let level = self.level.ok_or(LogError::MissingField("level"))?;
        let subject = self.subject.ok_or(LogError::MissingField("subject"))?;

        Ok(LogEntry {
            event_id: self.event_id.unwrap_or_else(EventId::generate),
            timestamp: self.timestamp.unwrap_or_else(|| {
                Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
            }),
            level,
            subject,
            message: self.message,
            data: self.data,
            source: self
                .source
                .unwrap_or_else(|| LogSource::unknown(Runtime::Backend)),
            correlation: self.correlation,
        })
    }
}
