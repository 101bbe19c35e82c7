//! Response envelopes and request parameter types for the HTTP API.

use axum::Json;
use axum::response::{IntoResponse, Response};
use logscope_core::{DeleteCounts, EventId, StorageHealth, SweepReport};
use serde::{Deserialize, Serialize};

/// Success envelope: `{"success":true,"data":...}` plus paging fields on
/// list responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    /// Always true; failures use the error envelope.
    pub success: bool,
    /// Response payload.
    pub data: T,
    /// Matching items before pagination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    /// Page size that was applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Items skipped before this page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Wraps a single payload.
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            total: None,
            limit: None,
            offset: None,
        }
    }

    /// Wraps one page of a list.
    pub const fn page(data: T, total: usize, limit: usize, offset: usize) -> Self {
        Self {
            success: true,
            data,
            total: Some(total),
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    /// Sets the total without paging fields.
    #[must_use]
    pub const fn with_total(mut self, total: usize) -> Self {
        self.total = Some(total);
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Identity assigned to a collected entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedLog {
    /// Server-assigned identifier.
    pub event_id: EventId,
    /// Timestamp as supplied by the client.
    pub timestamp: String,
}

/// Liveness response for `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Status message.
    pub status: &'static str,
    /// Connected WebSocket subscribers.
    pub subscribers: usize,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
}

/// Entry count in one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartitionCount {
    /// Number of entries.
    pub count: usize,
}

/// Storage diagnostics for `/api/logs/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageHealthResponse {
    /// Backend partition.
    pub backend: PartitionCount,
    /// Frontend partition.
    pub frontend: PartitionCount,
    /// Both partitions.
    pub total: usize,
    /// Entries resident in the query index.
    pub indexed: usize,
}

impl From<StorageHealth> for StorageHealthResponse {
    fn from(health: StorageHealth) -> Self {
        Self {
            backend: PartitionCount {
                count: health.backend,
            },
            frontend: PartitionCount {
                count: health.frontend,
            },
            total: health.total,
            indexed: health.indexed,
        }
    }
}

/// Star state after a star or unstar request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StarResponse {
    /// Affected entry.
    pub event_id: EventId,
    /// Whether the entry is now starred.
    pub starred: bool,
}

/// Outcome of `DELETE /api/logs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClearResponse {
    /// Entries deleted per partition.
    pub deleted: DeleteCounts,
    /// Starred entries that were kept.
    pub kept: usize,
}

/// Outcome of `POST /api/logs/cleanup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupResponse {
    /// Entries removed by the age pass.
    pub expired: usize,
    /// Entries removed by the capacity pass.
    pub evicted: usize,
    /// True if a sweep was already running and this one did nothing.
    pub skipped: bool,
}

impl From<SweepReport> for CleanupResponse {
    fn from(report: SweepReport) -> Self {
        Self {
            expired: report.expired,
            evicted: report.evicted,
            skipped: report.skipped,
        }
    }
}

/// Query string of `/api/logs/search`.
///
/// Values stay raw strings so validation can report its own error codes;
/// empty values count as absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    /// Inclusive lower time bound.
    pub time_from: Option<String>,
    /// Inclusive upper time bound.
    pub time_to: Option<String>,
    /// Exact level.
    pub level: Option<String>,
    /// Subject substring.
    pub subject: Option<String>,
    /// Message or payload substring.
    pub text: Option<String>,
    /// Correlation request id.
    pub request_id: Option<String>,
    /// Correlation session id.
    pub session_id: Option<String>,
    /// Page size.
    pub limit: Option<String>,
    /// Entries to skip.
    pub offset: Option<String>,
    /// `false` returns full entries.
    pub lightweight: Option<String>,
}

/// Paging query string of the correlation routes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    /// Page size.
    pub limit: Option<String>,
    /// Entries to skip.
    pub offset: Option<String>,
    /// `false` returns full entries.
    pub lightweight: Option<String>,
}
