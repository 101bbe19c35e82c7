//! HTTP request handlers for the log API.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use logscope_core::{EventId, LogRecord, QueryFilter};
use tracing::debug;

use crate::error::{ErrorCode, ServerError, ServerResult};
use crate::state::AppState;
use crate::types::{
    ApiResponse, CleanupResponse, ClearResponse, CollectedLog, HealthResponse, PageParams,
    SearchParams, StarResponse, StorageHealthResponse,
};
use crate::validation::{page_filter, validate_incoming, validate_search};

/// Handle GET /health - liveness and subscriber count.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        subscribers: state.service().hub().active_count(),
        uptime_secs: state.uptime_secs(),
    })
}

/// Handle POST /api/logs/collect - validate, persist, index and broadcast.
///
/// # Errors
///
/// Returns a validation error for a malformed body and a server error if the
/// entry cannot be persisted.
pub async fn collect_log(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> ServerResult<(StatusCode, ApiResponse<CollectedLog>)> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::validation(
                ErrorCode::PayloadTooLarge,
                "Payload too large. Request body exceeds 1MB limit.",
            )
        } else {
            ServerError::validation(ErrorCode::InvalidJson, "Invalid JSON in request body")
        }
    })?;

    let value: serde_json::Value = serde_json::from_slice(&body).map_err(|_| {
        ServerError::validation(ErrorCode::InvalidJson, "Invalid JSON in request body")
    })?;
    let incoming = validate_incoming(&value)?;

    let entry = state
        .blocking("collect log", move |service| service.ingest(incoming))
        .await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::ok(CollectedLog {
            event_id: entry.event_id,
            timestamp: entry.timestamp,
        }),
    ))
}

fn page(state: &AppState, filter: &QueryFilter) -> ApiResponse<Vec<LogRecord>> {
    let result = state.service().search(filter);
    ApiResponse::page(
        result.entries,
        result.total,
        filter.effective_limit(),
        filter.effective_offset(),
    )
}

/// Handle GET /api/logs/search - filtered, paginated query over the index.
///
/// # Errors
///
/// Returns a validation error for malformed parameters.
pub async fn search_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ServerResult<ApiResponse<Vec<LogRecord>>> {
    let filter = validate_search(&params)?;
    debug!(?filter, "Searching logs");
    Ok(page(&state, &filter))
}

/// Handle GET /api/logs/correlation/request/{requestId}.
pub async fn logs_by_request(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
    Query(params): Query<PageParams>,
) -> ApiResponse<Vec<LogRecord>> {
    let filter = page_filter(&params).with_request_id(request_id);
    page(&state, &filter)
}

/// Handle GET /api/logs/correlation/session/{sessionId}.
pub async fn logs_by_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(params): Query<PageParams>,
) -> ApiResponse<Vec<LogRecord>> {
    let filter = page_filter(&params).with_session_id(session_id);
    page(&state, &filter)
}

/// Handle GET /api/logs/health - entry counts per partition.
///
/// # Errors
///
/// Returns a server error if a partition cannot be read.
pub async fn storage_health(
    State(state): State<Arc<AppState>>,
) -> ServerResult<ApiResponse<StorageHealthResponse>> {
    let health = state
        .blocking("check health", |service| service.storage_health())
        .await?;
    Ok(ApiResponse::ok(health.into()))
}

/// Handle GET /api/logs/{eventId} - index lookup with storage fallback.
///
/// # Errors
///
/// Returns not-found for an unknown id.
pub async fn get_log(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<EventId>,
) -> ServerResult<ApiResponse<logscope_core::LogEntry>> {
    state
        .blocking("get log", move |service| service.get_log(&event_id))
        .await?
        .map(ApiResponse::ok)
        .ok_or_else(|| ServerError::NotFound("Log".to_string()))
}

/// Handle GET /api/logs/starred - every starred id.
pub async fn list_starred(State(state): State<Arc<AppState>>) -> ApiResponse<Vec<EventId>> {
    let starred = state.service().starred();
    let total = starred.len();
    ApiResponse::ok(starred).with_total(total)
}

/// Handle POST /api/logs/{eventId}/star.
///
/// # Errors
///
/// Returns not-found if no entry has this id.
pub async fn star_log(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<EventId>,
) -> ServerResult<ApiResponse<StarResponse>> {
    let id = event_id.clone();
    let found = state
        .blocking("star log", move |service| {
            if service.get_log(&id)?.is_none() {
                return Ok(false);
            }
            service.star(id)?;
            Ok(true)
        })
        .await?;

    if !found {
        return Err(ServerError::NotFound("Log".to_string()));
    }
    Ok(ApiResponse::ok(StarResponse {
        event_id,
        starred: true,
    }))
}

/// Handle DELETE /api/logs/{eventId}/star.
///
/// # Errors
///
/// Returns a server error if the starred set cannot be persisted.
pub async fn unstar_log(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<EventId>,
) -> ServerResult<ApiResponse<StarResponse>> {
    let id = event_id.clone();
    state
        .blocking("unstar log", move |service| service.unstar(&id))
        .await?;
    Ok(ApiResponse::ok(StarResponse {
        event_id,
        starred: false,
    }))
}

/// Handle DELETE /api/logs - delete everything except starred entries.
///
/// # Errors
///
/// Returns a server error if storage cannot be rewritten.
pub async fn clear_logs(
    State(state): State<Arc<AppState>>,
) -> ServerResult<ApiResponse<ClearResponse>> {
    let response = state
        .blocking("clear logs", |service| {
            let deleted = service.clear_all()?;
            let kept = service.storage_health()?.total;
            Ok(ClearResponse { deleted, kept })
        })
        .await?;
    Ok(ApiResponse::ok(response))
}

/// Handle POST /api/logs/cleanup - run one retention sweep now.
///
/// # Errors
///
/// Returns a server error only if the sweep task panics.
pub async fn run_cleanup(
    State(state): State<Arc<AppState>>,
) -> ServerResult<ApiResponse<CleanupResponse>> {
    let report = state
        .blocking("run cleanup", |service| Ok(service.run_cleanup()))
        .await?;
    Ok(ApiResponse::ok(report.into()))
}
