//! Request validation for the collect and search endpoints.
//!
//! Checks run in a fixed order and the first failure wins, so a client always
//! sees the same error code for the same body.

use std::str::FromStr;

use logscope_core::types::{DEFAULT_LIMIT, MAX_LIMIT, parse_timestamp};
use logscope_core::{IncomingLog, LogLevel, QueryFilter, Runtime};
use serde_json::{Map, Value};

use crate::error::{ErrorCode, ServerError, ServerResult};
use crate::types::{PageParams, SearchParams};

/// Longest accepted subject, in characters.
pub const MAX_SUBJECT_CHARS: usize = 255;

/// Longest accepted message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 1024;

/// Largest accepted serialized `data` payload, in bytes.
pub const MAX_DATA_BYTES: usize = 10 * 1024;

fn invalid(code: ErrorCode, message: impl Into<String>) -> ServerError {
    ServerError::validation(code, message)
}

/// Validates a collect body and converts it into an [`IncomingLog`].
///
/// # Errors
///
/// Returns a validation error naming the first rule the body breaks.
pub fn validate_incoming(body: &Value) -> ServerResult<IncomingLog> {
    let Some(obj) = body.as_object() else {
        return Err(invalid(ErrorCode::InvalidJson, "Request body must be a JSON object."));
    };

    check_timestamp(obj)?;
    check_level(obj)?;
    check_subject(obj)?;
    check_message(obj)?;
    check_source(obj)?;
    check_data(obj)?;

    serde_json::from_value(body.clone())
        .map_err(|e| invalid(ErrorCode::InvalidJson, format!("Invalid log entry: {e}")))
}

fn check_timestamp(obj: &Map<String, Value>) -> ServerResult<()> {
    let Some(raw) = obj.get("timestamp").and_then(Value::as_str).filter(|s| !s.is_empty()) else {
        return Err(invalid(
            ErrorCode::InvalidTimestamp,
            "Invalid or missing timestamp. Must be ISO 8601 format.",
        ));
    };
    if parse_timestamp(raw).is_none() {
        return Err(invalid(
            ErrorCode::InvalidTimestamp,
            "Timestamp is not a valid ISO 8601 date.",
        ));
    }
    Ok(())
}

fn level_error() -> ServerError {
    let names: Vec<&str> = LogLevel::ALL.iter().map(LogLevel::as_str).collect();
    invalid(
        ErrorCode::InvalidLevel,
        format!("Invalid log level. Must be one of: {}", names.join(", ")),
    )
}

fn check_level(obj: &Map<String, Value>) -> ServerResult<()> {
    obj.get("level")
        .and_then(Value::as_str)
        .and_then(|raw| LogLevel::from_str(raw).ok())
        .map(|_| ())
        .ok_or_else(level_error)
}

fn check_subject(obj: &Map<String, Value>) -> ServerResult<()> {
    let Some(subject) = obj.get("subject").and_then(Value::as_str).filter(|s| !s.trim().is_empty())
    else {
        return Err(invalid(
            ErrorCode::InvalidSubject,
            "Subject is required and must be a non-empty string.",
        ));
    };
    if subject.chars().count() > MAX_SUBJECT_CHARS {
        return Err(invalid(
            ErrorCode::SubjectTooLong,
            "Subject cannot exceed 255 characters.",
        ));
    }
    Ok(())
}

fn check_message(obj: &Map<String, Value>) -> ServerResult<()> {
    let too_long = obj
        .get("message")
        .and_then(Value::as_str)
        .is_some_and(|m| m.chars().count() > MAX_MESSAGE_CHARS);
    if too_long {
        return Err(invalid(
            ErrorCode::MessageTooLong,
            "Message cannot exceed 1024 characters.",
        ));
    }
    Ok(())
}

fn check_source(obj: &Map<String, Value>) -> ServerResult<()> {
    let Some(source) = obj.get("source").and_then(Value::as_object) else {
        return Err(invalid(
            ErrorCode::InvalidSource,
            "Source is required and must be an object.",
        ));
    };
    source
        .get("runtime")
        .and_then(Value::as_str)
        .and_then(|raw| Runtime::from_str(raw).ok())
        .map(|_| ())
        .ok_or_else(|| {
            invalid(
                ErrorCode::InvalidRuntime,
                "Source.runtime is required and must be 'backend' or 'frontend'.",
            )
        })
}

fn check_data(obj: &Map<String, Value>) -> ServerResult<()> {
    let Some(data) = obj.get("data").filter(|d| !d.is_null()) else {
        return Ok(());
    };
    let size = serde_json::to_string(data).map_or(usize::MAX, |s| s.len());
    if size > MAX_DATA_BYTES {
        return Err(invalid(
            ErrorCode::ContentTooLarge,
            "Log content exceeds maximum size of 10KB.",
        ));
    }
    Ok(())
}

/// Treats empty query values as absent.
fn present(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}

fn parse_lightweight(value: Option<&String>) -> Option<bool> {
    match present(value) {
        Some("false" | "0") => Some(false),
        Some("true" | "1") => Some(true),
        _ => None,
    }
}

/// Validates search parameters and converts them into a [`QueryFilter`].
///
/// # Errors
///
/// Returns a validation error for an unparseable time bound, an unknown
/// level, a limit outside `1..=1000` or a negative offset.
pub fn validate_search(params: &SearchParams) -> ServerResult<QueryFilter> {
    let mut filter = QueryFilter::new();

    for (name, raw, slot) in [
        ("timeFrom", params.time_from.as_ref(), &mut filter.time_from),
        ("timeTo", params.time_to.as_ref(), &mut filter.time_to),
    ] {
        if let Some(raw) = present(raw) {
            let parsed = parse_timestamp(raw).ok_or_else(|| {
                invalid(
                    ErrorCode::InvalidTimeRange,
                    format!("Invalid {name} parameter. Must be ISO 8601 format."),
                )
            })?;
            *slot = Some(parsed);
        }
    }

    if let Some(raw) = present(params.level.as_ref()) {
        filter.level = Some(LogLevel::from_str(raw).map_err(|_| level_error())?);
    }

    if let Some(raw) = present(params.limit.as_ref()) {
        let limit = raw
            .parse::<usize>()
            .ok()
            .filter(|l| (1..=MAX_LIMIT).contains(l))
            .ok_or_else(|| {
                invalid(
                    ErrorCode::InvalidLimit,
                    "Limit must be a number between 1 and 1000.",
                )
            })?;
        filter.limit = Some(limit);
    }

    if let Some(raw) = present(params.offset.as_ref()) {
        let offset = raw.parse::<usize>().map_err(|_| {
            invalid(ErrorCode::InvalidOffset, "Offset must be a non-negative number.")
        })?;
        filter.offset = Some(offset);
    }

    filter.subject = present(params.subject.as_ref()).map(str::to_string);
    filter.text = present(params.text.as_ref()).map(str::to_string);
    filter.request_id = present(params.request_id.as_ref()).map(str::to_string);
    filter.session_id = present(params.session_id.as_ref()).map(str::to_string);
    filter.lightweight = parse_lightweight(params.lightweight.as_ref());

    Ok(filter)
}

/// Parses paging parameters leniently: bad values fall back to defaults and
/// out-of-range values are clamped.
#[must_use]
pub fn page_filter(params: &PageParams) -> QueryFilter {
    let limit = present(params.limit.as_ref())
        .and_then(|raw| raw.parse::<i64>().ok())
        .filter(|l| *l != 0)
        .map_or(DEFAULT_LIMIT, |l| usize::try_from(l).map_or(1, |l| l.min(MAX_LIMIT)));
    let offset = present(params.offset.as_ref())
        .and_then(|raw| raw.parse::<i64>().ok())
        .map_or(0, |o| usize::try_from(o.max(0)).unwrap_or(0));

    let mut filter = QueryFilter::new().with_limit(limit).with_offset(offset);
    filter.lightweight = parse_lightweight(params.lightweight.as_ref());
    filter
}
