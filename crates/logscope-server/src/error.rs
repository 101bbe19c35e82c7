//! Error types for the HTTP server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use logscope_core::LogError;
use serde::Serialize;
use thiserror::Error;

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Machine-readable error codes carried in the `errorCode` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Body is not a JSON object
    InvalidJson,
    /// Body exceeds the request size limit
    PayloadTooLarge,
    /// Timestamp missing or not RFC 3339
    InvalidTimestamp,
    /// Level missing or outside the enumeration
    InvalidLevel,
    /// Subject missing or blank
    InvalidSubject,
    /// Subject longer than the maximum
    SubjectTooLong,
    /// Message longer than the maximum
    MessageTooLong,
    /// Source missing or not an object
    InvalidSource,
    /// Runtime missing or unknown
    InvalidRuntime,
    /// Serialized payload larger than the maximum
    ContentTooLarge,
    /// Search time bound not parseable
    InvalidTimeRange,
    /// Search limit out of range
    InvalidLimit,
    /// Search offset negative or not a number
    InvalidOffset,
    /// No entry with the requested id
    NotFound,
    /// API key missing or wrong
    Unauthorized,
    /// Client exceeded the collect rate limit
    RateLimitExceeded,
    /// Anything the client cannot fix
    ServerError,
}

impl ErrorCode {
    /// HTTP status used for this code.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::PayloadTooLarge | Self::ContentTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Errors that can occur while serving requests.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A request failed validation.
    #[error("{message}")]
    Validation {
        /// Error code reported to the client
        code: ErrorCode,
        /// Human-readable reason
        message: String,
    },

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Missing or wrong API key.
    #[error("{0}")]
    Unauthorized(&'static str),

    /// Collect rate limit exceeded.
    #[error("Too many requests. Rate limit exceeded.")]
    RateLimited,

    /// The log pipeline failed.
    #[error("{context}: {source}")]
    Pipeline {
        /// What the server was doing
        context: &'static str,
        /// Underlying failure
        #[source]
        source: LogError,
    },

    /// Failed to bind to the specified address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(std::net::SocketAddr, std::io::Error),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Creates a validation error.
    pub fn validation(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
        }
    }

    /// Wraps a pipeline failure with the operation that hit it.
    #[must_use]
    pub const fn pipeline(context: &'static str, source: LogError) -> Self {
        Self::Pipeline { context, source }
    }

    /// Returns the client-facing error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { code, .. } => *code,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::RateLimited => ErrorCode::RateLimitExceeded,
            Self::Pipeline { .. } | Self::BindFailed(_, _) | Self::Internal(_) => {
                ErrorCode::ServerError
            }
        }
    }

    /// Message safe to show to clients. Internal detail stays in the logs.
    fn public_message(&self) -> String {
        match self {
            Self::Pipeline { context, .. } => format!("Failed to {context}"),
            Self::BindFailed(_, _) | Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// JSON error envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    success: bool,
    error: String,
    error_code: ErrorCode,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let code = self.code();
        if code == ErrorCode::ServerError {
            tracing::error!(error = %self, "Request failed");
        }

        let body = ErrorBody {
            success: false,
            error: self.public_message(),
            error_code: code,
        };

        let json = serde_json::to_string(&body).unwrap_or_else(|_| {
            r#"{"success":false,"error":"Internal server error","errorCode":"SERVER_ERROR"}"#
                .to_string()
        });

        (
            code.status(),
            [("content-type", "application/json")],
            json,
        )
            .into_response()
    }
}
