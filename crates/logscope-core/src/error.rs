//! Error types for the log pipeline.

use thiserror::Error;

/// Errors that can occur in the log pipeline.
///
/// Lookup misses are not errors; they surface as `None`.
#[derive(Debug, Error)]
pub enum LogError {
    /// A required field was not provided.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A level name outside the fixed enumeration.
    #[error("invalid log level: {0}")]
    InvalidLevel(String),

    /// A runtime name other than backend or frontend.
    #[error("invalid runtime: {0}")]
    InvalidRuntime(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking storage task could not be joined.
    #[error("storage task failed: {0}")]
    TaskFailed(String),
}

impl LogError {
    /// Returns true for failures of the durable store.
    #[must_use]
    pub const fn is_persistence(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Serialization(_) | Self::TaskFailed(_))
    }
}

/// Result type alias for log operations.
pub type Result<T> = std::result::Result<T, LogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = LogError::MissingField("subject");
        assert_eq!(err.to_string(), "missing required field: subject");

        let err = LogError::InvalidLevel("fatal".to_string());
        assert_eq!(err.to_string(), "invalid log level: fatal");

        let err = LogError::InvalidRuntime("deno".to_string());
        assert_eq!(err.to_string(), "invalid runtime: deno");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LogError>();
    }

    #[test]
    fn error_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: LogError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
        assert!(err.is_persistence());
    }

    #[test]
    fn validation_errors_are_not_persistence() {
        assert!(!LogError::MissingField("level").is_persistence());
        assert!(!LogError::InvalidLevel("x".to_string()).is_persistence());
    }
}
