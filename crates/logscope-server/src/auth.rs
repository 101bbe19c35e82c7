//! API key authentication for `/api` routes.

use std::fmt;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The configured API key, held as a hash.
///
/// Candidates are hashed before comparison so the check takes the same time
/// whatever their length or content.
#[derive(Clone)]
pub struct ApiKey {
    hash: [u8; 32],
}

impl ApiKey {
    /// Creates a key from its plaintext.
    #[must_use]
    pub fn new(key: &str) -> Self {
        Self {
            hash: *blake3::hash(key.as_bytes()).as_bytes(),
        }
    }

    /// Verifies that `candidate` matches this key.
    #[must_use]
    pub fn verify(&self, candidate: &str) -> bool {
        let other = blake3::hash(candidate.as_bytes());
        self.hash.ct_eq(other.as_bytes()).into()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey").field("hash", &"[REDACTED]").finish()
    }
}

/// Rejects requests without a matching `X-API-Key` header. Passes everything
/// through when no key is configured.
///
/// # Errors
///
/// Returns [`ServerError::Unauthorized`] for a missing or wrong key.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> ServerResult<Response> {
    let Some(expected) = state.api_key() else {
        return Ok(next.run(request).await);
    };

    let Some(provided) = request.headers().get(API_KEY_HEADER) else {
        debug!(path = %request.uri().path(), "Request without API key");
        return Err(ServerError::Unauthorized(
            "Missing API key. Provide it via the X-API-Key header.",
        ));
    };

    let valid = provided.to_str().is_ok_and(|key| expected.verify(key));
    if !valid {
        debug!(path = %request.uri().path(), "Request with invalid API key");
        return Err(ServerError::Unauthorized("Invalid API key."));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_matches_only_the_key() {
        let key = ApiKey::new("s3cret");
        assert!(key.verify("s3cret"));
        assert!(!key.verify("s3cret "));
        assert!(!key.verify(""));
        assert!(!key.verify("S3CRET"));
    }

    #[test]
    fn debug_redacts() {
        let key = ApiKey::new("s3cret");
        let debug = format!("{key:?}");
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("REDACTED"));
    }
}
