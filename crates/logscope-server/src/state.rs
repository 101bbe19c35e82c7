//! Shared state for the HTTP server.

use std::sync::Arc;
use std::time::Instant;

use logscope_core::LogService;

use crate::auth::ApiKey;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::rate_limit::RateLimiter;

/// State shared by every handler.
#[derive(Debug)]
pub struct AppState {
    /// Server configuration.
    config: Arc<ServerConfig>,
    /// The log pipeline.
    service: Arc<LogService>,
    /// Collect endpoint limiter.
    rate_limiter: RateLimiter,
    /// Required API key, if authentication is enabled.
    api_key: Option<ApiKey>,
    /// Server start time.
    start_time: Instant,
}

impl AppState {
    /// Create a new state over `service`.
    #[must_use]
    pub fn new(config: ServerConfig, service: Arc<LogService>) -> Self {
        let rate_limiter = RateLimiter::from_config(&config.rate_limit);
        let api_key = config.api_key.as_deref().map(ApiKey::new);
        Self {
            config: Arc::new(config),
            service,
            rate_limiter,
            api_key,
            start_time: Instant::now(),
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the log service.
    #[must_use]
    pub fn service(&self) -> &Arc<LogService> {
        &self.service
    }

    /// Get the collect rate limiter.
    #[must_use]
    pub const fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Get the required API key, if any.
    #[must_use]
    pub const fn api_key(&self) -> Option<&ApiKey> {
        self.api_key.as_ref()
    }

    /// Get server uptime in seconds.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Runs a storage-touching service call on the blocking pool.
    ///
    /// `context` names the operation in the client-facing error
    /// (`"Failed to {context}"`).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Pipeline`] if the call fails and
    /// [`ServerError::Internal`] if the blocking task panics.
    pub async fn blocking<T, F>(&self, context: &'static str, f: F) -> ServerResult<T>
    where
        F: FnOnce(&LogService) -> logscope_core::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let service = Arc::clone(&self.service);
        tokio::task::spawn_blocking(move || f(service.as_ref()))
            .await
            .map_err(|e| ServerError::Internal(format!("{context}: {e}")))?
            .map_err(|e| ServerError::pipeline(context, e))
    }
}
