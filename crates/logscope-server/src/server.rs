//! LogScope server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use logscope_core::{
    BroadcastHub, FileLogStorage, LogService, LogStorage, QueryIndex, RetentionEngine,
    RetentionScheduler, StarredSet,
};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::routes::create_router;
use crate::state::AppState;

/// Wires file storage, the query index, the hub, the starred set and the
/// retention engine into a [`LogService`].
///
/// Nothing touches the disk until [`LogService::bootstrap`] runs.
#[must_use]
pub fn build_service(config: &ServerConfig) -> Arc<LogService> {
    let storage: Arc<dyn LogStorage> = Arc::new(FileLogStorage::new(&config.log_dir));
    let index = Arc::new(QueryIndex::new(config.max_index_size));
    let starred = Arc::new(StarredSet::in_dir(&config.log_dir));
    let retention = Arc::new(RetentionEngine::new(
        config.retention.clone(),
        Arc::clone(&storage),
        Arc::clone(&index),
        Arc::clone(&starred),
    ));

    Arc::new(LogService::new(
        storage,
        index,
        Arc::new(BroadcastHub::new()),
        starred,
        retention,
    ))
}

/// HTTP and WebSocket server for log collection, search and live streaming.
#[derive(Debug, Clone)]
pub struct LogScopeServer {
    state: Arc<AppState>,
}

impl LogScopeServer {
    /// Create a new server with the given configuration.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let service = build_service(&config);
        let state = Arc::new(AppState::new(config, service));
        Self { state }
    }

    /// Get the server state for external access.
    #[must_use]
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Get the log service.
    #[must_use]
    pub fn service(&self) -> Arc<LogService> {
        Arc::clone(self.state.service())
    }

    /// Build the router without binding.
    #[must_use]
    pub fn router(&self) -> Router {
        create_router(self.state())
    }

    /// Prepares the log directory and fills the index from disk.
    ///
    /// Returns the number of entries found on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or its files cannot be read.
    pub async fn bootstrap(&self) -> ServerResult<usize> {
        let on_disk = self
            .state
            .blocking("load logs", LogService::bootstrap)
            .await?;
        info!(
            log_dir = %self.state.config().log_dir.display(),
            on_disk,
            "Log storage ready"
        );
        Ok(on_disk)
    }

    /// Start the server with graceful shutdown support.
    ///
    /// Bootstraps storage, starts the retention scheduler and serves until
    /// `shutdown` completes. The scheduler is stopped before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if bootstrapping or binding fails.
    pub async fn serve_with_shutdown<F>(&self, shutdown: F) -> ServerResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = self.state.config().bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(addr, e))?;

        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns an error if bootstrapping fails.
    pub async fn serve_on<F>(&self, listener: TcpListener, shutdown: F) -> ServerResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.bootstrap().await?;

        let scheduler = RetentionScheduler::start(Arc::clone(self.state.service().retention()));

        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        info!(addr = %addr, "LogScope server listening");

        let result = axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()));

        scheduler.shutdown().await;
        info!("LogScope server shut down");
        result
    }
}
