//! # logscope-server
//!
//! HTTP and WebSocket transport for the LogScope log pipeline.
//!
//! This crate exposes [`logscope_core::LogService`] over a REST API and a
//! WebSocket stream, built on the axum HTTP framework.
//!
//! ## Features
//!
//! - **Collection**: validated ingestion with per-client rate limiting
//! - **Search**: filtered, paginated queries with correlation lookups
//! - **Live stream**: WebSocket subscribers with level and subject filters
//! - **Retention**: scheduled sweeps plus an on-demand cleanup endpoint
//! - **Auth**: optional `X-API-Key` check on every `/api` route
//!
//! ## Example
//!
//! ```rust,no_run
//! use logscope_server::{LogScopeServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default().with_log_dir("/var/lib/logscope");
//!     let server = LogScopeServer::new(config);
//!     // server.serve_with_shutdown(async { /* wait for a signal */ }).await.unwrap();
//! }
//! ```
//!
//! ## API Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/api/logs/collect` | POST | Ingest one entry (rate limited) |
//! | `/api/logs/search` | GET | Filtered, paginated search |
//! | `/api/logs/correlation/request/{requestId}` | GET | Entries sharing a request id |
//! | `/api/logs/correlation/session/{sessionId}` | GET | Entries sharing a session id |
//! | `/api/logs/health` | GET | Entry counts per partition |
//! | `/api/logs/starred` | GET | Starred entry ids |
//! | `/api/logs/{eventId}/star` | POST, DELETE | Star or unstar an entry |
//! | `/api/logs` | DELETE | Delete everything except starred entries |
//! | `/api/logs/cleanup` | POST | Run one retention sweep |
//! | `/api/logs/{eventId}` | GET | Fetch one entry |
//! | `/health` | GET | Liveness and subscriber count |
//! | `/ws` | GET | WebSocket live stream |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod server;
pub mod state;
pub mod types;
pub mod validation;
pub mod websocket;

// Re-export main types
pub use auth::ApiKey;
pub use config::{Cli, RateLimitConfig, ServerConfig};
pub use error::{ErrorCode, ServerError, ServerResult};
pub use rate_limit::{RateDecision, RateLimiter};
pub use routes::create_router;
pub use server::{LogScopeServer, build_service};
pub use state::AppState;
pub use types::ApiResponse;
pub use websocket::ChannelSink;
