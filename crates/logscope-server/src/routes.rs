//! Route configuration for the log API.

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::require_api_key;
use crate::config::ServerConfig;
use crate::handlers::{
    clear_logs, collect_log, get_log, health_check, list_starred, logs_by_request,
    logs_by_session, run_cleanup, search_logs, star_log, storage_health, unstar_log,
};
use crate::rate_limit::limit_by_client;
use crate::state::AppState;
use crate::websocket::ws_upgrade;

/// Create the log API router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(state.config());
    let body_limit = state.config().body_limit;

    let collect = post(collect_log)
        .route_layer(from_fn_with_state(Arc::clone(&state), limit_by_client));

    let log_routes = Router::new()
        // Ingestion
        .route("/collect", collect)
        // Queries
        .route("/search", get(search_logs))
        .route("/correlation/request/{request_id}", get(logs_by_request))
        .route("/correlation/session/{session_id}", get(logs_by_session))
        // Diagnostics
        .route("/health", get(storage_health))
        // Starred entries
        .route("/starred", get(list_starred))
        .route("/{event_id}/star", post(star_log).delete(unstar_log))
        // Maintenance
        .route("/", delete(clear_logs))
        .route("/cleanup", post(run_cleanup))
        .route("/{event_id}", get(get_log));

    let api_routes = Router::new()
        .nest("/logs", log_routes)
        .route_layer(from_fn_with_state(Arc::clone(&state), require_api_key));

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health_check))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::config::RateLimitConfig;
    use crate::server::build_service;

    struct TestApp {
        router: Router,
        state: Arc<AppState>,
        _dir: TempDir,
    }

    fn make_app(config: ServerConfig) -> TestApp {
        let dir = TempDir::new().expect("temp dir");
        let config = config.with_log_dir(dir.path());
        let service = build_service(&config);
        service.bootstrap().expect("bootstrap");
        let state = Arc::new(AppState::new(config, service));
        TestApp {
            router: create_router(Arc::clone(&state)),
            state,
            _dir: dir,
        }
    }

    fn test_app() -> TestApp {
        make_app(ServerConfig::default())
    }

    async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
        let response = app
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("response");
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).expect("json body")
        };
        (status, json)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    fn collect_req(body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/logs/collect")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn log_body(level: &str, subject: &str, request_id: &str) -> Value {
        json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "level": level,
            "subject": subject,
            "message": format!("{subject} message"),
            "source": {"runtime": "node", "function": "handle"},
            "correlation": {"requestId": request_id}
        })
    }

    async fn collect(app: &TestApp, level: &str, subject: &str, request_id: &str) -> String {
        let (status, json) = send(app, collect_req(&log_body(level, subject, request_id))).await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json["data"]["eventId"]
            .as_str()
            .expect("event id")
            .to_string()
    }

    // ===== Health Tests =====

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = test_app();
        let (status, json) = send(&app, get_req("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["subscribers"], 0);
    }

    #[tokio::test]
    async fn test_storage_health_endpoint() {
        let app = test_app();
        collect(&app, "info", "a", "r1").await;

        let (status, json) = send(&app, get_req("/api/logs/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["backend"]["count"], 1);
        assert_eq!(json["data"]["frontend"]["count"], 0);
        assert_eq!(json["data"]["total"], 1);
    }

    // ===== Collect Tests =====

    #[tokio::test]
    async fn test_collect_then_get() {
        let app = test_app();
        let id = collect(&app, "warn", "payments", "r1").await;

        let (status, json) = send(&app, get_req(&format!("/api/logs/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["eventId"], id.as_str());
        assert_eq!(json["data"]["source"]["runtime"], "backend");
        assert_eq!(json["data"]["source"]["file"], "unknown");
    }

    #[tokio::test]
    async fn test_collect_validation_error() {
        let app = test_app();
        let mut body = log_body("info", "x", "r1");
        body["level"] = json!("loud");

        let (status, json) = send(&app, collect_req(&body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
        assert_eq!(json["errorCode"], "INVALID_LEVEL");
    }

    #[tokio::test]
    async fn test_collect_invalid_json() {
        let app = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/api/logs/collect")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .expect("request");

        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errorCode"], "INVALID_JSON");
        assert_eq!(json["error"], "Invalid JSON in request body");
    }

    #[tokio::test]
    async fn test_collect_payload_too_large() {
        let app = make_app(ServerConfig::default().with_body_limit(1024));
        let mut body = log_body("info", "x", "r1");
        body["message"] = json!("m".repeat(2048));

        let (status, json) = send(&app, collect_req(&body)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["errorCode"], "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_collect_rate_limited() {
        let config = ServerConfig::default().with_rate_limit(RateLimitConfig {
            max_requests: 2,
            window: Duration::from_secs(60),
        });
        let app = make_app(config);
        let peer: SocketAddr = "10.1.1.1:5000".parse().expect("addr");

        let request = |subject: &str| {
            let mut req = collect_req(&log_body("info", subject, "r"));
            req.extensions_mut().insert(ConnectInfo(peer));
            req
        };

        let response = app
            .router
            .clone()
            .oneshot(request("one"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-ratelimit-limit"], "2");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "1");

        let (status, _) = send(&app, request("two")).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, json) = send(&app, request("three")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["errorCode"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(json["error"], "Too many requests. Rate limit exceeded.");

        // Search is not rate limited
        let (status, _) = send(&app, get_req("/api/logs/search")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.state.service().index().len(), 2);
    }

    // ===== Search Tests =====

    #[tokio::test]
    async fn test_search_filters_and_pages() {
        let app = test_app();
        collect(&app, "error", "auth-failed", "r1").await;
        collect(&app, "info", "auth-ok", "r2").await;
        collect(&app, "error", "db-timeout", "r3").await;

        let (status, json) = send(&app, get_req("/api/logs/search?level=error&limit=1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 2);
        assert_eq!(json["limit"], 1);
        assert_eq!(json["offset"], 0);
        assert_eq!(json["data"].as_array().map(Vec::len), Some(1));
        assert_eq!(json["data"][0]["subject"], "auth-failed");
        // Lightweight by default
        assert!(json["data"][0].get("correlation").is_none());

        let (_, json) = send(&app, get_req("/api/logs/search?subject=AUTH&lightweight=false")).await;
        assert_eq!(json["total"], 2);
        assert!(json["data"][0].get("correlation").is_some());
    }

    #[tokio::test]
    async fn test_search_rejects_bad_limit() {
        let app = test_app();
        let (status, json) = send(&app, get_req("/api/logs/search?limit=5000")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errorCode"], "INVALID_LIMIT");
    }

    #[tokio::test]
    async fn test_correlation_routes() {
        let app = test_app();
        collect(&app, "info", "a", "req-7").await;
        collect(&app, "info", "b", "req-8").await;

        let (status, json) = send(&app, get_req("/api/logs/correlation/request/req-7?limit=abc")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 1);
        assert_eq!(json["limit"], 100);

        let (_, json) = send(&app, get_req("/api/logs/correlation/session/none")).await;
        assert_eq!(json["total"], 0);
    }

    // ===== Starred / Maintenance Tests =====

    #[tokio::test]
    async fn test_star_clear_cycle() {
        let app = test_app();
        let keep = collect(&app, "info", "keep", "r1").await;
        collect(&app, "info", "drop", "r2").await;

        let star = Request::builder()
            .method("POST")
            .uri(format!("/api/logs/{keep}/star"))
            .body(Body::empty())
            .expect("request");
        let (status, json) = send(&app, star).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["starred"], true);

        let (_, json) = send(&app, get_req("/api/logs/starred")).await;
        assert_eq!(json["data"], json!([keep]));
        assert_eq!(json["total"], 1);

        let clear = Request::builder()
            .method("DELETE")
            .uri("/api/logs")
            .body(Body::empty())
            .expect("request");
        let (status, json) = send(&app, clear).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["kept"], 1);

        let (_, json) = send(&app, get_req("/api/logs/search")).await;
        assert_eq!(json["total"], 1);

        let unstar = Request::builder()
            .method("DELETE")
            .uri(format!("/api/logs/{keep}/star"))
            .body(Body::empty())
            .expect("request");
        let (status, json) = send(&app, unstar).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["starred"], false);
    }

    #[tokio::test]
    async fn test_cleanup_endpoint() {
        let app = test_app();
        collect(&app, "info", "fresh", "r1").await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/logs/cleanup")
            .body(Body::empty())
            .expect("request");
        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["expired"], 0);
        assert_eq!(json["data"]["evicted"], 0);
    }

    #[tokio::test]
    async fn test_get_unknown_log() {
        let app = test_app();
        let (status, json) = send(&app, get_req("/api/logs/does-not-exist")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["errorCode"], "NOT_FOUND");
    }

    // ===== Auth Tests =====

    #[tokio::test]
    async fn test_api_key_required() {
        let app = make_app(ServerConfig::default().with_api_key("s3cret"));

        let (status, json) = send(&app, get_req("/api/logs/search")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["errorCode"], "UNAUTHORIZED");
        assert_eq!(
            json["error"],
            "Missing API key. Provide it via the X-API-Key header."
        );

        let wrong = Request::builder()
            .uri("/api/logs/search")
            .header("X-API-Key", "nope")
            .body(Body::empty())
            .expect("request");
        let (status, json) = send(&app, wrong).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Invalid API key.");

        let right = Request::builder()
            .uri("/api/logs/search")
            .header("X-API-Key", "s3cret")
            .body(Body::empty())
            .expect("request");
        let (status, _) = send(&app, right).await;
        assert_eq!(status, StatusCode::OK);

        // Liveness stays open
        let (status, _) = send(&app, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
    }

    // ===== Routing Tests =====

    #[tokio::test]
    async fn test_cors_any_origin() {
        let app = test_app();
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/logs/search")
            .header("Origin", "http://example.com")
            .header("Access-Control-Request-Method", "GET")
            .body(Body::empty())
            .expect("request");

        let response = app.router.clone().oneshot(request).await.expect("response");
        assert!(response.status().is_success());
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn test_unknown_endpoint() {
        let app = test_app();
        let (status, _) = send(&app, get_req("/api/unknown")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
