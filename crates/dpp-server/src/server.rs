//! Axum router: health, visibility, relay status, metrics and WebSocket upgrade.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, Request, State};
use axum::middleware::{self, Next};
use axum::response::{Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::health::{self, HealthResponse, RelayStatus};
use crate::poller::PollerHealth;
use crate::state::StateCache;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::session::run_session;

/// Body served for every request that is neither an API route nor an upgrade.
pub const FALLBACK_TEXT: &str = "👋 DPPRegistryBackend is running!";

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Latest status per panel.
    pub cache: Arc<StateCache>,
    /// Connected WebSocket clients.
    pub registry: Arc<ConnectionRegistry>,
    /// Poller progress, written by the poller task.
    pub health: Arc<PollerHealth>,
    /// Fires on shutdown; sessions close their sockets when it does.
    pub cancel: CancellationToken,
    /// Session tasks, awaited on shutdown.
    pub sessions: TaskTracker,
    /// Renders `/metrics`.
    pub metrics: PrometheusHandle,
    /// When the relay started.
    pub start_time: Instant,
    /// Outbound queue length for new clients.
    pub client_buffer_size: usize,
}

/// Build the router with all routes.
///
/// WebSocket upgrades are accepted on every path, ahead of routing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/test", get(test_handler))
        .route("/api/visibility", get(visibility_handler))
        .route("/api/relay", get(relay_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(fallback_handler)
        .method_not_allowed_fallback(fallback_handler)
        .layer(middleware::from_fn_with_state(state.clone(), upgrade_first))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /api/test
async fn test_handler() -> Json<HealthResponse> {
    Json(health::health_check())
}

/// GET /api/visibility
async fn visibility_handler(State(state): State<AppState>) -> Json<BTreeMap<String, String>> {
    Json(state.cache.snapshot())
}

/// GET /api/relay
async fn relay_handler(State(state): State<AppState>) -> Json<RelayStatus> {
    Json(health::relay_status(
        state.start_time,
        state.health.status(),
        state.registry.len(),
        state.cache.len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}

/// Upgrade WebSocket requests on any path; pass everything else to the router.
async fn upgrade_first(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let (mut parts, body) = req.into_parts();
    match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(ws) => {
            let registry = Arc::clone(&state.registry);
            let buffer = state.client_buffer_size;
            let cancel = state.cancel.clone();
            let sessions = state.sessions.clone();
            ws.on_upgrade(move |socket| {
                sessions.track_future(run_session(socket, registry, buffer, cancel))
            })
        }
        Err(_) => next.run(Request::from_parts(parts, body)).await,
    }
}

async fn fallback_handler() -> &'static str {
    FALLBACK_TEXT
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    use super::*;

    fn make_state() -> AppState {
        AppState {
            cache: Arc::new(StateCache::new()),
            registry: Arc::new(ConnectionRegistry::new()),
            health: Arc::new(PollerHealth::new(5)),
            cancel: CancellationToken::new(),
            sessions: TaskTracker::new(),
            metrics: PrometheusBuilder::new().build_recorder().handle(),
            start_time: Instant::now(),
            client_buffer_size: 16,
        }
    }

    async fn send(app: Router, method: Method, uri: &str) -> (StatusCode, Option<String>, String) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn api_test_returns_success_json() {
        let (status, ct, body) = send(build_router(make_state()), Method::GET, "/api/test").await;
        assert_eq!(status, StatusCode::OK);
        assert!(ct.unwrap().starts_with("application/json"));
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["status"], "success");
        assert!(parsed["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn visibility_returns_snapshot() {
        let state = make_state();
        state.cache.set("P1", "fault");
        state.cache.set("P2", "installed");

        let (status, _, body) = send(build_router(state), Method::GET, "/api/visibility").await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed, serde_json::json!({"P1": "fault", "P2": "installed"}));
    }

    #[tokio::test]
    async fn visibility_empty_cache_is_empty_object() {
        let (_, _, body) = send(build_router(make_state()), Method::GET, "/api/visibility").await;
        assert_eq!(body, "{}");
    }

    #[tokio::test]
    async fn relay_status_reports_counts() {
        let state = make_state();
        state.cache.set("P1", "fault");
        let (status, _, body) = send(build_router(state), Method::GET, "/api/relay").await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["trackedPanels"], 1);
        assert_eq!(parsed["connectedClients"], 0);
        assert_eq!(parsed["poller"]["degraded"], false);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders() {
        let (status, _, _) = send(build_router(make_state()), Method::GET, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_path_returns_fallback_text() {
        let (status, ct, body) = send(build_router(make_state()), Method::GET, "/nope").await;
        assert_eq!(status, StatusCode::OK);
        assert!(ct.unwrap().starts_with("text/plain"));
        assert_eq!(body, FALLBACK_TEXT);
    }

    #[tokio::test]
    async fn root_returns_fallback_text() {
        let (status, _, body) = send(build_router(make_state()), Method::GET, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, FALLBACK_TEXT);
    }

    #[tokio::test]
    async fn plain_get_on_ws_path_returns_fallback_text() {
        let (status, _, body) = send(build_router(make_state()), Method::GET, "/ws").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, FALLBACK_TEXT);
    }

    #[tokio::test]
    async fn wrong_method_on_api_route_returns_fallback_text() {
        let (status, _, body) = send(build_router(make_state()), Method::POST, "/api/test").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, FALLBACK_TEXT);
    }
}
