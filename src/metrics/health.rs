//! Health check endpoints and Prometheus metrics server
//!
//! Serves liveness, readiness, Prometheus metrics and a queue statistics
//! summary over HTTP using Axum.

use crate::metrics::collector::MetricsCollector;
use crate::service::app::AppState;
use crate::service::health::{HealthCheck, HealthStatus};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock, Weak};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const SERVICE_NAME: &str = "pickup-room";

/// Health server configuration
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    pub port: u16,
    /// Host to bind to (typically "0.0.0.0" for all interfaces)
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Shared state for the health server
///
/// The application state owns the server, so the server only keeps a weak
/// reference to it, set once the application is running.
#[derive(Clone)]
pub struct HealthServerState {
    pub metrics_collector: Arc<MetricsCollector>,
    app_state: Arc<OnceLock<Weak<AppState>>>,
}

impl HealthServerState {
    fn app_state(&self) -> Option<Arc<AppState>> {
        self.app_state.get().and_then(Weak::upgrade)
    }
}

/// HTTP server for the monitoring endpoints
pub struct HealthServer {
    config: HealthServerConfig,
    state: HealthServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    pub fn new(config: HealthServerConfig, metrics_collector: Arc<MetricsCollector>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state: HealthServerState {
                metrics_collector,
                app_state: Arc::new(OnceLock::new()),
            },
            shutdown_tx,
        }
    }

    pub fn with_app_state(self, app_state: &Arc<AppState>) -> Self {
        self.attach(app_state);
        self
    }

    /// Attach the application state the health checks inspect; only the
    /// first attachment counts
    pub fn attach(&self, app_state: &Arc<AppState>) {
        if self.state.app_state.set(Arc::downgrade(app_state)).is_err() {
            debug!("Health server already has an application state");
        }
    }

    pub fn config(&self) -> &HealthServerConfig {
        &self.config
    }

    /// Serve until [`HealthServer::stop`] is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid health server address")?;

        let app = self.create_router();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind health server to {}", addr))?;

        info!("Health server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Health server shutdown signal received");
            })
            .await?;

        info!("Health server stopped");
        Ok(())
    }

    fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .route("/alive", get(alive_handler))
            .route("/metrics", get(metrics_handler))
            .route("/stats", get(stats_handler))
            .with_state(self.state.clone())
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stopping health server...");

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to health server: {}", e);
        }
        Ok(())
    }
}

fn status_body(status: &str) -> Value {
    json!({
        "status": status,
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION")
    })
}

fn service_error(message: &str) -> Value {
    json!({
        "service": {
            "name": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "status": "error"
        },
        "error": message,
        "timestamp": chrono::Utc::now()
    })
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/health", "/ready", "/alive", "/metrics", "/stats"]
    }))
}

/// Liveness with a JSON body
async fn health_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Health check requested");

    let Some(app_state) = state.app_state() else {
        let mut body = status_body("unhealthy");
        body["error"] = json!("Service not initialized");
        return (StatusCode::SERVICE_UNAVAILABLE, Json(body));
    };

    match HealthCheck::liveness_check(app_state).await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, Json(status_body("healthy"))),
        Ok(HealthStatus::Degraded) => (StatusCode::OK, Json(status_body("degraded"))),
        Ok(HealthStatus::Unhealthy) | Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(status_body("unhealthy")),
        ),
    }
}

/// Plain-text health check answer; degraded counts as passing only where `degraded_ok`
fn check_reply(
    check: &str,
    outcome: Result<HealthStatus>,
    degraded_ok: bool,
) -> (StatusCode, String) {
    match outcome {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, format!("{} ok", check)),
        Ok(HealthStatus::Degraded) if degraded_ok => {
            (StatusCode::OK, format!("{} ok (degraded)", check))
        }
        Ok(status) => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("{} failed: {}", check, status),
        ),
        Err(e) => {
            error!("{} check failed: {}", check, e);
            (StatusCode::SERVICE_UNAVAILABLE, format!("{} failed", check))
        }
    }
}

async fn ready_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let Some(app_state) = state.app_state() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "not initialized".to_string());
    };
    check_reply("readiness", HealthCheck::readiness_check(app_state).await, true)
}

async fn alive_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let Some(app_state) = state.app_state() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "not initialized".to_string());
    };
    check_reply("liveness", HealthCheck::liveness_check(app_state).await, false)
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<HealthServerState>) -> Response {
    match HealthEndpoints::get_metrics_text(state.metrics_collector.clone()).await {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            text,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics".to_string(),
            )
                .into_response()
        }
    }
}

/// Queue statistics and component checks for human consumption
async fn stats_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Stats endpoint requested");

    let Some(app_state) = state.app_state() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(service_error("Service not initialized")),
        );
    };

    match HealthCheck::check(app_state).await {
        Ok(health) => {
            let stats = &health.stats;
            let body = json!({
                "service": {
                    "name": SERVICE_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                    "status": health.status,
                    "uptime": stats.uptime_info
                },
                "queues": {
                    "active": stats.active_queues,
                    "created": stats.queues_created,
                    "removed": stats.queues_removed
                },
                "players": {
                    "subscribed": stats.players_subscribed,
                    "wait_listed": stats.players_wait_listed,
                    "promotions": stats.promotions
                },
                "games": {
                    "started": stats.games_started,
                    "stopped": stats.games_stopped
                },
                "components": health.checks,
                "timestamp": chrono::Utc::now()
            });
            (StatusCode::OK, Json(body))
        }
        Err(e) => {
            error!("Failed to get stats: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(service_error("Failed to get service stats")),
            )
        }
    }
}

/// Programmatic access to what the endpoints serve
pub struct HealthEndpoints;

impl HealthEndpoints {
    pub async fn get_health_status(app_state: Option<Arc<AppState>>) -> Result<Value> {
        let Some(state) = app_state else {
            let mut body = status_body("unhealthy");
            body["error"] = json!("Service not initialized");
            return Ok(body);
        };

        let status = match HealthCheck::liveness_check(state).await {
            Ok(HealthStatus::Healthy) => "healthy",
            Ok(HealthStatus::Degraded) => "degraded",
            Ok(HealthStatus::Unhealthy) | Err(_) => "unhealthy",
        };
        Ok(status_body(status))
    }

    pub async fn get_metrics_text(metrics_collector: Arc<MetricsCollector>) -> Result<String> {
        let metric_families = metrics_collector.registry().gather();
        let encoder = TextEncoder::new();

        encoder
            .encode_to_string(&metric_families)
            .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use axum::{body::Body, http::Request};
    use std::time::Duration;
    use tower::ServiceExt;

    fn router(app_state: Option<&Arc<AppState>>) -> Router {
        let collector = Arc::new(MetricsCollector::new().expect("Failed to create collector"));
        let mut server = HealthServer::new(HealthServerConfig::default(), collector);
        if let Some(app_state) = app_state {
            server = server.with_app_state(app_state);
        }
        server.create_router()
    }

    async fn get(app: Router, uri: &str) -> Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_root_endpoint() {
        let response = get(router(None), "/").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let collector = Arc::new(MetricsCollector::new().expect("Failed to create collector"));
        collector.record_queue_created();
        collector.record_rcon_request("status", true, Duration::from_millis(12));
        collector.update_health_status(2);

        let app = HealthServer::new(HealthServerConfig::default(), collector).create_router();
        let response = get(app, "/metrics").await;

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));
    }

    #[tokio::test]
    async fn test_endpoints_without_app_state() {
        let app = router(None);
        for uri in ["/health", "/ready", "/alive", "/stats"] {
            let response = get(app.clone(), uri).await;
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_endpoints_with_running_app_state() {
        let app_state = Arc::new(AppState::new(AppConfig::default()).await.unwrap());
        app_state.mark_running(true).await;
        let app = router(Some(&app_state));

        for uri in ["/health", "/ready", "/alive", "/stats"] {
            let response = get(app.clone(), uri).await;
            assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        }

        drop(app_state);
        let response = get(app, "/alive").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_404_handling() {
        let response = get(router(None), "/nonexistent").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_endpoints_programmatic() {
        let collector = Arc::new(MetricsCollector::new().expect("Failed to create collector"));

        let health_status = HealthEndpoints::get_health_status(None).await.unwrap();
        assert_eq!(health_status["status"], "unhealthy");
        assert_eq!(health_status["service"], SERVICE_NAME);

        let metrics_text = HealthEndpoints::get_metrics_text(collector).await.unwrap();
        assert!(metrics_text.contains("pickup_room"));
    }
}
