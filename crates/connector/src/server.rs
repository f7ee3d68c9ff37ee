use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::metrics::encode_metrics;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub engine: String,
    pub running_sessions: usize,
}

/// Shared state for health endpoints
#[derive(Clone)]
pub struct ServerState {
    pub engine_name: String,
    pub running_sessions: Arc<AtomicUsize>,
}

impl ServerState {
    pub fn new(engine_name: impl Into<String>, running_sessions: Arc<AtomicUsize>) -> Self {
        Self {
            engine_name: engine_name.into(),
            running_sessions,
        }
    }
}

/// Health endpoint - always returns 200 if server is running
async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        engine: state.engine_name.clone(),
        running_sessions: state.running_sessions.load(Ordering::SeqCst),
    })
}

/// Ready endpoint - returns 200 once at least one session is running
async fn ready(State(state): State<ServerState>) -> (StatusCode, Json<HealthResponse>) {
    let running = state.running_sessions.load(Ordering::SeqCst);
    let status_code = if running > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if running > 0 { "ready" } else { "not_ready" }.to_string(),
            engine: state.engine_name.clone(),
            running_sessions: running,
        }),
    )
}

/// Prometheus text exposition
async fn metrics() -> impl IntoResponse {
    match encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            e.to_string(),
        ),
    }
}

/// Create the health server router
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Run the health server
pub async fn run_server(addr: SocketAddr, state: ServerState) -> std::io::Result<()> {
    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
