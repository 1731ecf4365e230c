//! Read-only HTTP surface over the register store and the packet log.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ConnectionMode;
use crate::history::{self, HistoryFilter, HistoryReport};
use crate::packet_log::{LogEntry, PacketLog};
use crate::registers::RegisterStore;

#[derive(Debug)]
pub struct ApiState {
    pub mode: ConnectionMode,
    pub store: Arc<RegisterStore>,
    pub log: Arc<PacketLog>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    capture_mode: String,
    registers: usize,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryParams {
    start: Option<String>,
    end: Option<String>,
    start_ts: Option<String>,
    end_ts: Option<String>,
}

async fn health_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok",
        capture_mode: state.mode.to_string(),
        registers: state.store.len(),
    };

    (StatusCode::OK, Json(response))
}

/// Runs a history extraction on the blocking pool; the handlers are pure
/// readers of the packet log.
async fn extract<F>(
    state: Arc<ApiState>,
    params: HistoryParams,
    extractor: F,
) -> Result<HistoryReport, StatusCode>
where
    F: FnOnce(&[LogEntry], &HistoryFilter) -> HistoryReport + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let filter = HistoryFilter::from_query(
            params.start.as_deref(),
            params.end.as_deref(),
            params.start_ts.as_deref(),
            params.end_ts.as_deref(),
        );
        let entries = state.log.read_entries();
        extractor(&entries, &filter)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn reads_handler(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<HistoryParams>,
) -> impl IntoResponse {
    match extract(state, params, history::read_history).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(status) => status.into_response(),
    }
}

async fn writes_handler(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<HistoryParams>,
) -> impl IntoResponse {
    match extract(state, params, history::write_history).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(status) => status.into_response(),
    }
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/history/reads", get(reads_handler))
        .route("/history/writes", get(writes_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_http_server(
    address: String,
    port: u16,
    state: Arc<ApiState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(state);

    let addr = format!("{}:{}", address, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("HTTP server shutting down");
        })
        .await?;

    Ok(())
}
