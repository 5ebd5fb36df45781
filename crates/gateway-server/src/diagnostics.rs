//! Operator diagnostics endpoint
//!
//! - `GET /health`      liveness and version
//! - `GET /debug/stats` connection, status and buffer pool counters

use crate::pool::ReaderPool;
use crate::stats::{GatewayStats, StatsSnapshot};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
struct DiagnosticsState {
    stats: Arc<GatewayStats>,
    pool: Arc<ReaderPool>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_connections: u64,
}

pub fn router(stats: Arc<GatewayStats>, pool: Arc<ReaderPool>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/debug/stats", get(get_stats))
        .with_state(DiagnosticsState { stats, pool })
}

async fn health_check(State(state): State<DiagnosticsState>) -> Json<HealthResponse> {
    let snapshot = state.stats.snapshot(Default::default());

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_connections: snapshot.active,
    })
}

async fn get_stats(State(state): State<DiagnosticsState>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot(state.pool.stats()))
}

/// Serve `router` on `listener` until `shutdown` fires
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!("Diagnostics listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
