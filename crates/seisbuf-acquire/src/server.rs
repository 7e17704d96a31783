//! HTTP server for health and metrics endpoints

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;

use crate::metrics::encode_metrics;

/// Default staleness threshold in seconds
const DEFAULT_STALE_THRESHOLD_SECS: u64 = 60;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_secs_ago: Option<u64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
}

#[derive(Clone)]
pub struct ServerState {
    pub source: String,
    /// Unix timestamp (seconds) of the last acquisition cycle, 0 if none
    pub last_cycle_epoch_secs: Arc<AtomicU64>,
    pub stale_threshold_secs: u64,
}

impl ServerState {
    pub fn new(source: impl Into<String>, last_cycle_epoch_secs: Arc<AtomicU64>) -> Self {
        Self {
            source: source.into(),
            last_cycle_epoch_secs,
            stale_threshold_secs: DEFAULT_STALE_THRESHOLD_SECS,
        }
    }

    fn staleness_info(&self) -> (Option<u64>, bool) {
        let last = self.last_cycle_epoch_secs.load(Ordering::SeqCst);
        if last == 0 {
            return (None, false);
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let secs_ago = now.saturating_sub(last);
        (Some(secs_ago), secs_ago > self.stale_threshold_secs)
    }
}

/// 200 while the cycle loop keeps turning, 503 once it stalls
async fn health(State(state): State<ServerState>) -> (StatusCode, Json<HealthResponse>) {
    let (last_cycle_secs_ago, stale) = state.staleness_info();
    let status_code = if stale {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status_code,
        Json(HealthResponse {
            status: if stale { "stale" } else { "ok" }.to_string(),
            source: state.source.clone(),
            last_cycle_secs_ago,
            stale,
        }),
    )
}

async fn metrics() -> impl IntoResponse {
    match encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {}", e),
        ),
    }
}

pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

pub async fn run_server(addr: SocketAddr, state: ServerState) -> std::io::Result<()> {
    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
