//! HTTP Routes
//!
//! Observability endpoints served next to the WebSocket upgrade.
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health - Health status with session count
//! - GET /stats - Relay counters
//! - GET /thresholds - Warning and display bands

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use super::state::BroadcastState;
use crate::relay::MetricsSnapshot;
use crate::telemetry::ThresholdBand;

/// Response body for `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub consumers: usize,
    pub producers: u64,
}

/// Response body for `GET /stats`
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
    pub active_consumers: usize,
}

/// Response body for `GET /thresholds`
#[derive(Debug, Serialize)]
pub struct ThresholdsResponse {
    /// Band the relay warns on
    pub warning: ThresholdBand,
    /// Band dashboards colour values by
    pub display: ThresholdBand,
}

/// GET /health/live
///
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health
pub async fn health(State(state): State<Arc<BroadcastState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        consumers: state.registry.len().await,
        producers: state.metrics.active_producers(),
    })
}

/// GET /stats
pub async fn stats(State(state): State<Arc<BroadcastState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        metrics: state.metrics.snapshot(),
        active_consumers: state.registry.len().await,
    })
}

/// GET /thresholds
pub async fn thresholds(State(state): State<Arc<BroadcastState>>) -> Json<ThresholdsResponse> {
    Json(ThresholdsResponse {
        warning: state.thresholds.warning,
        display: state.thresholds.display,
    })
}
