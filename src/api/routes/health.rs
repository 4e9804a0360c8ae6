//! Health Routes
//!
//! Liveness and readiness probes plus a full status view with engine
//! statistics.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::api::state::AppState;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub uptime_seconds: u64,
    pub groups: usize,
    pub segments: usize,
    pub rows: usize,
    pub properties: usize,
}

/// GET /health/live
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
pub async fn readiness(State(_state): State<Arc<AppState>>) -> StatusCode {
    StatusCode::OK
}

/// GET /health
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    let stats = state.engine.stats();
    Json(HealthStatus {
        status: "ok".to_string(),
        uptime_seconds: state.uptime_seconds(),
        groups: stats.group_count,
        segments: stats.segment_count,
        rows: stats.row_count,
        properties: state.properties.len().await,
    })
}
