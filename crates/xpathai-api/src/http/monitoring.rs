//! Health and probe handlers.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::state::AppState;

/// `GET /health` body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the API answers.
    pub status: &'static str,
    /// `ready`, `loading` or `unhealthy`.
    pub server_status: &'static str,
    /// `running`, `dead` or `stopped`.
    pub process_status: &'static str,
    pub model: Option<String>,
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub requests: u64,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let status = state.switchboard.supervisor().status();
    Json(HealthResponse {
        status: "ok",
        server_status: status.state.server_status(),
        process_status: status.state.process_status(),
        model: status.model,
        pid: status.pid,
        exit_code: status.exit_code,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime().as_secs(),
        requests: state.request_count(),
    })
}

/// Liveness probe: the API process answers.
pub async fn liveness_probe() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "alive"
    }))
}

/// Readiness probe: a model is loaded and serving.
pub async fn readiness_probe(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.switchboard.supervisor().status();
    let code = if status.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(serde_json::json!({
            "status": status.state.as_str(),
            "model": status.model,
        })),
    )
}
