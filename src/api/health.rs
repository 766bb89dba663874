//! Health check endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use super::ApiState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Detailed readiness response
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    /// Registered devices
    pub devices: usize,
    pub connections: Vec<String>,
    pub checks: ReadinessChecks,
}

/// Individual readiness checks
#[derive(Serialize)]
pub struct ReadinessChecks {
    pub backend: CheckResult,
}

/// Result of a single health check
#[derive(Serialize)]
pub struct CheckResult {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckResult {
    const fn ok() -> Self {
        Self {
            status: "ok",
            message: None,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            status: "fail",
            message: Some(message.into()),
        }
    }
}

/// Liveness check - is the service running?
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check - can the bridge reach a backend at all?
async fn ready(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<ReadinessResponse>) {
    let backend = if state.connections.is_empty() {
        CheckResult::fail("no backend connection configured")
    } else {
        CheckResult::ok()
    };
    let all_ok = backend.status == "ok";
    let devices = state.registry.read().await.len();

    (
        if all_ok {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        },
        Json(ReadinessResponse {
            status: if all_ok { "ok" } else { "degraded" },
            devices,
            connections: state.connections.clone(),
            checks: ReadinessChecks { backend },
        }),
    )
}

/// Create the liveness router
pub fn router() -> Router {
    Router::new().route("/health", get(health))
}

/// Create the readiness router
pub fn ready_router(state: Arc<ApiState>) -> Router {
    Router::new().route("/ready", get(ready)).with_state(state)
}
