use axum::extract::{FromRef, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::gate::Gate;
use crate::health::HealthChecker;
use crate::proxy::Upstream;

/// Router state shared by the gate, the proxy fallback and health checks.
#[derive(Clone)]
pub struct AppState {
    pub gate: Gate,
    pub upstream: Upstream,
    pub health: HealthChecker,
}

impl FromRef<AppState> for Gate {
    fn from_ref(state: &AppState) -> Self {
        state.gate.clone()
    }
}

impl FromRef<AppState> for Upstream {
    fn from_ref(state: &AppState) -> Self {
        state.upstream.clone()
    }
}

impl FromRef<AppState> for HealthChecker {
    fn from_ref(state: &AppState) -> Self {
        state.health.clone()
    }
}

/// Health check endpoint
pub async fn health_check(State(health): State<HealthChecker>) -> impl IntoResponse {
    Json(health.check_health().await)
}

/// Readiness check endpoint
pub async fn readiness_check(State(health): State<HealthChecker>) -> impl IntoResponse {
    if health.is_ready() {
        (StatusCode::OK, Json(serde_json::json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "note": "Rate limit store unavailable"
            })),
        )
    }
}
