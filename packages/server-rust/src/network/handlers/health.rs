//! Health, liveness, and readiness endpoint handlers.
//!
//! These handlers expose server health information for orchestrators
//! (Kubernetes, load balancers) and operational monitoring.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::network::HealthState;

/// Returns detailed health information as JSON.
///
/// Always returns 200; the `state` field tells whether the server is
/// actually serving, so monitoring can tell "up but draining" from "down".
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let health = state.shutdown.health_state();
    let registry = state.cache.registry();

    Json(json!({
        "state": health.as_str(),
        "backend": state.cache.factory_name(),
        "tenants": registry.len(),
        "cachedConnections": state.cache.len(),
        "inFlight": state.shutdown.in_flight_count(),
        "uptimeSecs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness probe: always 200 while the process responds.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: 200 when serving and the connection cache accepts
/// acquisitions, 503 otherwise.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready && state.cache.is_accepting() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
