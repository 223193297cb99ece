// src/routes/health.rs
//! Fleet health check endpoint for the sensor simulator.
//!
//! This module defines the `/health` route used by container orchestrators
//! (e.g., Docker, Kubernetes) and CI pipelines to verify that the simulator
//! is up and that its sensors are publishing. It is a sibling module in the
//! `routes` directory and follows the Explicit Module Boundary Pattern (EMBP):
//! - Internal to this file: endpoint handler(s) and related types
//! - Exports to the gateway (`mod.rs`): a subrouter containing the `/health` route

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use super::FleetStatus;
use crate::RuntimeState;

/// JSON response body for the `/health` endpoint.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    running: usize,
    total: usize,
}

/// Handle `GET /health`.
///
/// Reports `ok` while at least one sensor is running (or the fleet is
/// empty), `degraded` otherwise. Only reads in-memory runtime state.
async fn health(State(status): State<FleetStatus>) -> Json<HealthResponse> {
    // ---
    let total = status.monitors().len();
    let running = status
        .monitors()
        .iter()
        .filter(|m| m.state() == RuntimeState::Running)
        .count();

    let status = if running > 0 || total == 0 {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        running,
        total,
    })
}

/// Create a subrouter containing the `/health` route.
pub fn router() -> Router<FleetStatus> {
    Router::new().route("/health", get(health))
}
