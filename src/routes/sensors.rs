use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tracing::debug;
use uuid::Uuid;

use super::FleetStatus;
use crate::SensorSnapshot;

// ---

pub fn router() -> Router<FleetStatus> {
    // ---
    Router::new()
        .route("/sensors", get(list_sensors))
        .route("/sensors/{sensor_id}", get(get_sensor))
}

async fn list_sensors(State(status): State<FleetStatus>) -> Json<Vec<SensorSnapshot>> {
    // ---
    debug!("GET /sensors");
    Json(status.monitors().iter().map(|m| m.snapshot()).collect())
}

async fn get_sensor(
    Path(sensor_id): Path<Uuid>,
    State(status): State<FleetStatus>,
) -> impl IntoResponse {
    // ---
    debug!("GET /sensors/{}", sensor_id);

    match status
        .monitors()
        .iter()
        .find(|m| m.identity().sensor_id == sensor_id)
    {
        Some(monitor) => (StatusCode::OK, Json(monitor.snapshot())).into_response(),
        None => (StatusCode::NOT_FOUND, Json("Unknown sensor")).into_response(),
    }
}
