//! Route gateway for the read-only status API.
//!
//! Sibling modules each export a subrouter; this gateway merges them and
//! attaches the shared [`FleetStatus`] state, so `main.rs` only needs to
//! know about [`router`].

use std::sync::Arc;

use axum::Router;

use crate::SensorMonitor;

mod health;
mod sensors;

// ---

/// Shared view of every sensor in the running fleet.
#[derive(Clone)]
pub struct FleetStatus {
    monitors: Arc<[SensorMonitor]>,
}

impl FleetStatus {
    pub fn new(monitors: Vec<SensorMonitor>) -> Self {
        Self {
            monitors: monitors.into(),
        }
    }

    pub fn monitors(&self) -> &[SensorMonitor] {
        &self.monitors
    }
}

pub fn router(status: FleetStatus) -> Router {
    // ---
    Router::new()
        .merge(sensors::router())
        .merge(health::router())
        .with_state(status)
}
