//! Runtime events and the sinks that consume them.
//!
//! Every sensor runtime reports its state transitions and each publish
//! attempt as a [`RuntimeEvent`]. Sinks decide what to do with them; the
//! default [`TracingSink`] turns them into structured `tracing` events.
//!
//! ```text
//!   SensorRuntime ── emit(&RuntimeEvent) ──► EventSink
//!                                              ├─► TracingSink (logs)
//!                                              └─► custom sink (metrics, tests, ...)
//! ```

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::publisher::ConnectionState;
use crate::runtime::RuntimeState;

// ---

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    StateChanged {
        from: RuntimeState,
        to: RuntimeState,
    },
    ConnectionChanged(ConnectionState),
    ConnectFailed {
        error: String,
    },
    Published {
        topic: String,
    },
    PublishFailed {
        topic: String,
        error: String,
    },
    ReadingRejected {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeEvent {
    // ---
    pub sensor_id: Uuid,
    pub at: DateTime<Utc>,
    pub kind: EventKind,
}

impl RuntimeEvent {
    pub fn now(sensor_id: Uuid, kind: EventKind) -> Self {
        Self {
            sensor_id,
            at: Utc::now(),
            kind,
        }
    }
}

/// Consumer of runtime events. Called inline from the runtime, so
/// implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &RuntimeEvent);
}

/// Writes every event as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, e: &RuntimeEvent) {
        // ---
        let sensor_id = e.sensor_id;
        let at = e.at.to_rfc3339();

        match &e.kind {
            EventKind::StateChanged { from, to } => {
                info!(%sensor_id, %at, ?from, ?to, "sensor runtime state changed");
            }
            EventKind::ConnectionChanged(state) => {
                debug!(%sensor_id, %at, ?state, "connection state changed");
            }
            EventKind::ConnectFailed { error } => {
                error!(%sensor_id, %at, %error, "failed to connect to broker");
            }
            EventKind::Published { topic } => {
                debug!(%sensor_id, %at, %topic, "reading published");
            }
            EventKind::PublishFailed { topic, error } => {
                warn!(%sensor_id, %at, %topic, %error, "publish failed");
            }
            EventKind::ReadingRejected { reason } => {
                error!(%sensor_id, %at, %reason, "reading rejected");
            }
        }
    }
}
