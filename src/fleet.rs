//! Fleet supervisor: many independent sensor runtimes managed as a unit.
//!
//! Every runtime runs on its own task inside a `JoinSet` and holds a child
//! of one fleet-wide `CancellationToken`. Cancelling that token is the only
//! thing that stops every sensor at once; a runtime that fails never
//! affects its siblings and only shows up as `Failed` in the final
//! [`FleetReport`].

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::events::{EventSink, TracingSink};
use crate::publisher::Publisher;
use crate::runtime::{RuntimeState, SensorMonitor, SensorRuntime};
use crate::sensor::{Sensor, SensorConfig, SensorIdentity};

// ---

pub struct FleetSupervisor<F> {
    // ---
    make_publisher: F,
    sink: Arc<dyn EventSink>,
}

impl<F> FleetSupervisor<F>
where
    F: Fn(&SensorIdentity) -> Arc<dyn Publisher>,
{
    // ---
    /// `make_publisher` is called once per sensor.
    pub fn new(make_publisher: F) -> Self {
        Self {
            make_publisher,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Build one environmental sensor per config and start them all.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, configs: impl IntoIterator<Item = SensorConfig>) -> FleetHandle {
        // ---
        let sensors = configs.into_iter().map(|c| Sensor::environmental(&c));
        self.start_sensors(sensors)
    }

    /// Start a runtime for each already-built sensor.
    pub fn start_sensors(&self, sensors: impl IntoIterator<Item = Sensor>) -> FleetHandle {
        // ---
        let token = CancellationToken::new();
        let mut set = JoinSet::new();
        let mut monitors = Vec::new();

        for sensor in sensors {
            let publisher = (self.make_publisher)(sensor.identity());
            let runtime = SensorRuntime::new(sensor, publisher, self.sink.clone());
            let monitor = runtime.monitor();
            let id = runtime.id();
            let child = token.child_token();

            info!(
                "Started sensor: {} ({})",
                monitor.identity().name,
                monitor.identity().sensor_id
            );

            set.spawn(async move { (id, runtime.run(child).await) });
            monitors.push(monitor);
        }

        FleetHandle {
            token,
            set,
            monitors,
        }
    }
}

/// Terminal state of every runtime in a fleet.
#[derive(Debug, Default, Clone)]
pub struct FleetReport {
    // ---
    pub outcomes: Vec<(Uuid, RuntimeState)>,
    pub stopped: usize,
    pub failed: usize,
}

impl FleetReport {
    fn record(&mut self, id: Uuid, state: RuntimeState) {
        // ---
        match state {
            RuntimeState::Stopped => self.stopped += 1,
            _ => self.failed += 1,
        }
        self.outcomes.push((id, state));
    }

    pub fn total(&self) -> usize {
        self.stopped + self.failed
    }
}

/// A running fleet. Dropping the handle aborts every runtime; use
/// [`FleetHandle::shutdown`] for a clean stop.
pub struct FleetHandle {
    // ---
    token: CancellationToken,
    set: JoinSet<(Uuid, RuntimeState)>,
    monitors: Vec<SensorMonitor>,
}

impl FleetHandle {
    // ---
    pub fn monitors(&self) -> &[SensorMonitor] {
        &self.monitors
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// Token shared by the whole fleet; cancelling it stops every runtime.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Broadcast cancellation and wait until every runtime is terminal.
    pub async fn shutdown(self) -> FleetReport {
        // ---
        info!("Stopping {} sensors", self.monitors.len());
        self.token.cancel();
        self.await_all().await
    }

    /// Wait until every runtime reaches a terminal state on its own.
    pub async fn await_all(mut self) -> FleetReport {
        // ---
        let mut report = FleetReport::default();

        while let Some(joined) = self.set.join_next().await {
            match joined {
                Ok((id, state)) => report.record(id, state),
                Err(e) => {
                    error!("Sensor runtime task ended abnormally: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "All sensors terminated: {} stopped, {} failed",
            report.stopped, report.failed
        );
        report
    }
}
