//! Simulated fleet of environmental sensors publishing telemetry over MQTT.
//!
//! Each sensor periodically generates a synthetic reading (temperature,
//! humidity, gas level around a daily cycle), stamps it with its identity
//! and publishes it on `sensors/{sensor_id}/data`. The fleet runs every
//! sensor on its own task and stops them all through one cancellation
//! token.
//!
//! Module layout, leaves first:
//! - `generator` – reading synthesis from simulation state
//! - `sensor` – identity + generator state → enriched readings
//! - `publisher` – transport capability (MQTT, in-memory)
//! - `runtime` – one sensor's connect / tick / disconnect state machine
//! - `fleet` – start, await and shut down many runtimes
//! - `routes` – read-only HTTP status API
//!
//! This crate follows the Explicit Module Boundary Pattern (EMBP): sibling
//! modules import from this gateway rather than reaching into each other's
//! internals where a re-export exists.

pub mod config;
pub mod error;
pub mod events;
pub mod fleet;
pub mod generator;
pub mod models;
pub mod publisher;
pub mod routes;
pub mod runtime;
pub mod sensor;

pub use config::Config;
pub use error::{ConnectionError, GenerationFault, PublishError};
pub use events::{EventKind, EventSink, RuntimeEvent, TracingSink};
pub use fleet::{FleetHandle, FleetReport, FleetSupervisor};
pub use generator::{
    Baseline, EnvironmentalSource, NoiseSource, RandomNoise, ReadingSource, SimulationState,
    ZeroNoise,
};
pub use models::{EnrichedReading, Reading};
pub use publisher::{ConnectionState, MemoryPublisher, MqttPublisher, MqttSettings, Publisher};
pub use routes::FleetStatus;
pub use runtime::{RuntimeState, SensorMonitor, SensorRuntime, SensorSnapshot};
pub use sensor::{topic_for, Sensor, SensorConfig, SensorIdentity};
