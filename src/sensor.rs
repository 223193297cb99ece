//! Sensor identity and the sensor itself.
//!
//! A [`Sensor`] owns its identity, its generator state and its timing. It
//! turns raw generator output into [`EnrichedReading`]s stamped at call
//! time. No I/O happens here.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::generator::{
    Baseline, EnvironmentalSource, ReadingSource, SimulationState, DEFAULT_DAY_PERIOD_TICKS,
};
use crate::models::EnrichedReading;

// ---

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(5);

/// Shortest cadence a sensor accepts; a zero interval cannot be scheduled.
const MIN_UPDATE_INTERVAL: Duration = Duration::from_millis(1);

/// Topic a sensor publishes its readings on.
pub fn topic_for(sensor_id: impl fmt::Display) -> String {
    format!("sensors/{}/data", sensor_id)
}

/// Immutable identity of one sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorIdentity {
    // ---
    pub sensor_id: Uuid,
    pub name: String,
    pub location: String,
}

impl SensorIdentity {
    /// New identity with a freshly generated random (v4) identifier.
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            sensor_id: Uuid::new_v4(),
            name: name.into(),
            location: location.into(),
        }
    }
}

/// Everything needed to build one environmental sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorConfig {
    // ---
    pub name: String,
    pub location: String,
    pub baseline: Baseline,
    pub update_interval: Duration,
    pub day_period_ticks: u64,
}

impl SensorConfig {
    /// Config named after its location, with default timing.
    pub fn for_location(location: &str, baseline: Baseline) -> Self {
        Self {
            name: format!("{} Environmental Sensor", location),
            location: location.to_string(),
            baseline,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            day_period_ticks: DEFAULT_DAY_PERIOD_TICKS,
        }
    }
}

pub struct Sensor {
    // ---
    identity: SensorIdentity,
    state: SimulationState,
    source: Box<dyn ReadingSource>,
    update_interval: Duration,
    last_timestamp: Option<DateTime<Utc>>,
}

impl fmt::Debug for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sensor")
            .field("identity", &self.identity)
            .field("state", &self.state)
            .field("update_interval", &self.update_interval)
            .finish_non_exhaustive()
    }
}

impl Sensor {
    // ---
    pub fn new(
        identity: SensorIdentity,
        state: SimulationState,
        source: Box<dyn ReadingSource>,
        update_interval: Duration,
    ) -> Self {
        Self {
            identity,
            state,
            source,
            update_interval: update_interval.max(MIN_UPDATE_INTERVAL),
            last_timestamp: None,
        }
    }

    /// Environmental sensor with random noise, built from its config.
    pub fn environmental(config: &SensorConfig) -> Self {
        // ---
        Self::new(
            SensorIdentity::new(&config.name, &config.location),
            SimulationState::with_period(config.baseline, config.day_period_ticks),
            Box::new(EnvironmentalSource::new()),
            config.update_interval,
        )
    }

    pub fn identity(&self) -> &SensorIdentity {
        &self.identity
    }

    pub fn id(&self) -> Uuid {
        self.identity.sensor_id
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn topic(&self) -> String {
        topic_for(self.identity.sensor_id)
    }

    /// Generate one reading and stamp it with this sensor's identity.
    ///
    /// The timestamp is taken here, not at publish time, and never goes
    /// backwards for a given sensor even if the wall clock does.
    pub fn next_enriched_reading(&mut self) -> EnrichedReading {
        // ---
        let reading = self.source.generate(&mut self.state);

        let now = Utc::now();
        let timestamp = match self.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_timestamp = Some(timestamp);

        EnrichedReading {
            sensor_id: self.identity.sensor_id,
            timestamp,
            name: self.identity.name.clone(),
            location: self.identity.location.clone(),
            reading,
        }
    }
}
