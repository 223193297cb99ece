//! Reading data models for the sensor simulator.
//!
//! A [`Reading`] is what a generator produces; an [`EnrichedReading`] is a
//! reading stamped with the emitting sensor's identity and capture time, and
//! is the payload that goes over the wire.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::GenerationFault;

// ---

pub const TEMPERATURE: &str = "temperature";
pub const HUMIDITY: &str = "humidity";
pub const GAS_LEVEL: &str = "gas_level";

/// Immutable snapshot of one measurement set.
///
/// Serializes flat: one key per channel plus a `unit` map from channel to
/// unit label.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reading {
    // ---
    #[serde(flatten)]
    values: BTreeMap<String, f64>,

    #[serde(rename = "unit")]
    units: BTreeMap<String, String>,
}

impl Reading {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one channel. Consumes and returns the reading so it is complete
    /// before anyone else can observe it.
    pub fn with_channel(mut self, name: &str, value: f64, unit: &str) -> Self {
        // ---
        self.values.insert(name.to_string(), value);
        self.units.insert(name.to_string(), unit.to_string());
        self
    }

    pub fn value(&self, channel: &str) -> Option<f64> {
        self.values.get(channel).copied()
    }

    pub fn unit(&self, channel: &str) -> Option<&str> {
        self.units.get(channel).map(String::as_str)
    }

    pub fn channels(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Reject readings that would serialize as malformed numbers.
    pub fn check_finite(&self) -> Result<(), GenerationFault> {
        // ---
        match self.values.iter().find(|(_, v)| !v.is_finite()) {
            Some((channel, value)) => Err(GenerationFault::NonFinite {
                channel: channel.clone(),
                value: *value,
            }),
            None => Ok(()),
        }
    }
}

/// A reading plus the identity of the sensor that captured it.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedReading {
    // ---
    pub sensor_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub location: String,

    #[serde(flatten)]
    pub reading: Reading,
}

impl EnrichedReading {
    // ---
    /// JSON wire encoding.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
