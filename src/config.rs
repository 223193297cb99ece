//! Configuration loader for the `codemetal-sensorsim` fleet.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase, and every
//! value is validated once, before any sensor starts.
use std::{env, time::Duration};

use anyhow::{anyhow, bail, Result};
use rand::Rng;

use crate::generator::{Baseline, DEFAULT_DAY_PERIOD_TICKS};
use crate::publisher::MqttSettings;
use crate::sensor::SensorConfig;

// ---

/// Parse an optional environment variable into `$ty`, falling back to a default.
macro_rules! parse_env {
    ($lookup:expr, $var_name:expr, $ty:ty, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read an optional string environment variable with a default.
macro_rules! string_env {
    ($lookup:expr, $var_name:expr, $default:expr) => {
        $lookup($var_name).unwrap_or_else(|| $default.to_string())
    };
}

pub const DEFAULT_LOCATIONS: &str = "Living Room,Kitchen,Bedroom,Bathroom,Garage";

/// Per-sensor spread around the fleet baselines.
const TEMPERATURE_JITTER: f64 = 2.0;
const HUMIDITY_JITTER: f64 = 10.0;
const GAS_JITTER: f64 = 50.0;

/// Minimum keep-alive accepted by the MQTT client.
const MIN_KEEP_ALIVE_SECS: u64 = 5;

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    // ---
    /// MQTT broker host.
    pub mqtt_broker: String,

    /// MQTT broker port.
    pub mqtt_port: u16,

    /// MQTT keep-alive in seconds.
    pub mqtt_keep_alive_secs: u64,

    /// Seconds to wait for the broker to acknowledge a connection.
    pub mqtt_connect_timeout_secs: u64,

    /// Seconds between two readings of the same sensor.
    pub update_interval_secs: u64,

    /// Ticks in one simulated day.
    pub day_period_ticks: u64,

    /// Fleet-wide baselines; each sensor gets a jittered copy.
    pub baseline: Baseline,

    /// One sensor is created per location.
    pub locations: Vec<String>,

    /// Port of the read-only status API.
    pub status_port: u16,
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `MQTT_BROKER` – broker host (default: localhost)
/// - `MQTT_PORT` – broker port (default: 1883)
/// - `MQTT_KEEP_ALIVE` – keep-alive seconds (default: 60)
/// - `MQTT_CONNECT_TIMEOUT` – connect timeout seconds (default: 10)
/// - `UPDATE_INTERVAL` – seconds between readings (default: 5)
/// - `DAY_PERIOD_TICKS` – ticks per simulated day (default: 1440)
/// - `BASE_TEMPERATURE` / `BASE_HUMIDITY` / `BASE_GAS_LEVEL` – fleet baselines
///   (defaults: 20, 50, 400)
/// - `SENSOR_LOCATIONS` – comma-separated locations
/// - `STATUS_PORT` – status API port (default: 8080)
///
/// Returns an error if any variable is present but invalid.
pub fn load_from_env() -> Result<Config> {
    load_from(|key| env::var(key).ok())
}

/// Load configuration from an arbitrary key lookup.
pub fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
    // ---
    let mqtt_broker = string_env!(lookup, "MQTT_BROKER", "localhost");
    let mqtt_port = parse_env!(lookup, "MQTT_PORT", u16, 1883);
    let mqtt_keep_alive_secs = parse_env!(lookup, "MQTT_KEEP_ALIVE", u64, 60);
    let mqtt_connect_timeout_secs = parse_env!(lookup, "MQTT_CONNECT_TIMEOUT", u64, 10);
    let update_interval_secs = parse_env!(lookup, "UPDATE_INTERVAL", u64, 5);
    let day_period_ticks = parse_env!(lookup, "DAY_PERIOD_TICKS", u64, DEFAULT_DAY_PERIOD_TICKS);
    let baseline = Baseline {
        temperature: parse_env!(lookup, "BASE_TEMPERATURE", f64, 20.0),
        humidity: parse_env!(lookup, "BASE_HUMIDITY", f64, 50.0),
        gas_level: parse_env!(lookup, "BASE_GAS_LEVEL", f64, 400.0),
    };
    let locations = string_env!(lookup, "SENSOR_LOCATIONS", DEFAULT_LOCATIONS)
        .split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    let status_port = parse_env!(lookup, "STATUS_PORT", u16, 8080);

    let config = Config {
        mqtt_broker,
        mqtt_port,
        mqtt_keep_alive_secs,
        mqtt_connect_timeout_secs,
        update_interval_secs,
        day_period_ticks,
        baseline,
        locations,
        status_port,
    };
    config.validate()?;
    Ok(config)
}

impl Config {
    // ---
    fn validate(&self) -> Result<()> {
        // ---
        if self.mqtt_broker.trim().is_empty() {
            bail!("MQTT_BROKER must not be empty");
        }
        if self.update_interval_secs == 0 {
            bail!("UPDATE_INTERVAL must be at least 1 second");
        }
        if self.day_period_ticks == 0 {
            bail!("DAY_PERIOD_TICKS must be at least 1");
        }
        if self.mqtt_keep_alive_secs < MIN_KEEP_ALIVE_SECS {
            bail!("MQTT_KEEP_ALIVE must be at least {} seconds", MIN_KEEP_ALIVE_SECS);
        }
        if self.mqtt_connect_timeout_secs == 0 {
            bail!("MQTT_CONNECT_TIMEOUT must be at least 1 second");
        }
        let b = &self.baseline;
        if ![b.temperature, b.humidity, b.gas_level].iter().all(|v| v.is_finite()) {
            bail!("Baseline values must be finite numbers");
        }
        if self.locations.is_empty() {
            bail!("SENSOR_LOCATIONS must name at least one location");
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn mqtt_settings(&self) -> MqttSettings {
        MqttSettings {
            host: self.mqtt_broker.clone(),
            port: self.mqtt_port,
            keep_alive: Duration::from_secs(self.mqtt_keep_alive_secs),
            connect_timeout: Duration::from_secs(self.mqtt_connect_timeout_secs),
        }
    }

    /// One sensor config per location, each with its own jittered baseline.
    pub fn sensor_configs(&self) -> Vec<SensorConfig> {
        // ---
        let mut rng = rand::rng();
        self.locations
            .iter()
            .map(|location| {
                let baseline = Baseline {
                    temperature: self.baseline.temperature
                        + rng.random_range(-TEMPERATURE_JITTER..=TEMPERATURE_JITTER),
                    humidity: self.baseline.humidity
                        + rng.random_range(-HUMIDITY_JITTER..=HUMIDITY_JITTER),
                    gas_level: self.baseline.gas_level
                        + rng.random_range(-GAS_JITTER..=GAS_JITTER),
                };
                SensorConfig {
                    update_interval: self.update_interval(),
                    day_period_ticks: self.day_period_ticks,
                    ..SensorConfig::for_location(location, baseline)
                }
            })
            .collect()
    }

    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  MQTT_BROKER          : {}", self.mqtt_broker);
        tracing::info!("  MQTT_PORT            : {}", self.mqtt_port);
        tracing::info!("  MQTT_KEEP_ALIVE      : {}s", self.mqtt_keep_alive_secs);
        tracing::info!("  MQTT_CONNECT_TIMEOUT : {}s", self.mqtt_connect_timeout_secs);
        tracing::info!("  UPDATE_INTERVAL      : {}s", self.update_interval_secs);
        tracing::info!("  DAY_PERIOD_TICKS     : {}", self.day_period_ticks);
        tracing::info!("  BASE_TEMPERATURE     : {}", self.baseline.temperature);
        tracing::info!("  BASE_HUMIDITY        : {}", self.baseline.humidity);
        tracing::info!("  BASE_GAS_LEVEL       : {}", self.baseline.gas_level);
        tracing::info!("  SENSOR_LOCATIONS     : {}", self.locations.join(", "));
        tracing::info!("  STATUS_PORT          : {}", self.status_port);
    }
}
