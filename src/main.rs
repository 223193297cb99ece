//! Application entry point for the `codemetal-sensorsim` simulator.
//!
//! This binary orchestrates the full startup sequence for the sensor fleet,
//! including:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Starting one MQTT-publishing runtime per configured location
//! - Serving the read-only status API
//! - Stopping every sensor on Ctrl-C
//!
//! # Environment Variables
//! - `MQTT_BROKER`, `MQTT_PORT` (optional) – broker address (default: localhost:1883)
//! - `UPDATE_INTERVAL` (optional) – seconds between readings (default: 5)
//! - `SIM_LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `SIM_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See `config.rs` for the full list.
use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Result;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tokio::signal;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use sensorsim::{
    config, routes, FleetStatus, FleetSupervisor, MqttPublisher, Publisher, SensorIdentity,
};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    tracing::info!("Starting sensor simulation...");
    tracing::info!("MQTT Broker: {}:{}", cfg.mqtt_broker, cfg.mqtt_port);
    tracing::info!("Number of sensors: {}", cfg.locations.len());

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.status_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Status API listening on {}", addr);

    let mqtt = cfg.mqtt_settings();
    let supervisor = FleetSupervisor::new(move |identity: &SensorIdentity| {
        Arc::new(MqttPublisher::new(&mqtt, identity)) as Arc<dyn Publisher>
    });
    let fleet = supervisor.start(cfg.sensor_configs());
    let token = fleet.cancellation_token();

    let app = routes::router(FleetStatus::new(fleet.monitors().to_vec()));
    let server_token = token.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_token.cancelled().await })
            .await
    });

    let interrupt_token = token.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Stopping all sensors...");
                interrupt_token.cancel();
            }
            Err(e) => tracing::error!("Unable to listen for Ctrl-C: {}", e),
        }
    });

    let report = fleet.await_all().await;

    // Every sensor may have failed on its own; make sure the server stops too.
    token.cancel();
    server.await??;

    if report.failed > 0 {
        tracing::warn!(
            "{} of {} sensors ended in a failed state",
            report.failed,
            report.total()
        );
    }

    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `SIM_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `SIM_LOG_LEVEL` env var
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked. It installs the subscriber globally
/// for the lifetime of the process.
fn init_tracing() {
    // ---
    let span_events = match env::var("SIM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to SIM_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("SIM_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},rumqttc=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
