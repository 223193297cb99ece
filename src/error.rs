//! Error taxonomy for the sensor runtime.
//!
//! Each error is scoped to a single sensor. None of them is ever raised to
//! the fleet as a hard error: connection errors end in a `Failed` runtime,
//! publish errors and generation faults are reported and the loop continues.

use std::time::Duration;

use thiserror::Error;

/// Initial transport connection did not succeed. Terminal for the runtime.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("broker refused connection: {0}")]
    Refused(String),

    #[error("no connection acknowledgement within {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection already closed")]
    Closed,
}

/// A single publish attempt failed. Recovered locally by the runtime.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publisher is not connected")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A generated reading that must not reach the wire.
#[derive(Debug, Error, PartialEq)]
pub enum GenerationFault {
    #[error("channel '{channel}' produced non-finite value {value}")]
    NonFinite { channel: String, value: f64 },
}
