//! Outbound transport capability used by the sensor runtime.
//!
//! The runtime only ever needs to connect, publish a payload to a topic,
//! disconnect, and watch the connection state. Concrete transports live in
//! sibling modules:
//! - [`MqttPublisher`] – one `rumqttc` client per sensor
//! - [`MemoryPublisher`] – records messages in memory, with failure injection

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;

use crate::error::{ConnectionError, PublishError};

mod memory;
mod mqtt;

pub use memory::{MemoryPublisher, PublishedMessage};
pub use mqtt::{MqttPublisher, MqttSettings};

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Establish the connection. Resolves once the transport confirms or
    /// rejects it.
    async fn connect(&self) -> Result<(), ConnectionError>;

    /// Send one payload. Success means the transport accepted it.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;

    /// Release the connection. Idempotent.
    async fn disconnect(&self);

    /// Asynchronous connection-state notifications.
    fn connection_state(&self) -> watch::Receiver<ConnectionState>;
}
