//! MQTT transport built on `rumqttc`.
//!
//! Each sensor gets its own client and event loop, so disconnecting one
//! sensor never affects another. The event loop is driven by a background
//! task started on `connect`; it turns broker packets into
//! [`ConnectionState`] notifications.
//!
//! A transport error before the first CONNACK fails the connection for
//! good. After that, errors only mark the connection `Disconnected` and the
//! event loop keeps polling, which makes `rumqttc` reconnect.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ConnectionState, Publisher};
use crate::error::{ConnectionError, PublishError};
use crate::sensor::SensorIdentity;

// ---

const REQUEST_CAPACITY: usize = 10;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Broker connection settings shared by every sensor's client.
#[derive(Debug, Clone, PartialEq)]
pub struct MqttSettings {
    // ---
    pub host: String,
    pub port: u16,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

impl MqttSettings {
    fn options_for(&self, sensor_id: Uuid) -> MqttOptions {
        // ---
        let mut options = MqttOptions::new(format!("sensor-{}", sensor_id), &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options
    }
}

/// State shared between the publisher and its event-loop task.
#[derive(Debug)]
struct Shared {
    // ---
    state: watch::Sender<ConnectionState>,
    last_error: Mutex<Option<ConnectionError>>,
}

impl Shared {
    fn set(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

pub struct MqttPublisher {
    // ---
    sensor_id: Uuid,
    client: AsyncClient,
    eventloop: Mutex<Option<EventLoop>>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
    connect_timeout: Duration,
}

impl MqttPublisher {
    // ---
    pub fn new(settings: &MqttSettings, identity: &SensorIdentity) -> Self {
        // ---
        let (client, eventloop) =
            AsyncClient::new(settings.options_for(identity.sensor_id), REQUEST_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            sensor_id: identity.sensor_id,
            client,
            eventloop: Mutex::new(Some(eventloop)),
            shared: Arc::new(Shared {
                state,
                last_error: Mutex::new(None),
            }),
            shutdown: CancellationToken::new(),
            driver: Mutex::new(None),
            connect_timeout: settings.connect_timeout,
        }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    // ---
    async fn connect(&self) -> Result<(), ConnectionError> {
        // ---
        let eventloop = self.eventloop.lock().take().ok_or(ConnectionError::Closed)?;
        let mut rx = self.shared.state.subscribe();
        self.shared.set(ConnectionState::Connecting);

        let handle = tokio::spawn(drive(
            eventloop,
            self.shared.clone(),
            self.shutdown.clone(),
            self.sensor_id,
        ));
        *self.driver.lock() = Some(handle);

        let settled = tokio::time::timeout(
            self.connect_timeout,
            rx.wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Failed)),
        )
        .await;

        let connected = match settled {
            Ok(Ok(state)) => *state == ConnectionState::Connected,
            Ok(Err(_)) => return Err(ConnectionError::Closed),
            Err(_) => {
                self.shutdown.cancel();
                self.shared.set(ConnectionState::Failed);
                return Err(ConnectionError::Timeout(self.connect_timeout));
            }
        };

        if connected {
            Ok(())
        } else {
            Err(self
                .shared
                .last_error
                .lock()
                .take()
                .unwrap_or(ConnectionError::Closed))
        }
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        // ---
        if *self.shared.state.borrow() != ConnectionState::Connected {
            return Err(PublishError::NotConnected);
        }

        // Never wait on a full request queue; a tick must not stall here.
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| PublishError::Transport(e.to_string()))
    }

    async fn disconnect(&self) {
        // ---
        let driver = self.driver.lock().take();
        if let Some(mut handle) = driver {
            // A full request queue must not hold up shutdown past the grace period.
            if let Err(e) = self.client.try_disconnect() {
                debug!("Sensor {} disconnect request not sent: {}", self.sensor_id, e);
            }
            if tokio::time::timeout(DISCONNECT_GRACE, &mut handle).await.is_err() {
                self.shutdown.cancel();
                let _ = handle.await;
            }
        }
        self.shutdown.cancel();

        self.shared.state.send_if_modified(|state| {
            if *state == ConnectionState::Failed {
                return false;
            }
            *state = ConnectionState::Disconnected;
            true
        });
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }
}

/// Poll the event loop until shutdown, an explicit disconnect, or a failure
/// before the first acknowledgement.
async fn drive(
    mut eventloop: EventLoop,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    sensor_id: Uuid,
) {
    // ---
    let mut acknowledged = false;

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("Sensor {} connected to MQTT broker", sensor_id);
                    acknowledged = true;
                    shared.set(ConnectionState::Connected);
                } else {
                    *shared.last_error.lock() =
                        Some(ConnectionError::Refused(format!("{:?}", ack.code)));
                    shared.set(ConnectionState::Failed);
                    break;
                }
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                debug!("Sensor {} message {} acknowledged", sensor_id, ack.pkid);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("Sensor {} sent disconnect", sensor_id);
                break;
            }
            Ok(_) => {}
            Err(e) if !acknowledged => {
                let error = match e {
                    rumqttc::ConnectionError::ConnectionRefused(code) => {
                        ConnectionError::Refused(format!("{:?}", code))
                    }
                    other => ConnectionError::Transport(other.to_string()),
                };
                *shared.last_error.lock() = Some(error);
                shared.set(ConnectionState::Failed);
                break;
            }
            Err(e) => {
                warn!("Sensor {} lost MQTT connection: {}", sensor_id, e);
                shared.set(ConnectionState::Disconnected);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
                shared.set(ConnectionState::Connecting);
            }
        }
    }
}
