//! In-process publisher that keeps every accepted message.
//!
//! Used by the test suites and handy for running the fleet without a
//! broker. Failures can be injected for connect, for the next N publishes,
//! and for the connection as a whole.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use super::{ConnectionState, Publisher};
use crate::error::{ConnectionError, PublishError};

// ---

#[derive(Debug, Clone)]
pub struct PublishedMessage {
    // ---
    pub topic: String,
    pub payload: Vec<u8>,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    // ---
    refuse_connect: bool,
    fail_next: usize,
    attempts: Vec<Instant>,
    messages: Vec<PublishedMessage>,
    disconnects: usize,
}

#[derive(Debug)]
pub struct MemoryPublisher {
    // ---
    state: watch::Sender<ConnectionState>,
    inner: Mutex<Inner>,
    publish_delay: Duration,
}

impl Default for MemoryPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPublisher {
    // ---
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state,
            inner: Mutex::new(Inner::default()),
            publish_delay: Duration::ZERO,
        }
    }

    /// Publisher whose `connect` always fails.
    pub fn refusing() -> Self {
        let publisher = Self::new();
        publisher.inner.lock().refuse_connect = true;
        publisher
    }

    /// Every publish takes `delay` before it completes.
    pub fn with_publish_delay(mut self, delay: Duration) -> Self {
        self.publish_delay = delay;
        self
    }

    /// Make the next `n` publish attempts fail.
    pub fn fail_next_publishes(&self, n: usize) {
        self.inner.lock().fail_next = n;
    }

    /// Simulate the transport giving up on the connection.
    pub fn fail_connection(&self) {
        self.state.send_replace(ConnectionState::Failed);
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.inner.lock().messages.clone()
    }

    /// Instants of every publish attempt, successful or not.
    pub fn attempts(&self) -> Vec<Instant> {
        self.inner.lock().attempts.clone()
    }

    pub fn disconnects(&self) -> usize {
        self.inner.lock().disconnects
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    // ---
    async fn connect(&self) -> Result<(), ConnectionError> {
        // ---
        self.state.send_replace(ConnectionState::Connecting);
        if self.inner.lock().refuse_connect {
            self.state.send_replace(ConnectionState::Failed);
            return Err(ConnectionError::Refused("connection refused".to_string()));
        }
        self.state.send_replace(ConnectionState::Connected);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        // ---
        let at = Instant::now();
        self.inner.lock().attempts.push(at);

        if !self.publish_delay.is_zero() {
            tokio::time::sleep(self.publish_delay).await;
        }

        if *self.state.borrow() != ConnectionState::Connected {
            return Err(PublishError::NotConnected);
        }

        let mut inner = self.inner.lock();
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(PublishError::Transport("injected failure".to_string()));
        }
        inner.messages.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            at,
        });
        Ok(())
    }

    async fn disconnect(&self) {
        // ---
        self.inner.lock().disconnects += 1;
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Failed {
                return false;
            }
            *state = ConnectionState::Disconnected;
            true
        });
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}
