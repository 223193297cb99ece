//! Per-sensor lifecycle: connect, publish on a fixed cadence, disconnect.
//!
//! ```text
//!   Idle ──start──► Connecting ──connected──► Running ──cancel──► Stopping ──► Stopped
//!                        │                       │ ▲
//!                        │ connect error         │ └── tick / publish error
//!                        ▼                       ▼
//!                      Failed ◄──── connection failed
//! ```
//!
//! The tick loop waits on three things at once: the cancellation token, the
//! publisher's connection-state watch, and the tick interval. Work done for
//! a tick (generate, encode, publish) runs to completion before the loop
//! waits again, so at most one publish is in flight and cancellation never
//! aborts a publish halfway through.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PublishError;
use crate::events::{EventKind, EventSink, RuntimeEvent};
use crate::publisher::{ConnectionState, Publisher};
use crate::sensor::{Sensor, SensorIdentity};

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeState {
    Idle,
    Connecting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl RuntimeState {
    /// `Stopped` and `Failed` are never left.
    pub fn is_terminal(self) -> bool {
        matches!(self, RuntimeState::Stopped | RuntimeState::Failed)
    }
}

#[derive(Debug, Default)]
struct PublishStats {
    // ---
    published: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

/// Read-only view of one sensor as served by the status API.
#[derive(Debug, Clone, Serialize)]
pub struct SensorSnapshot {
    // ---
    pub sensor_id: Uuid,
    pub name: String,
    pub location: String,
    pub state: RuntimeState,
    pub published: u64,
    pub failed: u64,
    pub rejected: u64,
}

/// Cloneable handle observing one runtime from outside its task.
#[derive(Debug, Clone)]
pub struct SensorMonitor {
    // ---
    identity: SensorIdentity,
    state: watch::Receiver<RuntimeState>,
    stats: Arc<PublishStats>,
}

impl SensorMonitor {
    // ---
    pub fn identity(&self) -> &SensorIdentity {
        &self.identity
    }

    pub fn state(&self) -> RuntimeState {
        *self.state.borrow()
    }

    pub fn published(&self) -> u64 {
        self.stats.published.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.stats.failed.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.stats.rejected.load(Ordering::Relaxed)
    }

    /// Resolve once the runtime reaches `Stopped` or `Failed`.
    pub async fn terminal_state(&self) -> RuntimeState {
        // ---
        let mut rx = self.state.clone();
        let state = match rx.wait_for(|s| s.is_terminal()).await {
            Ok(state) => *state,
            // Runtime dropped without settling; treat as failed.
            Err(_) => RuntimeState::Failed,
        };
        state
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        // ---
        SensorSnapshot {
            sensor_id: self.identity.sensor_id,
            name: self.identity.name.clone(),
            location: self.identity.location.clone(),
            state: self.state(),
            published: self.published(),
            failed: self.failed(),
            rejected: self.rejected(),
        }
    }
}

enum Step {
    Cancel,
    Connection,
    ConnectionClosed,
    Tick,
}

pub struct SensorRuntime {
    // ---
    sensor: Sensor,
    topic: String,
    publisher: Arc<dyn Publisher>,
    sink: Arc<dyn EventSink>,
    state: watch::Sender<RuntimeState>,
    stats: Arc<PublishStats>,
}

impl SensorRuntime {
    // ---
    pub fn new(sensor: Sensor, publisher: Arc<dyn Publisher>, sink: Arc<dyn EventSink>) -> Self {
        // ---
        let (state, _) = watch::channel(RuntimeState::Idle);
        Self {
            topic: sensor.topic(),
            sensor,
            publisher,
            sink,
            state,
            stats: Arc::new(PublishStats::default()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.sensor.id()
    }

    pub fn monitor(&self) -> SensorMonitor {
        SensorMonitor {
            identity: self.sensor.identity().clone(),
            state: self.state.subscribe(),
            stats: self.stats.clone(),
        }
    }

    /// Drive the lifecycle until cancelled or failed. Returns the terminal
    /// state.
    pub async fn run(mut self, cancel: CancellationToken) -> RuntimeState {
        // ---
        if cancel.is_cancelled() {
            self.transition(RuntimeState::Stopped);
            return RuntimeState::Stopped;
        }

        let publisher = self.publisher.clone();
        self.transition(RuntimeState::Connecting);

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = publisher.connect() => Some(result),
        };

        match connected {
            None => return self.stop().await,
            Some(Err(e)) => {
                self.emit(EventKind::ConnectFailed {
                    error: e.to_string(),
                });
                return self.fail().await;
            }
            Some(Ok(())) => self.transition(RuntimeState::Running),
        }

        // The connection may already have failed between connect returning
        // and this subscription, which starts out marked as seen.
        let mut connection = publisher.connection_state();
        let current = *connection.borrow_and_update();
        if current == ConnectionState::Failed {
            self.emit(EventKind::ConnectionChanged(current));
            return self.fail().await;
        }
        let mut watching = true;

        let mut ticker = tokio::time::interval(self.sensor.update_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Cancel,
                changed = connection.changed(), if watching => match changed {
                    Ok(()) => Step::Connection,
                    Err(_) => Step::ConnectionClosed,
                },
                _ = ticker.tick() => Step::Tick,
            };

            match step {
                Step::Cancel => break,
                Step::Connection => {
                    let state = *connection.borrow_and_update();
                    self.emit(EventKind::ConnectionChanged(state));
                    if state == ConnectionState::Failed {
                        return self.fail().await;
                    }
                }
                Step::ConnectionClosed => watching = false,
                Step::Tick => self.tick().await,
            }
        }

        self.stop().await
    }

    /// One reading, one publish attempt. Failures are counted and reported,
    /// never raised.
    async fn tick(&mut self) {
        // ---
        let enriched = self.sensor.next_enriched_reading();

        if let Err(fault) = enriched.reading.check_finite() {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            self.emit(EventKind::ReadingRejected {
                reason: fault.to_string(),
            });
            return;
        }

        let result = match enriched.to_payload() {
            Ok(payload) => self.publisher.publish(&self.topic, payload).await,
            Err(e) => Err(PublishError::from(e)),
        };

        match result {
            Ok(()) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                self.emit(EventKind::Published {
                    topic: self.topic.clone(),
                });
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                self.emit(EventKind::PublishFailed {
                    topic: self.topic.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    async fn stop(self) -> RuntimeState {
        // ---
        self.transition(RuntimeState::Stopping);
        self.publisher.disconnect().await;
        self.transition(RuntimeState::Stopped);
        RuntimeState::Stopped
    }

    async fn fail(self) -> RuntimeState {
        // ---
        self.publisher.disconnect().await;
        self.transition(RuntimeState::Failed);
        RuntimeState::Failed
    }

    fn transition(&self, to: RuntimeState) {
        // ---
        let from = self.state.send_replace(to);
        if from != to {
            self.emit(EventKind::StateChanged { from, to });
        }
    }

    fn emit(&self, kind: EventKind) {
        self.sink.emit(&RuntimeEvent::now(self.sensor.id(), kind));
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::generator::{Baseline, EnvironmentalSource, ReadingSource, SimulationState};
    use crate::models::{Reading, TEMPERATURE};
    use crate::publisher::MemoryPublisher;
    use crate::sensor::SensorIdentity;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::time::{sleep, Instant};

    const INTERVAL: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<RuntimeEvent>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: &RuntimeEvent) {
            self.events.lock().push(event.clone());
        }
    }

    impl RecordingSink {
        fn transitions(&self) -> Vec<RuntimeState> {
            // ---
            self.events
                .lock()
                .iter()
                .filter_map(|e| match e.kind {
                    EventKind::StateChanged { to, .. } => Some(to),
                    _ => None,
                })
                .collect()
        }

        fn count(&self, pred: impl Fn(&EventKind) -> bool) -> usize {
            self.events.lock().iter().filter(|e| pred(&e.kind)).count()
        }
    }

    struct NanSource;

    impl ReadingSource for NanSource {
        fn generate(&mut self, state: &mut SimulationState) -> Reading {
            state.advance();
            Reading::new().with_channel(TEMPERATURE, f64::NAN, "celsius")
        }
    }

    fn create_test_sensor(source: Box<dyn ReadingSource>) -> Sensor {
        // ---
        Sensor::new(
            SensorIdentity::new("Bedroom Environmental Sensor", "Bedroom"),
            SimulationState::new(Baseline::default()),
            source,
            INTERVAL,
        )
    }

    fn create_test_runtime(
        publisher: Arc<MemoryPublisher>,
    ) -> (SensorRuntime, Arc<RecordingSink>) {
        // ---
        let sink = Arc::new(RecordingSink::default());
        let runtime = SensorRuntime::new(
            create_test_sensor(Box::new(EnvironmentalSource::new())),
            publisher,
            sink.clone(),
        );
        (runtime, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_transitions() {
        // ---
        let publisher = Arc::new(MemoryPublisher::new());
        let (runtime, sink) = create_test_runtime(publisher.clone());
        let monitor = runtime.monitor();
        assert_eq!(monitor.state(), RuntimeState::Idle);

        let token = CancellationToken::new();
        let handle = tokio::spawn(runtime.run(token.clone()));

        sleep(Duration::from_secs(1)).await;
        assert_eq!(monitor.state(), RuntimeState::Running);

        token.cancel();
        assert_eq!(handle.await.unwrap(), RuntimeState::Stopped);
        assert_eq!(monitor.state(), RuntimeState::Stopped);
        assert_eq!(
            sink.transitions(),
            vec![
                RuntimeState::Connecting,
                RuntimeState::Running,
                RuntimeState::Stopping,
                RuntimeState::Stopped,
            ]
        );
        assert_eq!(publisher.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_on_topic_every_interval() {
        // ---
        let publisher = Arc::new(MemoryPublisher::new());
        let (runtime, _sink) = create_test_runtime(publisher.clone());
        let topic = format!("sensors/{}/data", runtime.id());
        let token = CancellationToken::new();
        let handle = tokio::spawn(runtime.run(token.clone()));

        // Ticks at 0, 5, 10 and 15 seconds
        sleep(Duration::from_secs(16)).await;
        token.cancel();
        handle.await.unwrap();

        let messages = publisher.messages();
        assert_eq!(messages.len(), 4);
        for pair in messages.windows(2) {
            assert_eq!(pair[1].at - pair[0].at, INTERVAL);
        }
        for m in &messages {
            assert_eq!(m.topic, topic);
            let json: serde_json::Value = serde_json::from_slice(&m.payload).unwrap();
            assert!(json["temperature"].is_number());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_is_terminal() {
        // ---
        let publisher = Arc::new(MemoryPublisher::refusing());
        let (runtime, sink) = create_test_runtime(publisher.clone());
        let monitor = runtime.monitor();

        let state = runtime.run(CancellationToken::new()).await;

        assert_eq!(state, RuntimeState::Failed);
        assert_eq!(monitor.terminal_state().await, RuntimeState::Failed);
        assert_eq!(
            sink.transitions(),
            vec![RuntimeState::Connecting, RuntimeState::Failed]
        );
        assert_eq!(
            sink.count(|k| matches!(k, EventKind::ConnectFailed { .. })),
            1
        );
        assert!(publisher.attempts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_publish_failure_keeps_running() {
        // ---
        let publisher = Arc::new(MemoryPublisher::new());
        let (runtime, sink) = create_test_runtime(publisher.clone());
        let monitor = runtime.monitor();
        let token = CancellationToken::new();
        let handle = tokio::spawn(runtime.run(token.clone()));

        sleep(Duration::from_secs(1)).await;
        publisher.fail_next_publishes(1);

        // Tick at 5s fails
        sleep(Duration::from_secs(5)).await;
        assert_eq!(monitor.state(), RuntimeState::Running);
        assert_eq!(monitor.failed(), 1);

        // Tick at 10s goes out on schedule
        sleep(Duration::from_secs(5)).await;
        assert_eq!(monitor.state(), RuntimeState::Running);
        assert_eq!(monitor.published(), 2);

        let attempts = publisher.attempts();
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[1] - attempts[0], INTERVAL);
        assert_eq!(attempts[2] - attempts[1], INTERVAL);
        assert_eq!(
            sink.count(|k| matches!(k, EventKind::PublishFailed { .. })),
            1
        );

        token.cancel();
        assert_eq!(handle.await.unwrap(), RuntimeState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_publish_never_overlaps() {
        // ---
        let publisher =
            Arc::new(MemoryPublisher::new().with_publish_delay(Duration::from_secs(7)));
        let (runtime, _sink) = create_test_runtime(publisher.clone());
        let token = CancellationToken::new();
        let handle = tokio::spawn(runtime.run(token.clone()));

        sleep(Duration::from_secs(20)).await;
        token.cancel();
        handle.await.unwrap();

        // Overrunning ticks fire as soon as the previous publish is done
        let attempts = publisher.attempts();
        assert_eq!(attempts.len(), 3);
        for pair in attempts.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_secs(7));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_waits_for_in_flight_publish() {
        // ---
        let publisher =
            Arc::new(MemoryPublisher::new().with_publish_delay(Duration::from_secs(2)));
        let (runtime, _sink) = create_test_runtime(publisher.clone());
        let token = CancellationToken::new();
        let start = Instant::now();
        let handle = tokio::spawn(runtime.run(token.clone()));

        sleep(Duration::from_secs(1)).await;
        token.cancel();

        assert_eq!(handle.await.unwrap(), RuntimeState::Stopped);
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(publisher.messages().len(), 1);
        assert_eq!(publisher.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_failure_while_running() {
        // ---
        let publisher = Arc::new(MemoryPublisher::new());
        let (runtime, sink) = create_test_runtime(publisher.clone());
        let handle = tokio::spawn(runtime.run(CancellationToken::new()));

        sleep(Duration::from_secs(1)).await;
        publisher.fail_connection();

        assert_eq!(handle.await.unwrap(), RuntimeState::Failed);
        assert_eq!(
            sink.transitions(),
            vec![
                RuntimeState::Connecting,
                RuntimeState::Running,
                RuntimeState::Failed,
            ]
        );
    }

    /// Connects successfully, then loses the connection before returning.
    struct DropsAfterConnect(MemoryPublisher);

    #[async_trait::async_trait]
    impl Publisher for DropsAfterConnect {
        async fn connect(&self) -> Result<(), crate::error::ConnectionError> {
            self.0.connect().await?;
            self.0.fail_connection();
            Ok(())
        }

        async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
            self.0.publish(topic, payload).await
        }

        async fn disconnect(&self) {
            self.0.disconnect().await
        }

        fn connection_state(&self) -> watch::Receiver<ConnectionState> {
            self.0.connection_state()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_lost_right_after_connect() {
        // ---
        let publisher = Arc::new(DropsAfterConnect(MemoryPublisher::new()));
        let sink = Arc::new(RecordingSink::default());
        let runtime = SensorRuntime::new(
            create_test_sensor(Box::new(EnvironmentalSource::new())),
            publisher.clone(),
            sink.clone(),
        );

        assert_eq!(
            runtime.run(CancellationToken::new()).await,
            RuntimeState::Failed
        );
        assert!(publisher.0.attempts().is_empty());
        assert_eq!(
            sink.count(|k| matches!(k, EventKind::ConnectionChanged(ConnectionState::Failed))),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_state_waits_for_shutdown() {
        // ---
        let publisher = Arc::new(MemoryPublisher::new());
        let (runtime, _sink) = create_test_runtime(publisher);
        let monitor = runtime.monitor();
        let token = CancellationToken::new();
        let handle = tokio::spawn(runtime.run(token.clone()));

        let waiter = tokio::spawn(async move { monitor.terminal_state().await });
        sleep(Duration::from_secs(3)).await;
        assert!(!waiter.is_finished());

        token.cancel();
        assert_eq!(waiter.await.unwrap(), RuntimeState::Stopped);
        assert_eq!(handle.await.unwrap(), RuntimeState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_finite_reading_is_not_published() {
        // ---
        let publisher = Arc::new(MemoryPublisher::new());
        let sink = Arc::new(RecordingSink::default());
        let runtime = SensorRuntime::new(
            create_test_sensor(Box::new(NanSource)),
            publisher.clone(),
            sink.clone(),
        );
        let monitor = runtime.monitor();
        let token = CancellationToken::new();
        let handle = tokio::spawn(runtime.run(token.clone()));

        sleep(Duration::from_secs(6)).await;
        assert_eq!(monitor.state(), RuntimeState::Running);
        assert_eq!(monitor.rejected(), 2);
        assert!(publisher.attempts().is_empty());
        assert_eq!(
            sink.count(|k| matches!(k, EventKind::ReadingRejected { .. })),
            2
        );

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        // ---
        let publisher = Arc::new(MemoryPublisher::new());
        let (runtime, sink) = create_test_runtime(publisher.clone());
        let token = CancellationToken::new();
        token.cancel();

        assert_eq!(runtime.run(token).await, RuntimeState::Stopped);
        assert_eq!(sink.transitions(), vec![RuntimeState::Stopped]);
        assert_eq!(publisher.disconnects(), 0);
    }

    #[test]
    fn test_terminal_states() {
        // ---
        assert!(RuntimeState::Stopped.is_terminal());
        assert!(RuntimeState::Failed.is_terminal());
        assert!(!RuntimeState::Running.is_terminal());
        assert!(!RuntimeState::Stopping.is_terminal());
    }
}
