//! Consumer delivery loop
//!
//! The loop is a small state machine: Idle until started, Waiting during each
//! get attempt, Draining while a retrieved message is handed off, Stopped
//! once a terminal condition is reached. Cancellation is cooperative - the
//! shutdown flag is observed between get attempts, never preempting a call
//! already blocked mid-wait; a blocked call still returns (by timeout,
//! message arrival, or `Closed` when the connection is torn down) before the
//! loop honors it.

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::client::{Connection, QueueHandle};
use crate::error::ClientResult;
use crate::message::{GetOutcome, MessageEnvelope, WaitMode};
use crate::transport::BrokerTransport;

/// Delivery loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Waiting,
    Draining,
    Stopped,
}

/// What the loop does when a get comes back empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainPolicy {
    /// One-shot drain: the first empty outcome stops the loop
    StopOnEmpty,
    /// Keep polling until cancelled or the connection goes away
    PollForever,
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// Queue came back empty under the one-shot policy
    Drained,
    /// Configured message cap reached
    MessageCap,
    /// Cancellation flag observed, or the delivery receiver went away
    Cancelled,
    /// Blocked get interrupted by handle/connection closure
    ConnectionClosed,
}

/// Outcome of a completed consumer run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainSummary {
    pub received: u64,
    pub cause: StopCause,
}

/// The consumer loop itself
pub struct ConsumerLoop {
    policy: DrainPolicy,
    wait: WaitMode,
    max_messages: u64,
    state: LoopState,
}

impl ConsumerLoop {
    pub fn new(policy: DrainPolicy, wait: WaitMode) -> Self {
        Self {
            policy,
            wait,
            max_messages: 0,
            state: LoopState::Idle,
        }
    }

    /// Cap the number of messages consumed (0 = unbounded)
    pub fn with_message_cap(mut self, max_messages: u64) -> Self {
        self.max_messages = max_messages;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run get attempts against `handle`, forwarding each retrieved envelope
    /// over `delivered`, until a terminal condition is reached.
    ///
    /// Fatal errors other than `Closed` propagate to the caller; `Closed` is
    /// loop termination, not a crash.
    pub async fn run<T: BrokerTransport>(
        &mut self,
        handle: &QueueHandle<T>,
        delivered: mpsc::Sender<MessageEnvelope>,
        shutdown: watch::Receiver<bool>,
    ) -> ClientResult<DrainSummary> {
        let mut received = 0u64;
        info!(queue = handle.name(), policy = ?self.policy, "consumer loop starting");

        let cause = loop {
            if *shutdown.borrow() {
                break StopCause::Cancelled;
            }
            if self.max_messages > 0 && received >= self.max_messages {
                break StopCause::MessageCap;
            }

            self.state = LoopState::Waiting;
            match handle.get(self.wait).await {
                Ok(GetOutcome::Message(envelope)) => {
                    self.state = LoopState::Draining;
                    received += 1;
                    debug!(queue = handle.name(), id = %envelope.id, received, "message retrieved");
                    if delivered.send(envelope).await.is_err() {
                        // receiver dropped: nobody is listening anymore
                        break StopCause::Cancelled;
                    }
                }
                Ok(GetOutcome::Empty) => match self.policy {
                    DrainPolicy::StopOnEmpty => break StopCause::Drained,
                    DrainPolicy::PollForever => continue,
                },
                Err(error) if error.is_close_interrupt() => {
                    break StopCause::ConnectionClosed;
                }
                Err(error) => {
                    self.state = LoopState::Stopped;
                    return Err(error);
                }
            }
        };

        self.state = LoopState::Stopped;
        info!(queue = handle.name(), received, ?cause, "consumer loop stopped");
        Ok(DrainSummary { received, cause })
    }

    /// Run the loop, then release the handle and connection in that order.
    ///
    /// Cleanup is best-effort and runs on every exit path, including when the
    /// loop itself failed - a teardown failure never masks the primary error.
    pub async fn run_then_release<T: BrokerTransport>(
        &mut self,
        handle: &QueueHandle<T>,
        connection: &Connection<T>,
        delivered: mpsc::Sender<MessageEnvelope>,
        shutdown: watch::Receiver<bool>,
    ) -> ClientResult<DrainSummary> {
        let result = self.run(handle, delivered, shutdown).await;
        if result.is_err() {
            warn!(queue = handle.name(), "consumer loop failed, cleaning up anyway");
        }
        crate::client::teardown(handle, connection).await;
        result
    }
}

impl Default for ConsumerLoop {
    fn default() -> Self {
        Self::new(DrainPolicy::StopOnEmpty, WaitMode::NoWait)
    }
}

/// Wire a SIGINT handler to a shutdown flag the loop can observe.
///
/// Returns the receiver half; the sender lives in the spawned task.
pub fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping after current get attempt");
            let _ = tx.send(true);
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ConnectionProfile;
    use crate::config::{ClientConfig, Credentials};
    use crate::message::OpenIntent;
    use crate::transport::{InMemoryBroker, MemoryTransport};
    use std::time::Duration;

    const QUEUE: &str = "DEV.QUEUE.1";

    async fn connected() -> Connection<MemoryTransport> {
        let profile = ConnectionProfile::from_config(&ClientConfig::default()).unwrap();
        let broker = InMemoryBroker::new().with_queue(QUEUE);
        let transport =
            MemoryTransport::new(broker, profile.endpoint.clone(), Credentials::default());
        Connection::establish(profile, transport).await.unwrap()
    }

    fn no_shutdown() -> watch::Receiver<bool> {
        // a dropped sender leaves the flag permanently false, which is fine:
        // the loop only reads the current value
        let (_tx, rx) = watch::channel(false);
        rx
    }

    #[tokio::test]
    async fn test_one_shot_drain_stops_on_empty() {
        let connection = connected().await;
        let handle = connection.open(QUEUE, OpenIntent::ReadWrite).await.unwrap();
        for i in 0..3 {
            handle.put(format!("msg {i}"), false).await.unwrap();
        }

        let (tx, mut rx) = mpsc::channel(16);
        let mut consumer = ConsumerLoop::new(DrainPolicy::StopOnEmpty, WaitMode::NoWait);
        assert_eq!(consumer.state(), LoopState::Idle);

        let summary = consumer.run(&handle, tx, no_shutdown()).await.unwrap();
        assert_eq!(summary.received, 3);
        assert_eq!(summary.cause, StopCause::Drained);
        assert_eq!(consumer.state(), LoopState::Stopped);

        for i in 0..3 {
            let envelope = rx.recv().await.unwrap();
            assert_eq!(envelope.text(), format!("msg {i}"));
        }
    }

    #[tokio::test]
    async fn test_message_cap_stops_the_loop() {
        let connection = connected().await;
        let handle = connection.open(QUEUE, OpenIntent::ReadWrite).await.unwrap();
        for i in 0..5 {
            handle.put(format!("msg {i}"), false).await.unwrap();
        }

        let (tx, _rx) = mpsc::channel(16);
        let mut consumer =
            ConsumerLoop::new(DrainPolicy::StopOnEmpty, WaitMode::NoWait).with_message_cap(2);
        let summary = consumer.run(&handle, tx, no_shutdown()).await.unwrap();
        assert_eq!(summary.received, 2);
        assert_eq!(summary.cause, StopCause::MessageCap);
    }

    #[tokio::test]
    async fn test_preset_cancellation_stops_before_any_get() {
        let connection = connected().await;
        let handle = connection.open(QUEUE, OpenIntent::ReadWrite).await.unwrap();
        handle.put("never delivered".to_string(), false).await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(true);
        let (tx, _rx) = mpsc::channel(16);
        let mut consumer = ConsumerLoop::new(DrainPolicy::PollForever, WaitMode::Forever);
        let summary = consumer.run(&handle, tx, shutdown_rx).await.unwrap();
        drop(shutdown_tx);

        assert_eq!(summary.received, 0);
        assert_eq!(summary.cause, StopCause::Cancelled);
    }

    #[tokio::test]
    async fn test_connection_close_terminates_blocked_loop() {
        let connection = connected().await;
        let handle = std::sync::Arc::new(
            connection.open(QUEUE, OpenIntent::Read).await.unwrap(),
        );

        let loop_handle = handle.clone();
        let task = tokio::spawn(async move {
            let (tx, _rx) = mpsc::channel(16);
            let mut consumer = ConsumerLoop::new(DrainPolicy::PollForever, WaitMode::Forever);
            consumer.run(&loop_handle, tx, no_shutdown()).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        connection.disconnect().await.unwrap();

        let summary = task.await.unwrap().unwrap();
        assert_eq!(summary.cause, StopCause::ConnectionClosed);
    }

    #[tokio::test]
    async fn test_run_then_release_tears_down_on_success() {
        let connection = connected().await;
        let handle = connection.open(QUEUE, OpenIntent::ReadWrite).await.unwrap();
        handle.put("one".to_string(), false).await.unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let mut consumer = ConsumerLoop::new(DrainPolicy::StopOnEmpty, WaitMode::NoWait);
        let summary = consumer
            .run_then_release(&handle, &connection, tx, no_shutdown())
            .await
            .unwrap();

        assert_eq!(summary.received, 1);
        assert!(!handle.is_open());
        assert!(!connection.is_live());
        assert_eq!(rx.recv().await.unwrap().text(), "one");
    }

    #[tokio::test]
    async fn test_poll_forever_keeps_waiting_through_empty() {
        let connection = connected().await;
        let handle = std::sync::Arc::new(
            connection.open(QUEUE, OpenIntent::ReadWrite).await.unwrap(),
        );

        let loop_handle = handle.clone();
        let task = tokio::spawn(async move {
            let (tx, mut rx) = mpsc::channel(16);
            let mut consumer =
                ConsumerLoop::new(DrainPolicy::PollForever, WaitMode::Timeout(Duration::from_millis(50)))
                    .with_message_cap(1);
            let summary = consumer.run(&loop_handle, tx, no_shutdown()).await.unwrap();
            (summary, rx.recv().await)
        });

        // several empty windows elapse before the message shows up
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.put("eventually".to_string(), false).await.unwrap();

        let (summary, envelope) = task.await.unwrap();
        assert_eq!(summary.received, 1);
        assert_eq!(summary.cause, StopCause::MessageCap);
        assert_eq!(envelope.unwrap().text(), "eventually");
    }
}
