//! Queue handle: an opened named destination bound to one connection

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::message::{GetOutcome, MessageId, OpenIntent, WaitMode};
use crate::transport::{BrokerTransport, QueueToken};

use super::connection::ConnectionInner;

/// Handle to an open queue
///
/// The declared intent is enforced on every call, not only at open time -
/// brokers differ on when they validate this, so the client pins it down.
/// The handle is only valid while its connection is live; closing the
/// connection invalidates it.
pub struct QueueHandle<T: BrokerTransport> {
    conn: Arc<ConnectionInner<T>>,
    name: String,
    token: QueueToken,
    intent: OpenIntent,
    open: AtomicBool,
}

impl<T: BrokerTransport> QueueHandle<T> {
    pub(crate) fn new(
        conn: Arc<ConnectionInner<T>>,
        name: String,
        token: QueueToken,
        intent: OpenIntent,
    ) -> Self {
        Self {
            conn,
            name,
            token,
            intent,
            open: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn intent(&self) -> OpenIntent {
        self.intent
    }

    /// True while the handle has not been closed and its connection is live
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && self.conn.is_live()
    }

    fn ensure_open(&self) -> ClientResult<()> {
        self.conn.ensure_live()?;
        if !self.open.load(Ordering::SeqCst) {
            return Err(ClientError::not_open(format!(
                "queue {} is closed",
                self.name
            )));
        }
        Ok(())
    }

    /// Enqueue `payload` at the tail of the destination.
    ///
    /// The broker assigns and returns the message identifier. The persistence
    /// flag is advisory to the broker and passed through unmodified.
    pub async fn put(&self, payload: impl Into<Bytes>, persistent: bool) -> ClientResult<MessageId> {
        self.ensure_open()?;
        if !self.intent.allows_put() {
            return Err(ClientError::invalid_operation(format!(
                "put on queue {} opened with {} intent",
                self.name, self.intent
            )));
        }
        let id = self
            .conn
            .transport
            .put(self.token, payload.into(), persistent)
            .await?;
        debug!(queue = %self.name, %id, persistent, "put complete");
        Ok(id)
    }

    /// Retrieve the next message, honoring the wait mode.
    ///
    /// An empty queue is a normal outcome ([`GetOutcome::Empty`]), not an
    /// error. A get blocked in `Forever` mode returns `Closed` when the
    /// handle or connection is closed by another task.
    pub async fn get(&self, wait: WaitMode) -> ClientResult<GetOutcome> {
        self.ensure_open()?;
        if !self.intent.allows_get() {
            return Err(ClientError::invalid_operation(format!(
                "get on queue {} opened with {} intent",
                self.name, self.intent
            )));
        }
        self.conn.transport.get(self.token, wait).await
    }

    /// Release the handle. Idempotent and safe from cleanup paths.
    pub async fn close(&self) -> ClientResult<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(queue = %self.name, "closing queue handle");
        self.conn.transport.close_queue(self.token).await
    }
}
