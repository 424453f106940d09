//! Transport seam between the client core and a broker
//!
//! This trait is the single stable interface for connect/open/put/get - the
//! crate's own option types ([`OpenIntent`], [`WaitMode`], the persistence
//! flag) cross it, never any vendor's descriptor layout. It also enables
//! dependency injection: tests and the loopback CLI run against the
//! [`memory`] implementation, real wire protocols plug in behind the same
//! trait.

use bytes::Bytes;

use crate::error::ClientResult;
use crate::message::{GetOutcome, MessageId, OpenIntent, WaitMode};

pub mod memory;

pub use memory::{InMemoryBroker, MemoryTransport};

/// Opaque per-transport handle for an opened queue
pub type QueueToken = u32;

/// Transport trait for broker sessions
#[async_trait::async_trait]
pub trait BrokerTransport: Send + Sync + 'static {
    /// Establish the session. Must fail fast: authentication and
    /// reachability problems surface here, never deferred to the first
    /// queue operation.
    async fn connect(&self) -> ClientResult<()>;

    /// Tear the session down and wake any blocked get with `Closed`.
    /// Idempotent.
    async fn disconnect(&self) -> ClientResult<()>;

    /// Open a named destination with the declared intent
    async fn open_queue(&self, name: &str, intent: OpenIntent) -> ClientResult<QueueToken>;

    /// Release an opened destination. Idempotent, safe on a dead session.
    async fn close_queue(&self, token: QueueToken) -> ClientResult<()>;

    /// Enqueue a payload at the tail of the destination; the broker assigns
    /// and returns the message identifier
    async fn put(&self, token: QueueToken, payload: Bytes, persistent: bool)
        -> ClientResult<MessageId>;

    /// Retrieve the next message, honoring the wait mode
    async fn get(&self, token: QueueToken, wait: WaitMode) -> ClientResult<GetOutcome>;

    /// Check if the session is currently live
    fn is_connected(&self) -> bool;
}
