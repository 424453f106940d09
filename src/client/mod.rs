//! Client layer: connection manager and queue handles
//!
//! Resources are acquired in order (connection, then handle) and released in
//! reverse. [`teardown`] is the cleanup path: each release step is
//! best-effort, logged and never propagated, so a secondary failure during
//! teardown can neither mask a primary failure nor abort cleanup of the
//! remaining resource.

pub mod connection;
pub mod queue;

pub use connection::{Connection, ConnectionProfile, ConnectionState};
pub use queue::QueueHandle;

use tracing::warn;

use crate::transport::BrokerTransport;

/// Release a handle and its connection, in that order, best-effort
pub async fn teardown<T: BrokerTransport>(handle: &QueueHandle<T>, connection: &Connection<T>) {
    if let Err(error) = handle.close().await {
        warn!(queue = handle.name(), %error, "queue close failed during teardown");
    }
    if let Err(error) = connection.disconnect().await {
        warn!(%error, "disconnect failed during teardown");
    }
}
