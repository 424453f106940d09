//! Connection manager
//!
//! A [`Connection`] is one authenticated session to a queue manager. It is
//! created by an explicit [`Connection::establish`] and destroyed by an
//! explicit [`Connection::disconnect`]; there is no implicit reconnect, which
//! is why the state enum carries no retrying states.

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::config::{ClientConfig, ConfigError, Endpoint};
use crate::error::{ClientError, ClientResult};
use crate::message::OpenIntent;
use crate::transport::BrokerTransport;

use super::queue::QueueHandle;

/// Connection lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in flight
    Connecting,
    /// Live and ready for queue operations
    Connected,
    /// Torn down; every operation except disconnect now fails
    Disconnected,
}

/// Who we are connecting to, resolved from configuration once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub manager: String,
    pub channel: String,
    pub endpoint: Endpoint,
}

impl ConnectionProfile {
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            manager: config.broker.manager.clone(),
            channel: config.broker.channel.clone(),
            endpoint: config.endpoint()?,
        })
    }
}

pub(crate) struct ConnectionInner<T> {
    pub(crate) transport: T,
    state: Mutex<ConnectionState>,
    profile: ConnectionProfile,
}

impl<T> ConnectionInner<T> {
    pub(crate) fn is_live(&self) -> bool {
        *self.state.lock().expect("connection state lock poisoned") == ConnectionState::Connected
    }

    pub(crate) fn ensure_live(&self) -> ClientResult<()> {
        if !self.is_live() {
            return Err(ClientError::not_open("connection is closed"));
        }
        Ok(())
    }
}

/// An authenticated session to a queue manager
///
/// Clone shares the session; the underlying transport is released exactly
/// once, by the first disconnect.
pub struct Connection<T: BrokerTransport> {
    inner: Arc<ConnectionInner<T>>,
}

impl<T: BrokerTransport> Clone for Connection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: BrokerTransport> Connection<T> {
    /// Connect to the queue manager described by `profile` over `transport`.
    ///
    /// Fails fast and synchronously: authentication and reachability errors
    /// surface here, never deferred to the first queue operation.
    pub async fn establish(profile: ConnectionProfile, transport: T) -> ClientResult<Self> {
        info!(
            manager = %profile.manager,
            channel = %profile.channel,
            endpoint = %profile.endpoint,
            "connecting to queue manager"
        );
        let inner = Arc::new(ConnectionInner {
            transport,
            state: Mutex::new(ConnectionState::Connecting),
            profile,
        });

        match inner.transport.connect().await {
            Ok(()) => {
                *inner.state.lock().expect("connection state lock poisoned") =
                    ConnectionState::Connected;
                debug!(manager = %inner.profile.manager, "connection established");
                Ok(Self { inner })
            }
            Err(error) => {
                *inner.state.lock().expect("connection state lock poisoned") =
                    ConnectionState::Disconnected;
                Err(error)
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner
            .state
            .lock()
            .expect("connection state lock poisoned")
            .clone()
    }

    pub fn is_live(&self) -> bool {
        self.inner.is_live()
    }

    pub fn manager(&self) -> &str {
        &self.inner.profile.manager
    }

    /// Open a named destination on this connection with the declared intent
    pub async fn open(&self, name: &str, intent: OpenIntent) -> ClientResult<QueueHandle<T>> {
        self.inner.ensure_live()?;
        let token = self.inner.transport.open_queue(name, intent).await?;
        Ok(QueueHandle::new(
            self.inner.clone(),
            name.to_string(),
            token,
            intent,
        ))
    }

    /// Tear the session down. Idempotent: a second call is a silent no-op,
    /// and it is safe from cleanup paths after a prior operation failed.
    ///
    /// Disconnecting invalidates every handle opened on this connection and
    /// wakes any get blocked mid-wait with `Closed`.
    pub async fn disconnect(&self) -> ClientResult<()> {
        {
            let mut state = self
                .inner
                .state
                .lock()
                .expect("connection state lock poisoned");
            if *state == ConnectionState::Disconnected {
                return Ok(());
            }
            *state = ConnectionState::Disconnected;
        }
        info!(manager = %self.inner.profile.manager, "disconnecting from queue manager");
        self.inner.transport.disconnect().await
    }
}
