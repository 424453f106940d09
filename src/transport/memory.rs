//! In-memory broker and the transport session bound to it
//!
//! [`InMemoryBroker`] owns named FIFO queues; [`MemoryTransport`] is one
//! client session against it, implementing [`BrokerTransport`]. Together they
//! give the full contract - FIFO ordering, wait modes, auth and reachability
//! failures, close propagation into blocked gets - without any wire protocol.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::{watch, Notify};
use tracing::{debug, trace};

use super::{BrokerTransport, QueueToken};
use crate::config::{Credentials, Endpoint};
use crate::error::{ClientError, ClientResult};
use crate::message::{GetOutcome, MessageEnvelope, MessageId, OpenIntent, WaitMode};

/// A broker that lives in this process
///
/// Queues must be declared up front; opening an undeclared queue fails with
/// `NotFound`, mirroring how a real queue manager refuses unknown object
/// names. Clone is cheap and shares the same queues.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<BrokerCore>,
}

#[derive(Default)]
struct BrokerCore {
    queues: Mutex<HashMap<String, Arc<QueueState>>>,
    restricted: Mutex<HashSet<String>>,
    required_credentials: Mutex<Option<(String, String)>>,
    bound_endpoint: Mutex<Option<Endpoint>>,
}

#[derive(Default)]
struct QueueState {
    messages: Mutex<VecDeque<MessageEnvelope>>,
    notify: Notify,
}

impl QueueState {
    fn pop_front(&self) -> Option<MessageEnvelope> {
        self.messages
            .lock()
            .expect("queue message lock poisoned")
            .pop_front()
    }

    fn push_back(&self, envelope: MessageEnvelope) {
        self.messages
            .lock()
            .expect("queue message lock poisoned")
            .push_back(envelope);
    }

    fn depth(&self) -> usize {
        self.messages
            .lock()
            .expect("queue message lock poisoned")
            .len()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a queue (builder form)
    pub fn with_queue(self, name: &str) -> Self {
        self.declare_queue(name);
        self
    }

    /// Declare a queue that exists but refuses open attempts (builder form)
    pub fn with_restricted_queue(self, name: &str) -> Self {
        self.declare_queue(name);
        self.inner
            .restricted
            .lock()
            .expect("restricted-set lock poisoned")
            .insert(name.to_string());
        self
    }

    /// Require exact credentials at connect time (builder form)
    pub fn with_credentials(self, username: &str, password: &str) -> Self {
        *self
            .inner
            .required_credentials
            .lock()
            .expect("credential lock poisoned") = Some((username.to_string(), password.to_string()));
        self
    }

    /// Bind the broker to one endpoint; sessions dialing anything else get
    /// `Network` (builder form)
    pub fn with_endpoint(self, endpoint: Endpoint) -> Self {
        *self
            .inner
            .bound_endpoint
            .lock()
            .expect("endpoint lock poisoned") = Some(endpoint);
        self
    }

    pub fn declare_queue(&self, name: &str) {
        self.inner
            .queues
            .lock()
            .expect("queue-table lock poisoned")
            .entry(name.to_string())
            .or_default();
    }

    /// Current number of messages held for a queue, if it exists
    pub fn depth(&self, name: &str) -> Option<usize> {
        self.inner
            .queues
            .lock()
            .expect("queue-table lock poisoned")
            .get(name)
            .map(|queue| queue.depth())
    }

    fn check_reachable(&self, endpoint: &Endpoint) -> ClientResult<()> {
        let bound = self
            .inner
            .bound_endpoint
            .lock()
            .expect("endpoint lock poisoned");
        if let Some(bound) = bound.as_ref() {
            if bound != endpoint {
                return Err(ClientError::network(
                    endpoint.to_string(),
                    "no broker listening",
                ));
            }
        }
        Ok(())
    }

    fn authenticate(&self, credentials: &Credentials) -> ClientResult<()> {
        let required = self
            .inner
            .required_credentials
            .lock()
            .expect("credential lock poisoned");
        if let Some((username, password)) = required.as_ref() {
            let user_ok = credentials.username.as_deref() == Some(username.as_str());
            let pass_ok = credentials.password.as_deref() == Some(password.as_str());
            if !user_ok || !pass_ok {
                return Err(ClientError::auth("credentials rejected"));
            }
        }
        Ok(())
    }

    fn find_queue(&self, name: &str) -> ClientResult<Arc<QueueState>> {
        let queue = self
            .inner
            .queues
            .lock()
            .expect("queue-table lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::not_found(name))?;
        let restricted = self
            .inner
            .restricted
            .lock()
            .expect("restricted-set lock poisoned")
            .contains(name);
        if restricted {
            return Err(ClientError::permission(name));
        }
        Ok(queue)
    }
}

/// One client session against an [`InMemoryBroker`]
pub struct MemoryTransport {
    broker: InMemoryBroker,
    endpoint: Endpoint,
    credentials: Credentials,
    connected: AtomicBool,
    session_closed_tx: watch::Sender<bool>,
    opens: Mutex<HashMap<QueueToken, OpenState>>,
    next_token: AtomicU32,
}

struct OpenState {
    name: String,
    queue: Arc<QueueState>,
    closed_tx: watch::Sender<bool>,
}

impl MemoryTransport {
    pub fn new(broker: InMemoryBroker, endpoint: Endpoint, credentials: Credentials) -> Self {
        let (session_closed_tx, _) = watch::channel(false);
        Self {
            broker,
            endpoint,
            credentials,
            connected: AtomicBool::new(false),
            session_closed_tx,
            opens: Mutex::new(HashMap::new()),
            next_token: AtomicU32::new(1),
        }
    }

    fn ensure_connected(&self) -> ClientResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ClientError::not_open("connection is closed"));
        }
        Ok(())
    }

    fn lookup(&self, token: QueueToken) -> ClientResult<(Arc<QueueState>, watch::Receiver<bool>)> {
        let opens = self.opens.lock().expect("open-table lock poisoned");
        let open = opens
            .get(&token)
            .ok_or_else(|| ClientError::not_open("queue handle is not open"))?;
        Ok((open.queue.clone(), open.closed_tx.subscribe()))
    }
}

#[async_trait::async_trait]
impl BrokerTransport for MemoryTransport {
    async fn connect(&self) -> ClientResult<()> {
        if *self.session_closed_tx.borrow() {
            // no implicit reconnect: a torn-down session stays down
            return Err(ClientError::not_open("session was disconnected"));
        }
        self.broker.check_reachable(&self.endpoint)?;
        self.broker.authenticate(&self.credentials)?;
        self.connected.store(true, Ordering::SeqCst);
        debug!(endpoint = %self.endpoint, "session established");
        Ok(())
    }

    async fn disconnect(&self) -> ClientResult<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let drained: Vec<OpenState> = self
            .opens
            .lock()
            .expect("open-table lock poisoned")
            .drain()
            .map(|(_, open)| open)
            .collect();
        for open in drained {
            let _ = open.closed_tx.send(true);
        }
        let _ = self.session_closed_tx.send(true);
        debug!(endpoint = %self.endpoint, "session released");
        Ok(())
    }

    async fn open_queue(&self, name: &str, intent: OpenIntent) -> ClientResult<QueueToken> {
        self.ensure_connected()?;
        let queue = self.broker.find_queue(name)?;
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let (closed_tx, _) = watch::channel(false);
        self.opens
            .lock()
            .expect("open-table lock poisoned")
            .insert(
                token,
                OpenState {
                    name: name.to_string(),
                    queue,
                    closed_tx,
                },
            );
        debug!(queue = name, token, %intent, "queue opened");
        Ok(token)
    }

    async fn close_queue(&self, token: QueueToken) -> ClientResult<()> {
        let removed = self
            .opens
            .lock()
            .expect("open-table lock poisoned")
            .remove(&token);
        if let Some(open) = removed {
            let _ = open.closed_tx.send(true);
            debug!(queue = %open.name, token, "queue closed");
        }
        Ok(())
    }

    async fn put(
        &self,
        token: QueueToken,
        payload: Bytes,
        persistent: bool,
    ) -> ClientResult<MessageId> {
        self.ensure_connected()?;
        let (queue, _) = self.lookup(token)?;
        let envelope = MessageEnvelope {
            payload,
            id: MessageId::assign(),
            persistent,
            enqueued_at: Utc::now(),
        };
        let id = envelope.id;
        queue.push_back(envelope);
        queue.notify.notify_waiters();
        trace!(%id, persistent, "message enqueued");
        Ok(id)
    }

    async fn get(&self, token: QueueToken, wait: WaitMode) -> ClientResult<GetOutcome> {
        self.ensure_connected()?;
        let (queue, mut handle_closed) = self.lookup(token)?;
        let mut session_closed = self.session_closed_tx.subscribe();
        let deadline = match wait {
            WaitMode::Timeout(window) => Some(tokio::time::Instant::now() + window),
            _ => None,
        };

        loop {
            if *session_closed.borrow() || *handle_closed.borrow() {
                return Err(ClientError::Closed);
            }

            // Register interest before the emptiness check so a put landing
            // in between still wakes us.
            let notified = queue.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(envelope) = queue.pop_front() {
                return Ok(GetOutcome::Message(envelope));
            }

            match wait {
                WaitMode::NoWait => return Ok(GetOutcome::Empty),
                WaitMode::Timeout(_) => {
                    let deadline = deadline.expect("deadline set for timeout mode");
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(deadline) => return Ok(GetOutcome::Empty),
                        _ = session_closed.changed() => return Err(ClientError::Closed),
                        _ = handle_closed.changed() => return Err(ClientError::Closed),
                    }
                }
                WaitMode::Forever => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = session_closed.changed() => return Err(ClientError::Closed),
                        _ = handle_closed.changed() => return Err(ClientError::Closed),
                    }
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
