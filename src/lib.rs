//! mqlink - a minimal message-queue client core
//!
//! A from-scratch client for broker-hosted FIFO queues: a connection manager,
//! queue handles with declared open intent, and delivery loops for producing
//! and consuming, all over a pluggable [`transport::BrokerTransport`] seam.
//! The broker itself is external; the crate ships an in-process
//! [`transport::InMemoryBroker`] so the full contract is exercisable without
//! a wire protocol.
//!
//! # Quick Start
//!
//! ```rust
//! use mqlink::client::{Connection, ConnectionProfile};
//! use mqlink::config::{ClientConfig, Credentials};
//! use mqlink::message::{OpenIntent, WaitMode};
//! use mqlink::transport::{InMemoryBroker, MemoryTransport};
//!
//! # tokio_test::block_on(async {
//! let config = ClientConfig::default();
//! let profile = ConnectionProfile::from_config(&config)?;
//! let broker = InMemoryBroker::new().with_queue("DEV.QUEUE.1");
//! let transport = MemoryTransport::new(broker, profile.endpoint.clone(), Credentials::default());
//!
//! let connection = Connection::establish(profile, transport).await?;
//! let queue = connection.open("DEV.QUEUE.1", OpenIntent::ReadWrite).await?;
//!
//! let id = queue.put("hello".to_string(), false).await?;
//! let outcome = queue.get(WaitMode::NoWait).await?;
//! assert_eq!(outcome.into_message().unwrap().id, id);
//!
//! queue.close().await?;
//! connection.disconnect().await?;
//! # Ok::<(), mqlink::error::ClientError>(())
//! # });
//! ```

pub mod client;
pub mod config;
pub mod consumer;
pub mod error;
pub mod message;
pub mod observability;
pub mod producer;
pub mod transport;

pub use client::{teardown, Connection, ConnectionProfile, ConnectionState, QueueHandle};
pub use config::{ClientConfig, Credentials, Endpoint};
pub use consumer::{ConsumerLoop, DrainPolicy, DrainSummary, LoopState, StopCause};
pub use error::{ClientError, ClientResult};
pub use message::{GetOutcome, MessageEnvelope, MessageId, OpenIntent, WaitMode};
pub use producer::{run_producer, ProducerReport, ProducerSettings};
pub use transport::{BrokerTransport, InMemoryBroker, MemoryTransport};
