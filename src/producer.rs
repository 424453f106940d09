//! Producer sequence
//!
//! No state machine here: N deterministic sends, each payload carrying a
//! sequence number and timestamp for traceability, optionally paced, failing
//! fast on the first unrecoverable put error.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::client::QueueHandle;
use crate::error::ClientResult;
use crate::message::MessageId;
use crate::transport::BrokerTransport;

/// Settings for one producer run
#[derive(Debug, Clone)]
pub struct ProducerSettings {
    /// Messages to send
    pub count: u32,
    /// Leading text of each payload
    pub text: String,
    /// Advisory persistence flag, passed through to the broker
    pub persistent: bool,
    /// Fixed inter-send delay; zero disables pacing
    pub pace: Duration,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            count: 5,
            text: "msg".to_string(),
            persistent: false,
            pace: Duration::from_millis(50),
        }
    }
}

/// Identifiers recorded from a completed producer run, in send order
#[derive(Debug, Clone)]
pub struct ProducerReport {
    pub sent: Vec<MessageId>,
}

/// Build the payload for message `seq` of `total`
pub fn format_payload(text: &str, seq: u32, total: u32, now: DateTime<Utc>) -> String {
    let epoch_secs = now.timestamp_millis() as f64 / 1000.0;
    format!("{text} {seq}/{total} @ {epoch_secs:.3}")
}

/// Send `settings.count` messages through `handle`, fail-fast
pub async fn run_producer<T: BrokerTransport>(
    handle: &QueueHandle<T>,
    settings: &ProducerSettings,
) -> ClientResult<ProducerReport> {
    let mut sent = Vec::with_capacity(settings.count as usize);
    for seq in 1..=settings.count {
        let payload = format_payload(&settings.text, seq, settings.count, Utc::now());
        let id = handle.put(payload.clone(), settings.persistent).await?;
        info!(queue = handle.name(), %id, payload, "put");
        sent.push(id);
        if seq < settings.count && !settings.pace.is_zero() {
            tokio::time::sleep(settings.pace).await;
        }
    }
    Ok(ProducerReport { sent })
}
