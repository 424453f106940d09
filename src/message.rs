//! Message model: envelopes, identifiers, open intents, and wait semantics
//!
//! An envelope is a transient value tied to one put or get - the client never
//! stores messages itself; the broker is the only persistent store.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Opaque broker-assigned message identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Assign a fresh identifier. Only the broker side does this, on put.
    pub(crate) fn assign() -> Self {
        Self(Uuid::new_v4())
    }

    /// Hex rendering, the form operators grep broker logs for
    pub fn as_hex(&self) -> String {
        self.0.simple().to_string()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// One message instance: payload plus broker-assigned metadata
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEnvelope {
    pub payload: Bytes,
    pub id: MessageId,
    /// Advisory durability marker, passed through to the broker unmodified
    pub persistent: bool,
    pub enqueued_at: DateTime<Utc>,
}

impl MessageEnvelope {
    /// Payload decoded as UTF-8, lossily
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Declared intent when opening a queue handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpenIntent {
    Read,
    Write,
    ReadWrite,
}

impl OpenIntent {
    pub fn allows_get(self) -> bool {
        matches!(self, OpenIntent::Read | OpenIntent::ReadWrite)
    }

    pub fn allows_put(self) -> bool {
        matches!(self, OpenIntent::Write | OpenIntent::ReadWrite)
    }
}

impl fmt::Display for OpenIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OpenIntent::Read => "read",
            OpenIntent::Write => "write",
            OpenIntent::ReadWrite => "read-write",
        };
        write!(f, "{label}")
    }
}

/// How long a get is willing to block
///
/// The user-facing surface is a millisecond count with sentinels
/// (0 = no wait, negative = wait forever); internally the three modes are
/// distinct so nothing downstream has to re-interpret a magic number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    NoWait,
    Timeout(Duration),
    Forever,
}

impl WaitMode {
    pub fn from_millis(wait_ms: i64) -> Self {
        match wait_ms {
            0 => WaitMode::NoWait,
            ms if ms < 0 => WaitMode::Forever,
            ms => WaitMode::Timeout(Duration::from_millis(ms as u64)),
        }
    }
}

/// Result of a get attempt. `Empty` is a normal outcome, not an error.
#[derive(Debug, Clone)]
pub enum GetOutcome {
    Message(MessageEnvelope),
    Empty,
}

impl GetOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, GetOutcome::Empty)
    }

    /// Unwrap the envelope, for tests and callers that already matched
    pub fn into_message(self) -> Option<MessageEnvelope> {
        match self {
            GetOutcome::Message(envelope) => Some(envelope),
            GetOutcome::Empty => None,
        }
    }
}
