//! Error taxonomy for queue-client operations
//!
//! Every fault a caller can see is a `ClientError` variant. "No message
//! available" is deliberately NOT here - it is a normal outcome surfaced as
//! [`crate::message::GetOutcome::Empty`] and must never be conflated with a
//! transport fault.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Main error type for queue-client operations
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("authentication rejected by broker: {message}")]
    Auth { message: String },

    #[error("broker unreachable at {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    #[error("queue not found: {queue}")]
    NotFound { queue: String },

    #[error("not authorized to open queue: {queue}")]
    Permission { queue: String },

    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    #[error("not open: {message}")]
    NotOpen { message: String },

    #[error("transport fault: {message}")]
    Io { message: String },

    #[error("operation interrupted by close")]
    Closed,

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl ClientError {
    /// Create an authentication error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a network error for the given endpoint
    pub fn network<E: Into<String>, S: Into<String>>(endpoint: E, message: S) -> Self {
        Self::Network {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a queue-not-found error
    pub fn not_found<S: Into<String>>(queue: S) -> Self {
        Self::NotFound {
            queue: queue.into(),
        }
    }

    /// Create a permission error for a restricted queue
    pub fn permission<S: Into<String>>(queue: S) -> Self {
        Self::Permission {
            queue: queue.into(),
        }
    }

    /// Create an invalid-operation error (intent mismatch, programming error)
    pub fn invalid_operation<S: Into<String>>(message: S) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Create a not-open error (operation on a closed handle or connection)
    pub fn not_open<S: Into<String>>(message: S) -> Self {
        Self::NotOpen {
            message: message.into(),
        }
    }

    /// Create a transport I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// True for faults that terminate the delivery loop without being a crash
    pub fn is_close_interrupt(&self) -> bool {
        matches!(self, ClientError::Closed)
    }
}

static CREDENTIAL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|passwd|token|secret)[=:]\s*\S+").expect("credential pattern")
});

/// Redact credential material before an error message reaches logs or stderr.
///
/// Connection diagnostics routinely embed the channel/endpoint the client was
/// configured with; they must never embed the password that went with it.
pub fn redact_credentials(message: &str) -> String {
    CREDENTIAL_PATTERN
        .replace_all(message, "${1}=***")
        .to_string()
}

/// Result type for queue-client operations
pub type ClientResult<T> = Result<T, ClientError>;
