//! Client configuration
//!
//! Configuration is resolved exactly once at startup: an optional TOML file,
//! then `MQ_*` environment overrides, then defaults. The core never reads the
//! environment ad hoc - it receives a finished [`ClientConfig`].
//!
//! Credentials are indirected through environment variable *names*
//! (`username_env` / `password_env`) so that secrets never land in a config
//! file on disk.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Top-level client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub broker: BrokerSection,
}

/// Broker section: who we talk to and as whom
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrokerSection {
    /// Queue manager name
    pub manager: String,
    /// Server-connection channel
    pub channel: String,
    /// Endpoint in `host(port)` form
    pub endpoint: String,
    /// Default destination queue
    pub queue: String,
    /// Environment variable containing the username
    pub username_env: String,
    /// Environment variable containing the password
    pub password_env: String,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            manager: "QM1".to_string(),
            channel: "DEV.APP.SVRCONN".to_string(),
            endpoint: "localhost(1414)".to_string(),
            queue: "DEV.QUEUE.1".to_string(),
            username_env: "MQ_USER".to_string(),
            password_env: "MQ_PASSWORD".to_string(),
        }
    }
}

/// A parsed, validated broker endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

static ENDPOINT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([^()\s]+)\((\d{1,5})\)\s*$").expect("endpoint pattern"));

impl Endpoint {
    /// Parse the `host(port)` endpoint form.
    ///
    /// Validation is deliberately strict and synchronous so that a bad
    /// endpoint fails at configuration time, not on the first queue operation.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let captures = ENDPOINT_PATTERN
            .captures(raw)
            .ok_or_else(|| ConfigError::InvalidEndpoint(raw.to_string()))?;
        let host = captures[1].to_string();
        let port: u16 = captures[2]
            .parse()
            .map_err(|_| ConfigError::InvalidEndpoint(raw.to_string()))?;
        if port == 0 {
            return Err(ConfigError::InvalidEndpoint(raw.to_string()));
        }
        Ok(Self { host, port })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.host, self.port)
    }
}

/// Credentials presented to the broker at connect time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid endpoint '{0}': expected host(port)")]
    InvalidEndpoint(String),
}

impl ClientConfig {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: ClientConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from defaults plus environment overrides only
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = ClientConfig::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `MQ_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary lookup (injectable for tests)
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(manager) = lookup("MQ_QMGR") {
            self.broker.manager = manager;
        }
        if let Some(channel) = lookup("MQ_CHANNEL") {
            self.broker.channel = channel;
        }
        if let Some(endpoint) = lookup("MQ_CONN") {
            self.broker.endpoint = endpoint;
        }
        if let Some(queue) = lookup("MQ_QUEUE") {
            self.broker.queue = queue;
        }
    }

    /// Validate the parts of the configuration that can fail fast
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint().map(|_| ())
    }

    /// Parsed endpoint
    pub fn endpoint(&self) -> Result<Endpoint, ConfigError> {
        Endpoint::parse(&self.broker.endpoint)
    }

    /// Resolve credentials from the configured environment variable names.
    ///
    /// Missing variables resolve to `None` - whether anonymous connects are
    /// acceptable is the broker's decision, not ours.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: std::env::var(&self.broker.username_env).ok(),
            password: std::env::var(&self.broker.password_env).ok(),
        }
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[broker]
manager = "QM1"
channel = "DEV.APP.SVRCONN"
endpoint = "localhost(1414)"
queue = "DEV.QUEUE.1"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}
