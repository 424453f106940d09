//! Observability: structured logging for the client and its CLIs

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};
