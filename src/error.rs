//! # Error Types
//!
//! Custom error types for cellprobe using `thiserror`.

use thiserror::Error;

/// Main error type for cellprobe
#[derive(Debug, Error)]
pub enum RelayError {
    /// Durable queue could not persist or read an entry
    #[error("Queue error: {0}")]
    Queue(String),

    /// HTTP client could not be set up
    #[error("HTTP client error: {0}")]
    Http(#[source] reqwest::Error),

    /// Wire payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a single send attempt did not reach the collection endpoint
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Endpoint unreachable, connection reset, DNS failure, ...
    #[error("connection failed: {0}")]
    Connection(String),

    /// Send did not complete within the configured bound
    #[error("send timed out")]
    Timeout,

    /// Endpoint answered with a non-success status code
    #[error("HTTP {0}")]
    Status(u16),
}

/// Malformed wire text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at byte {offset}")]
pub struct DecodeError {
    pub message: String,
    pub offset: usize,
}

impl DecodeError {
    pub(crate) fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// Result type alias for cellprobe
pub type Result<T> = std::result::Result<T, RelayError>;
