//! Error types for network sinks.

use telemhub_core::SinkError;
use thiserror::Error;

/// Errors raised while building or using a network sink.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The endpoint answered with a non-success status.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// The sink was configured incorrectly.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout
        } else if err.is_connect() {
            AdapterError::Connection(err.to_string())
        } else {
            AdapterError::Http(err.to_string())
        }
    }
}

impl From<AdapterError> for SinkError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Http(msg) => SinkError::Rejected(msg),
            AdapterError::Auth(msg) => SinkError::Rejected(format!("unauthorized: {}", msg)),
            AdapterError::Connection(msg) | AdapterError::InvalidConfig(msg) => {
                SinkError::Unavailable(msg)
            }
            AdapterError::Timeout => SinkError::Timeout,
        }
    }
}
