//! Error types for the hub.

use thiserror::Error;

/// Why a push to a single listener failed.
///
/// Either variant removes the listener from the registry; delivery to the
/// remaining listeners carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The receiving side is gone (client disconnected).
    #[error("listener closed")]
    Closed,

    /// The listener's buffer is full; it is not keeping up.
    #[error("listener is lagging behind")]
    Lagging,
}

/// Errors returned by downstream sinks.
///
/// These never leave the publisher task: they are logged and dropped.
#[derive(Debug, Error)]
pub enum SinkError {
    /// I/O failure writing to a file or socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be serialized.
    #[error("failed to encode payload: {0}")]
    Encode(String),

    /// Sink endpoint could not be reached.
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// Sink answered but refused the payload.
    #[error("sink rejected payload: {0}")]
    Rejected(String),

    /// No acknowledgment within the publish timeout.
    #[error("publish timed out")]
    Timeout,
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        SinkError::Encode(err.to_string())
    }
}

/// Invalid hub configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("history capacity must be at least 1")]
    ZeroHistoryCapacity,

    #[error("publish queue capacity must be at least 1")]
    ZeroPublishQueue,

    #[error("listener buffer must be at least 1")]
    ZeroListenerBuffer,

    #[error("publish timeout must be non-zero")]
    ZeroPublishTimeout,
}
