//! Error types for the transport module.

use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid ingest URL.
    #[error("Invalid ingest URL: {0}")]
    InvalidUrl(String),

    /// Send failed.
    #[error("Send failed: {0}")]
    Send(String),

    /// Reconnect exhausted.
    #[error("Reconnect attempts exhausted after {0} attempts")]
    ReconnectExhausted(u32),

    /// Not connected.
    #[error("Not connected")]
    NotConnected,

    /// Already connected.
    #[error("Already connected")]
    AlreadyConnected,

    /// Channel disconnected.
    #[error("Channel disconnected")]
    ChannelDisconnected,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
