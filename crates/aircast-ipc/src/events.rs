//! Events sent from the client engine to the UI.

use serde::{Deserialize, Serialize};

use crate::state::SessionState;
use crate::types::{AudioDevice, ConnectionState, StatusSnapshot};

/// Events that the client engine can send to the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientEvent {
    /// Session state has changed.
    StateChanged {
        /// Previous state.
        previous: Box<SessionState>,

        /// Current state.
        current: Box<SessionState>,
    },

    /// Ingest connection state has changed.
    Connection {
        /// New connection state.
        state: ConnectionState,
    },

    /// Non-blocking advisory for a reconnect in progress.
    ReconnectAdvisory {
        /// Attempt number, 1-based.
        attempt: u32,

        /// Attempt budget.
        max_attempts: u32,
    },

    /// Updated telemetry snapshot.
    Status(StatusSnapshot),

    /// List of available input devices.
    Devices(Vec<AudioDevice>),

    /// Enumeration succeeded but found no input devices; a refresh may help.
    NoInputDevices,

    /// Error occurred.
    Error {
        /// Whether a manual restart may succeed.
        recoverable: bool,

        /// Error message.
        message: String,
    },

    /// Client is ready.
    Ready,

    /// Client has shut down.
    Shutdown,
}
