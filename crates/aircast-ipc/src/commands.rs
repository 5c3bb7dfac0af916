//! Commands sent from the UI to the client engine.

use serde::{Deserialize, Serialize};

use crate::types::{StartRequest, StreamConfig};

/// Commands that the UI can send to the client engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientCommand {
    /// Start broadcasting with the given configuration.
    Start {
        config: StreamConfig,
        request: StartRequest,
    },

    /// Stop the current broadcast.
    Stop,

    /// Switch the capture device, recreating the pipeline if on air.
    SelectDevice { device_id: String },

    /// Request the list of available input devices.
    GetDevices,

    /// Request current client state.
    GetState,

    /// Shutdown the client completely.
    Shutdown,
}
