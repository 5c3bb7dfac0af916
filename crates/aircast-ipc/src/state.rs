//! Client session state machine types.

use serde::{Deserialize, Serialize};

use crate::types::BroadcastSession;

/// The current state of the streaming client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// Idle, not broadcasting.
    #[default]
    Idle,

    /// Bringing a broadcast up.
    Starting {
        /// Current startup phase.
        phase: StartupPhase,
    },

    /// On air (live or testing).
    OnAir {
        /// The active broadcast session.
        session: BroadcastSession,
    },

    /// Tearing a broadcast down.
    Stopping {
        /// Reason for stopping.
        reason: StopReason,

        /// Current shutdown phase.
        phase: ShutdownPhase,
    },

    /// A terminal error ended the broadcast.
    Error {
        /// Error message.
        message: String,

        /// Whether a manual restart may succeed.
        recoverable: bool,
    },
}

impl SessionState {
    /// Returns true if the client is idle.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns true if a broadcast is on air.
    pub fn is_on_air(&self) -> bool {
        matches!(self, Self::OnAir { .. })
    }

    /// Returns true if the client is starting.
    pub fn is_starting(&self) -> bool {
        matches!(self, Self::Starting { .. })
    }

    /// Returns true if the client is stopping.
    pub fn is_stopping(&self) -> bool {
        matches!(self, Self::Stopping { .. })
    }

    /// Returns true if the client is in an error state.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Starting { .. } => "Starting",
            Self::OnAir { .. } => "OnAir",
            Self::Stopping { .. } => "Stopping",
            Self::Error { .. } => "Error",
        }
    }
}

/// Startup phases for a broadcast, in order.
///
/// The session phase runs first so that an authorization failure rolls back
/// before any device is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartupPhase {
    /// Create-or-reuse and authorize the broadcast session.
    StartSession,

    /// Open the capture device.
    OpenDevice,

    /// Negotiate and start the frame encoder.
    InitEncoder,

    /// Connect the ingest transport.
    ConnectTransport,

    /// Begin forwarding frames.
    StartStreaming,
}

impl StartupPhase {
    /// Returns the next phase, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::StartSession => Some(Self::OpenDevice),
            Self::OpenDevice => Some(Self::InitEncoder),
            Self::InitEncoder => Some(Self::ConnectTransport),
            Self::ConnectTransport => Some(Self::StartStreaming),
            Self::StartStreaming => None,
        }
    }

    /// Returns the previous phase, if any (for rollback).
    pub fn previous(self) -> Option<Self> {
        match self {
            Self::StartSession => None,
            Self::OpenDevice => Some(Self::StartSession),
            Self::InitEncoder => Some(Self::OpenDevice),
            Self::ConnectTransport => Some(Self::InitEncoder),
            Self::StartStreaming => Some(Self::ConnectTransport),
        }
    }

    /// Returns the display name for this phase.
    pub fn name(self) -> &'static str {
        match self {
            Self::StartSession => "Starting session",
            Self::OpenDevice => "Opening microphone",
            Self::InitEncoder => "Starting encoder",
            Self::ConnectTransport => "Connecting to server",
            Self::StartStreaming => "Going on air",
        }
    }
}

/// Shutdown phases for a broadcast, in order.
///
/// Local resources are released before the control API is told the session
/// ended, so a crash mid-shutdown leaves the session ended on the server
/// rather than orphaned live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownPhase {
    /// Stop forwarding frames.
    StopStreaming,

    /// Close the ingest transport.
    DisconnectTransport,

    /// Stop the frame encoder.
    ShutdownEncoder,

    /// Release the capture device.
    ReleaseDevice,

    /// Mark the session ended on the control API.
    EndSession,
}

impl ShutdownPhase {
    /// Returns the next phase, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::StopStreaming => Some(Self::DisconnectTransport),
            Self::DisconnectTransport => Some(Self::ShutdownEncoder),
            Self::ShutdownEncoder => Some(Self::ReleaseDevice),
            Self::ReleaseDevice => Some(Self::EndSession),
            Self::EndSession => None,
        }
    }

    /// Returns the display name for this phase.
    pub fn name(self) -> &'static str {
        match self {
            Self::StopStreaming => "Stopping stream",
            Self::DisconnectTransport => "Disconnecting",
            Self::ShutdownEncoder => "Stopping encoder",
            Self::ReleaseDevice => "Releasing microphone",
            Self::EndSession => "Ending session",
        }
    }
}

/// Reason for stopping a broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StopReason {
    /// DJ requested stop.
    UserRequested,

    /// Reconnect budget exhausted.
    ConnectionLost { attempts: u32 },

    /// Capture device error.
    DeviceError { message: String },

    /// Control API error.
    ControlError { message: String },
}

impl StopReason {
    /// Returns a display message for this reason.
    pub fn message(&self) -> String {
        match self {
            Self::UserRequested => "Broadcast stopped".to_string(),
            Self::ConnectionLost { attempts } => {
                format!("Connection lost after {attempts} reconnect attempts")
            }
            Self::DeviceError { message } => format!("Microphone error: {message}"),
            Self::ControlError { message } => format!("Control API error: {message}"),
        }
    }
}
