//! Common types used across IPC messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A selectable audio input device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDevice {
    /// Unique identifier for this device.
    pub id: String,

    /// Display label for the UI.
    pub label: String,

    /// Whether this is the host's default input device.
    pub is_default: bool,
}

/// Connection state of the ingest transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected.
    Disconnected,

    /// Connecting to the ingest endpoint.
    Connecting,

    /// Connected and able to send frames.
    Connected,

    /// Waiting to reconnect after an abnormal closure.
    Reconnecting { attempt: u32 },

    /// Connection failed permanently; requires a manual restart.
    Failed { reason: String },
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transient state (connecting or reconnecting).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting { .. })
    }

    /// Check if failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Get status message for UI.
    pub fn message(&self) -> String {
        match self {
            Self::Disconnected => "Disconnected".to_string(),
            Self::Connecting => "Connecting...".to_string(),
            Self::Connected => "Connected".to_string(),
            Self::Reconnecting { attempt } => format!("Reconnecting (attempt {})", attempt),
            Self::Failed { reason } => format!("Failed: {}", reason),
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// Status of a broadcast session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastStatus {
    /// Created ahead of time, not yet on air.
    Scheduled,

    /// Publicly on air.
    Live,

    /// On air in dry-run mode, not publicly listed.
    Testing,

    /// Finished; terminal.
    Ended,
}

impl BroadcastStatus {
    /// Check whether a transition to `next` is legal.
    ///
    /// Transitions are monotonic within a session: `Scheduled` may go on
    /// air or end, an on-air session may only end, and `Ended` is terminal.
    pub fn can_transition_to(self, next: BroadcastStatus) -> bool {
        match (self, next) {
            (Self::Scheduled, Self::Live | Self::Testing | Self::Ended) => true,
            (Self::Live | Self::Testing, Self::Ended) => true,
            _ => false,
        }
    }

    /// Whether the session is currently on air.
    pub fn is_on_air(self) -> bool {
        matches!(self, Self::Live | Self::Testing)
    }

    /// Returns a simple string representation of the status.
    pub fn name(self) -> &'static str {
        match self {
            Self::Scheduled => "Scheduled",
            Self::Live => "Live",
            Self::Testing => "Testing",
            Self::Ended => "Ended",
        }
    }
}

/// A logical on-air session, independent of the underlying connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastSession {
    /// Server-assigned session identifier.
    pub id: u64,

    /// Display title.
    pub title: String,

    /// Current status.
    pub status: BroadcastStatus,

    /// When the session went on air, if it has.
    pub started_at: Option<DateTime<Utc>>,

    /// When the session ended, if it has.
    pub ended_at: Option<DateTime<Utc>>,
}

impl BroadcastSession {
    /// Apply a status transition, rejecting illegal ones.
    pub fn transition_to(&mut self, next: BroadcastStatus) -> Result<(), String> {
        if !self.status.can_transition_to(next) {
            return Err(format!(
                "illegal broadcast transition {} -> {}",
                self.status.name(),
                next.name()
            ));
        }
        self.status = next;
        match next {
            BroadcastStatus::Live | BroadcastStatus::Testing => {
                self.started_at = Some(Utc::now());
            }
            BroadcastStatus::Ended => {
                self.ended_at = Some(Utc::now());
            }
            BroadcastStatus::Scheduled => {}
        }
        Ok(())
    }
}

/// Specification for creating a new broadcast session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastSpec {
    /// Display title.
    pub title: String,

    /// Optional description shown in the console.
    pub description: Option<String>,
}

/// Which broadcast session a start request targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionSelector {
    /// Reuse a previously scheduled session.
    Existing { id: u64 },

    /// Create a new session from a spec.
    New { spec: BroadcastSpec },
}

/// Whether a broadcast goes publicly live or runs as a dry run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastMode {
    /// Publicly on air.
    Live,

    /// Full pipeline, not publicly listed.
    Test,
}

/// A request to start broadcasting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    /// Target session.
    pub session: SessionSelector,

    /// Live or dry-run mode.
    pub mode: BroadcastMode,
}

/// The latest merged telemetry for the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Audio level, 0-100.
    pub audio_level: u8,

    /// Current listener count.
    pub listener_count: u32,

    /// When this snapshot was observed.
    pub observed_at: DateTime<Utc>,

    /// Which path produced the listener count.
    pub source: StatusSource,
}

/// Which telemetry path a snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusSource {
    /// Push subscription on the ingest socket.
    Push,

    /// Periodic poll of the control API.
    Poll,
}

/// Configuration for starting a stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Ingest websocket URL (e.g., "ws://radio.example.edu/ws/live").
    pub ingest_url: String,

    /// Base URL of the broadcast control API.
    pub control_base_url: String,

    /// Upgrade ws:// to wss:// to match a secure console origin.
    pub secure_transport: bool,

    /// Input device identifier (None for the host default).
    pub device_id: Option<String>,

    /// Frame emission interval in milliseconds.
    pub chunk_interval_ms: u64,

    /// Target audio bitrate in kbps.
    pub audio_bitrate_kbps: u32,

    /// Enable the voice-processing front end (noise gate, auto gain).
    pub voice_processing: bool,

    /// Status poll interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ingest_url: String::new(),
            control_base_url: String::new(),
            secure_transport: true,
            device_id: None,
            chunk_interval_ms: 100,
            audio_bitrate_kbps: 128,
            voice_processing: true,
            poll_interval_ms: 3000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_status_monotonic() {
        assert!(BroadcastStatus::Scheduled.can_transition_to(BroadcastStatus::Live));
        assert!(BroadcastStatus::Scheduled.can_transition_to(BroadcastStatus::Testing));
        assert!(BroadcastStatus::Live.can_transition_to(BroadcastStatus::Ended));
        assert!(!BroadcastStatus::Live.can_transition_to(BroadcastStatus::Scheduled));
        assert!(!BroadcastStatus::Ended.can_transition_to(BroadcastStatus::Live));
        assert!(!BroadcastStatus::Ended.can_transition_to(BroadcastStatus::Scheduled));
        assert!(!BroadcastStatus::Ended.can_transition_to(BroadcastStatus::Testing));
    }

    #[test]
    fn test_session_transition_stamps_times() {
        let mut session = BroadcastSession {
            id: 7,
            title: "Morning Show".to_string(),
            status: BroadcastStatus::Scheduled,
            started_at: None,
            ended_at: None,
        };

        session.transition_to(BroadcastStatus::Live).unwrap();
        assert!(session.started_at.is_some());
        assert!(session.ended_at.is_none());

        session.transition_to(BroadcastStatus::Ended).unwrap();
        assert!(session.ended_at.is_some());

        assert!(session.transition_to(BroadcastStatus::Live).is_err());
    }
}
