//! Ingest websocket transport and connection supervision.
//!
//! This crate owns the long-lived binary socket to the ingest endpoint:
//! one-time URL resolution, the supervisor state machine with bounded
//! exponential backoff, and the frame-drop policy while disconnected.

mod connection;
mod error;
mod socket;
mod supervisor;

pub use connection::{is_normal_closure, ReconnectPolicy, MANUAL_CLOSE_CODE};
pub use error::TransportError;
pub use socket::{resolve_ingest_url, StatusMessage};
pub use supervisor::{
    ConnectionSupervisor, StreamSupervisor, SupervisorAction, SupervisorEvent, TransportEvent,
    TransportStats,
};

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Maximum reconnection attempts.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Base reconnect delay in milliseconds.
pub const BASE_RECONNECT_DELAY_MS: u64 = 1000;

/// Maximum reconnect delay in milliseconds.
pub const MAX_RECONNECT_DELAY_MS: u64 = 10_000;

/// Channel capacity for transport events (supervisor → engine).
pub const TRANSPORT_EVENT_CAPACITY: usize = 64;

/// Channel capacity for outgoing frames.
pub const SEND_CHANNEL_CAPACITY: usize = 16;
