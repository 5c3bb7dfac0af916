//! Broadcast control API client and session lifecycle.
//!
//! The control plane is the console backend's REST API: it owns the
//! broadcast records and the stream authorization. This crate wraps it
//! behind a trait seam and implements the two-phase start (create-or-reuse,
//! then authorize) with its compensating rollback.

mod api;
mod controller;
mod error;

pub use api::{BroadcastControl, HttpBroadcastControl, RemoteStatus};
pub use controller::LifecycleController;
pub use error::ControlError;

/// Result type for control operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// HTTP timeout for control API calls.
pub const API_TIMEOUT_SECS: u64 = 10;
