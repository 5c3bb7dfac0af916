//! Typed UI<->client messages for the streaming client.
//!
//! This crate defines all the message types used for communication between
//! the console UI layer and the streaming client engine.

mod commands;
mod events;
mod state;
mod types;

pub use commands::ClientCommand;
pub use events::ClientEvent;
pub use state::{SessionState, ShutdownPhase, StartupPhase, StopReason};
pub use types::{
    AudioDevice, BroadcastMode, BroadcastSession, BroadcastSpec, BroadcastStatus, ConnectionState,
    SessionSelector, StartRequest, StatusSnapshot, StatusSource, StreamConfig,
};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for commands (UI → Engine).
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Channel capacity for events (Engine → UI).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded command channel.
pub fn command_channel() -> (Sender<ClientCommand>, Receiver<ClientCommand>) {
    crossbeam_channel::bounded(COMMAND_CHANNEL_CAPACITY)
}

/// Creates a bounded event channel.
pub fn event_channel() -> (Sender<ClientEvent>, Receiver<ClientEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}
