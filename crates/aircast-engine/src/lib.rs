//! Streaming client orchestrator.
//!
//! This crate coordinates capture, encoding, transport, and the broadcast
//! control plane into a single engine driven by typed commands, and merges
//! push and poll telemetry into status snapshots for the UI.

mod orchestrator;
mod state;
mod status;

pub use orchestrator::Engine;
pub use state::ResourceManager;
pub use status::{PushStatus, ReporterInput, StatusReporter};

use aircast_ipc::{ClientCommand, ClientEvent};
use crossbeam_channel::{Receiver, Sender};

/// Create an engine instance with IPC channels.
pub fn create_engine(command_rx: Receiver<ClientCommand>, event_tx: Sender<ClientEvent>) -> Engine {
    Engine::new(command_rx, event_tx)
}
