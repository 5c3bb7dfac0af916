//! Microphone device enumeration, capture, and level metering.
//!
//! This crate provides the capture side of the streaming client: listing
//! input devices, opening a device-bound capture session with a small
//! voice-processing front end, and a periodic analysis tap that turns the
//! live signal into a 0-100 level value.

mod capture;
mod device;
mod error;
mod level;

pub use capture::{CaptureConfig, CaptureSession, SampleChunk};
pub use device::{default_input_device, find_device_by_id, list_devices};
pub use error::AudioError;
pub use level::{LevelMeter, LevelTap};

/// Channel capacity for sample chunks.
pub const SAMPLE_CHANNEL_CAPACITY: usize = 32;

/// Channel capacity for level updates.
pub const LEVEL_CHANNEL_CAPACITY: usize = 8;

/// Result type for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;

/// Audio sample rate in Hz.
pub const SAMPLE_RATE: u32 = 48_000;

/// Number of capture channels (microphone is mono).
pub const CHANNELS: u16 = 1;
