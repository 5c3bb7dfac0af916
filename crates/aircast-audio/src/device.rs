//! Audio input device enumeration.

use cpal::traits::{DeviceTrait, HostTrait};
use tracing::{debug, instrument};

use aircast_ipc::AudioDevice;

use crate::error::AudioError;
use crate::AudioResult;

/// Enumerate available audio input devices.
///
/// Returns an empty list (not an error) when enumeration succeeds but no
/// input device is present; the caller decides whether that warrants a
/// user-facing advisory.
#[instrument(name = "list_devices")]
pub fn list_devices() -> AudioResult<Vec<AudioDevice>> {
    let host = cpal::default_host();

    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    let inputs = host.input_devices().map_err(AudioError::from_devices_error)?;

    for device in inputs {
        let Ok(name) = device.name() else {
            continue;
        };
        let is_default = default_name.as_deref() == Some(name.as_str());
        devices.push(AudioDevice {
            id: name.clone(),
            label: name,
            is_default,
        });
    }

    debug!(count = devices.len(), "Enumerated input devices");
    Ok(devices)
}

/// Find an input device by its ID.
pub fn find_device_by_id(id: &str) -> AudioResult<cpal::Device> {
    let host = cpal::default_host();
    let inputs = host.input_devices().map_err(AudioError::from_devices_error)?;

    for device in inputs {
        if device.name().map(|n| n == id).unwrap_or(false) {
            return Ok(device);
        }
    }

    Err(AudioError::DeviceNotFound(id.to_string()))
}

/// Get the host's default input device.
pub fn default_input_device() -> AudioResult<cpal::Device> {
    cpal::default_host()
        .default_input_device()
        .ok_or_else(|| AudioError::DeviceNotFound("default input".to_string()))
}
