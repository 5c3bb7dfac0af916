//! Error types for the audio module.

use thiserror::Error;

/// Errors that can occur during audio operations.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The host denied microphone access.
    #[error("Microphone access denied")]
    PermissionDenied,

    /// Audio device not found.
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Device exists but is held exclusively by another process.
    #[error("Audio device busy: {0}")]
    DeviceBusy(String),

    /// Device enumeration failed.
    #[error("Device enumeration failed: {0}")]
    Enumeration(String),

    /// Building or starting the input stream failed.
    #[error("Input stream error: {0}")]
    StreamBuild(String),
}

impl AudioError {
    /// Classify a stream-build failure into the user-facing taxonomy.
    ///
    /// cpal folds OS-level permission and exclusive-lock failures into
    /// backend-specific messages, so classification is by description.
    pub fn from_build_error(device_id: &str, err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => {
                Self::DeviceNotFound(device_id.to_string())
            }
            cpal::BuildStreamError::BackendSpecific { err } => {
                classify_backend_message(&err.description)
            }
            other => Self::StreamBuild(other.to_string()),
        }
    }

    /// Classify an enumeration failure.
    pub fn from_devices_error(err: cpal::DevicesError) -> Self {
        match err {
            cpal::DevicesError::BackendSpecific { err } => {
                classify_backend_message(&err.description)
            }
        }
    }
}

fn classify_backend_message(description: &str) -> AudioError {
    let lower = description.to_ascii_lowercase();
    if lower.contains("denied") || lower.contains("permission") || lower.contains("not permitted") {
        AudioError::PermissionDenied
    } else if lower.contains("in use") || lower.contains("busy") || lower.contains("exclusive") {
        AudioError::DeviceBusy(description.to_string())
    } else {
        AudioError::StreamBuild(description.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_permission_message() {
        assert!(matches!(
            classify_backend_message("Access to the requested device was denied"),
            AudioError::PermissionDenied
        ));
    }

    #[test]
    fn test_classify_busy_message() {
        assert!(matches!(
            classify_backend_message("The device is already in use by another client"),
            AudioError::DeviceBusy(_)
        ));
    }

    #[test]
    fn test_classify_other_message() {
        assert!(matches!(
            classify_backend_message("unexpected backend failure"),
            AudioError::StreamBuild(_)
        ));
    }
}
