//! Error types for the control module.

use thiserror::Error;

/// Errors that can occur talking to the broadcast control API.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Stream authorization was refused; never retried automatically.
    #[error("Stream authorization failed: {0}")]
    AuthorizationFailure(String),

    /// The API answered with a non-success status.
    #[error("Control API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The HTTP request itself failed.
    #[error("Control API request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a body we could not interpret.
    #[error("Invalid control API response: {0}")]
    InvalidResponse(String),

    /// The requested lifecycle operation is illegal in the current state.
    #[error("Session state error: {0}")]
    SessionState(String),
}
