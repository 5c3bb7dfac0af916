//! Error types for the encoder module.

use thiserror::Error;

/// Errors that can occur during encoding operations.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// No candidate format could be constructed.
    #[error("No supported frame format: {0}")]
    Unsupported(String),

    /// Codec initialization failed.
    #[error("Codec initialization failed: {0}")]
    CodecInit(String),

    /// Encoding a block failed.
    #[error("Encoding error: {0}")]
    Encoding(String),
}
