//! Audio frame encoding and format negotiation.
//!
//! This crate turns the capture pipeline's sample stream into discrete
//! binary frames at a fixed cadence. The wire format is negotiated by
//! probing an ordered preference list: voice-tuned Opus, music-tuned Opus,
//! then a raw PCM fallback.

mod encoder;
mod error;
mod opus_codec;
mod pcm;

pub use encoder::FrameEncoder;
pub use error::EncoderError;
pub use opus_codec::OpusFrameCodec;
pub use pcm::Pcm16Codec;

use bytes::Bytes;
use tracing::{info, warn};

/// Channel capacity for emitted frames.
pub const FRAME_CHANNEL_CAPACITY: usize = 16;

/// Default frame emission interval in milliseconds.
pub const DEFAULT_CHUNK_INTERVAL_MS: u64 = 100;

/// Result type for encoder operations.
pub type EncoderResult<T> = Result<T, EncoderError>;

/// Wire format of an encoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Opus tuned for speech.
    OpusVoice,

    /// Opus tuned for general audio.
    OpusMusic,

    /// Interleaved little-endian 16-bit PCM.
    Pcm16,
}

impl FrameFormat {
    /// Returns the display name for this format.
    pub fn name(self) -> &'static str {
        match self {
            Self::OpusVoice => "opus/voice",
            Self::OpusMusic => "opus/music",
            Self::Pcm16 => "pcm16",
        }
    }
}

/// The ordered format preference list for a capture profile.
pub fn default_preferences(voice_processing: bool) -> Vec<FrameFormat> {
    if voice_processing {
        vec![
            FrameFormat::OpusVoice,
            FrameFormat::OpusMusic,
            FrameFormat::Pcm16,
        ]
    } else {
        vec![
            FrameFormat::OpusMusic,
            FrameFormat::OpusVoice,
            FrameFormat::Pcm16,
        ]
    }
}

/// Encoder configuration.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Number of channels.
    pub channels: u16,

    /// Target bitrate in kbps.
    pub bitrate_kbps: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 1,
            bitrate_kbps: 128,
        }
    }
}

/// One binary chunk of encoded audio.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Encoded payload.
    pub payload: Bytes,

    /// Strictly monotonic emission order.
    pub sequence: u64,

    /// Negotiated wire format.
    pub format: FrameFormat,
}

/// Trait for frame codecs.
pub trait FrameCodec: Send {
    /// Feed captured samples into the codec.
    fn push_samples(&mut self, samples: &[f32]) -> EncoderResult<()>;

    /// Assemble one wire frame from everything encoded since the last call.
    ///
    /// Returns `None` when nothing has been produced yet.
    fn take_frame(&mut self) -> EncoderResult<Option<Bytes>>;

    /// The format this codec produces.
    fn format(&self) -> FrameFormat;

    /// Codec name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Negotiate a codec by probing the preference list in order.
///
/// Fails with [`EncoderError::Unsupported`] only if every candidate fails
/// to construct.
pub fn negotiate_codec(
    preferences: &[FrameFormat],
    config: &EncoderConfig,
) -> EncoderResult<Box<dyn FrameCodec>> {
    let mut failures = Vec::new();

    for &format in preferences {
        let attempt: EncoderResult<Box<dyn FrameCodec>> = match format {
            FrameFormat::OpusVoice | FrameFormat::OpusMusic => {
                OpusFrameCodec::new(format, config).map(|c| Box::new(c) as Box<dyn FrameCodec>)
            }
            FrameFormat::Pcm16 => Ok(Box::new(Pcm16Codec::new()) as Box<dyn FrameCodec>),
        };

        match attempt {
            Ok(codec) => {
                if failures.is_empty() {
                    info!(format = format.name(), "Negotiated frame format");
                } else {
                    warn!(
                        format = format.name(),
                        skipped = failures.len(),
                        "Negotiated fallback frame format"
                    );
                }
                return Ok(codec);
            }
            Err(e) => failures.push(format!("{}: {}", format.name(), e)),
        }
    }

    Err(EncoderError::Unsupported(failures.join("; ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferences_follow_capture_profile() {
        assert_eq!(default_preferences(true)[0], FrameFormat::OpusVoice);
        assert_eq!(default_preferences(false)[0], FrameFormat::OpusMusic);
    }

    #[test]
    fn test_negotiate_falls_back_in_order() {
        // Three channels is not encodable as Opus, so both Opus candidates
        // fail probing and PCM wins.
        let config = EncoderConfig {
            channels: 3,
            ..Default::default()
        };
        let codec = negotiate_codec(&default_preferences(true), &config).unwrap();
        assert_eq!(codec.format(), FrameFormat::Pcm16);
    }

    #[test]
    fn test_negotiate_empty_list_is_unsupported() {
        let result = negotiate_codec(&[], &EncoderConfig::default());
        assert!(matches!(result, Err(EncoderError::Unsupported(_))));
    }

    #[test]
    fn test_negotiate_all_probes_failing_is_unsupported() {
        let config = EncoderConfig {
            channels: 3,
            ..Default::default()
        };
        let result = negotiate_codec(
            &[FrameFormat::OpusVoice, FrameFormat::OpusMusic],
            &config,
        );
        assert!(matches!(result, Err(EncoderError::Unsupported(_))));
    }
}
