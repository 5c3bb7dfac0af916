//! Raw PCM fallback codec.
//!
//! Last-resort format: interleaved little-endian 16-bit samples with no
//! container. Always constructible, so negotiation can never fail past it.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{EncoderResult, FrameCodec, FrameFormat};

/// PCM pass-through behind the [`FrameCodec`] seam.
#[derive(Default)]
pub struct Pcm16Codec {
    pending: Vec<f32>,
}

impl Pcm16Codec {
    /// Create the fallback codec.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameCodec for Pcm16Codec {
    fn push_samples(&mut self, samples: &[f32]) -> EncoderResult<()> {
        self.pending.extend_from_slice(samples);
        Ok(())
    }

    fn take_frame(&mut self) -> EncoderResult<Option<Bytes>> {
        if self.pending.is_empty() {
            return Ok(None);
        }

        let mut payload = BytesMut::with_capacity(self.pending.len() * 2);
        for &sample in &self.pending {
            let quantized = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            payload.put_i16_le(quantized);
        }
        self.pending.clear();

        Ok(Some(payload.freeze()))
    }

    fn format(&self) -> FrameFormat {
        FrameFormat::Pcm16
    }

    fn name(&self) -> &'static str {
        "pcm16"
    }
}
