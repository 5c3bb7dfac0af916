//! Opus frame codec.
//!
//! Encodes 20 ms Opus packets and packs every packet produced within one
//! chunk interval into a single frame payload. Each packet is prefixed with
//! its length as a big-endian u16.

use bytes::{BufMut, Bytes, BytesMut};
use opus::{Application, Bitrate, Channels, Encoder};

use crate::error::EncoderError;
use crate::{EncoderConfig, EncoderResult, FrameCodec, FrameFormat};

/// Opus packet duration in blocks per second (20 ms packets).
const PACKETS_PER_SECOND: u32 = 50;

/// Maximum encoded Opus packet size (a packet tops out near 1275 bytes).
const MAX_PACKET_BYTES: usize = 4000;

/// Opus encoder behind the [`FrameCodec`] seam.
pub struct OpusFrameCodec {
    encoder: Encoder,
    format: FrameFormat,
    /// Samples per encode block, all channels interleaved.
    block_samples: usize,
    pending: Vec<f32>,
    packets: Vec<Bytes>,
    /// Encoding buffer (reused to avoid allocations).
    encode_buffer: Vec<u8>,
}

impl OpusFrameCodec {
    /// Create a codec for the given Opus flavor.
    pub fn new(format: FrameFormat, config: &EncoderConfig) -> EncoderResult<Self> {
        let channels = match config.channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            other => {
                return Err(EncoderError::CodecInit(format!(
                    "unsupported channel count: {other}"
                )))
            }
        };

        let application = match format {
            FrameFormat::OpusVoice => Application::Voip,
            FrameFormat::OpusMusic => Application::Audio,
            FrameFormat::Pcm16 => {
                return Err(EncoderError::CodecInit(
                    "pcm16 is not an Opus format".to_string(),
                ))
            }
        };

        let mut encoder = Encoder::new(config.sample_rate, channels, application)
            .map_err(|e| EncoderError::CodecInit(e.to_string()))?;
        encoder
            .set_bitrate(Bitrate::Bits(config.bitrate_kbps as i32 * 1000))
            .map_err(|e| EncoderError::CodecInit(e.to_string()))?;

        let block_samples =
            (config.sample_rate / PACKETS_PER_SECOND) as usize * config.channels as usize;

        Ok(Self {
            encoder,
            format,
            block_samples,
            pending: Vec::with_capacity(block_samples * 2),
            packets: Vec::new(),
            encode_buffer: vec![0u8; MAX_PACKET_BYTES],
        })
    }
}

impl FrameCodec for OpusFrameCodec {
    fn push_samples(&mut self, samples: &[f32]) -> EncoderResult<()> {
        self.pending.extend_from_slice(samples);

        while self.pending.len() >= self.block_samples {
            let written = self
                .encoder
                .encode_float(&self.pending[..self.block_samples], &mut self.encode_buffer)
                .map_err(|e| EncoderError::Encoding(e.to_string()))?;
            self.packets
                .push(Bytes::copy_from_slice(&self.encode_buffer[..written]));
            self.pending.drain(..self.block_samples);
        }

        Ok(())
    }

    fn take_frame(&mut self) -> EncoderResult<Option<Bytes>> {
        if self.packets.is_empty() {
            return Ok(None);
        }

        let total: usize = self.packets.iter().map(|p| p.len() + 2).sum();
        let mut payload = BytesMut::with_capacity(total);
        for packet in self.packets.drain(..) {
            payload.put_u16(packet.len() as u16);
            payload.extend_from_slice(&packet);
        }

        Ok(Some(payload.freeze()))
    }

    fn format(&self) -> FrameFormat {
        self.format
    }

    fn name(&self) -> &'static str {
        match self.format {
            FrameFormat::OpusVoice => "opus-voice",
            _ => "opus-music",
        }
    }
}

/// Split a frame payload back into its length-prefixed packets.
///
/// Inverse of the frame packing; returns `None` on a malformed payload.
pub fn split_packets(payload: &[u8]) -> Option<Vec<&[u8]>> {
    let mut packets = Vec::new();
    let mut rest = payload;

    while !rest.is_empty() {
        if rest.len() < 2 {
            return None;
        }
        let len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        rest = &rest[2..];
        if rest.len() < len {
            return None;
        }
        packets.push(&rest[..len]);
        rest = &rest[len..];
    }

    Some(packets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> OpusFrameCodec {
        OpusFrameCodec::new(FrameFormat::OpusVoice, &EncoderConfig::default()).unwrap()
    }

    #[test]
    fn test_chunk_interval_yields_expected_packet_count() {
        let mut codec = codec();
        // 100 ms of mono audio at 48 kHz.
        codec.push_samples(&vec![0.1; 4800]).unwrap();

        let frame = codec.take_frame().unwrap().expect("frame");
        let packets = split_packets(&frame).expect("well-formed payload");
        assert_eq!(packets.len(), 5);
        assert!(packets.iter().all(|p| !p.is_empty()));
    }

    #[test]
    fn test_partial_block_is_held_back() {
        let mut codec = codec();
        // Less than one 20 ms block.
        codec.push_samples(&vec![0.1; 400]).unwrap();
        assert!(codec.take_frame().unwrap().is_none());

        // Completing the block produces exactly one packet.
        codec.push_samples(&vec![0.1; 560]).unwrap();
        let frame = codec.take_frame().unwrap().expect("frame");
        assert_eq!(split_packets(&frame).unwrap().len(), 1);
    }

    #[test]
    fn test_take_frame_drains() {
        let mut codec = codec();
        codec.push_samples(&vec![0.1; 960]).unwrap();
        assert!(codec.take_frame().unwrap().is_some());
        assert!(codec.take_frame().unwrap().is_none());
    }

    #[test]
    fn test_split_packets_rejects_truncation() {
        let mut codec = codec();
        codec.push_samples(&vec![0.1; 960]).unwrap();
        let frame = codec.take_frame().unwrap().unwrap();
        assert!(split_packets(&frame[..frame.len() - 1]).is_none());
    }
}
