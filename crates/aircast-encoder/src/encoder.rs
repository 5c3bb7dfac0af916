//! Frame emission pacing.
//!
//! The frame encoder runs one pacing thread per broadcast: every chunk
//! interval it drains whatever the capture pipeline produced, feeds the
//! negotiated codec, and emits at most one [`AudioFrame`]. Frames are
//! emitted regardless of transport state; dropping while disconnected is
//! the transport layer's job.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TryRecvError};
use tracing::{debug, info, warn};

use aircast_audio::SampleChunk;

use crate::{AudioFrame, FrameCodec, FRAME_CHANNEL_CAPACITY};

/// Paces encoded frames out of a capture session's sample stream.
pub struct FrameEncoder {
    should_stop: Arc<AtomicBool>,
    next_sequence: Arc<AtomicU64>,
    frames_emitted: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl FrameEncoder {
    /// Start the pacing thread.
    ///
    /// `start_sequence` seeds frame numbering so a mid-session device swap
    /// keeps the wire order strictly monotonic.
    pub fn start(
        mut codec: Box<dyn FrameCodec>,
        sample_rx: Receiver<SampleChunk>,
        chunk_interval: Duration,
        start_sequence: u64,
    ) -> (Self, Receiver<AudioFrame>) {
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(FRAME_CHANNEL_CAPACITY);

        let should_stop = Arc::new(AtomicBool::new(false));
        let next_sequence = Arc::new(AtomicU64::new(start_sequence));
        let frames_emitted = Arc::new(AtomicU64::new(0));

        let stop = Arc::clone(&should_stop);
        let sequence = Arc::clone(&next_sequence);
        let emitted = Arc::clone(&frames_emitted);

        let thread = thread::Builder::new()
            .name("aircast-encoder".to_string())
            .spawn(move || {
                info!(
                    codec = codec.name(),
                    interval_ms = chunk_interval.as_millis() as u64,
                    "Frame encoder started"
                );

                let mut disconnected = false;

                while !stop.load(Ordering::SeqCst) && !disconnected {
                    let tick_start = Instant::now();

                    loop {
                        match sample_rx.try_recv() {
                            Ok(chunk) => {
                                if let Err(e) = codec.push_samples(&chunk.samples) {
                                    warn!("Encode error: {}", e);
                                }
                            }
                            Err(TryRecvError::Empty) => break,
                            Err(TryRecvError::Disconnected) => {
                                debug!("Sample channel disconnected");
                                disconnected = true;
                                break;
                            }
                        }
                    }

                    match codec.take_frame() {
                        Ok(Some(payload)) => {
                            let seq = sequence.fetch_add(1, Ordering::SeqCst);
                            let frame = AudioFrame {
                                payload,
                                sequence: seq,
                                format: codec.format(),
                            };
                            if frame_tx.try_send(frame).is_ok() {
                                emitted.fetch_add(1, Ordering::Relaxed);
                            } else {
                                warn!(sequence = seq, "Frame channel full, dropping frame");
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!("Frame assembly error: {}", e),
                    }

                    let elapsed = tick_start.elapsed();
                    if elapsed < chunk_interval {
                        thread::sleep(chunk_interval - elapsed);
                    }
                }

                debug!("Frame encoder stopped");
            })
            .expect("failed to spawn encoder thread");

        (
            Self {
                should_stop,
                next_sequence,
                frames_emitted,
                thread: Some(thread),
            },
            frame_rx,
        )
    }

    /// The sequence number the next emitted frame will carry.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence.load(Ordering::SeqCst)
    }

    /// Total frames emitted by this encoder.
    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted.load(Ordering::Relaxed)
    }

    /// Stop the pacing thread.
    pub fn stop(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FrameEncoder {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pcm16Codec;

    #[test]
    fn test_frames_follow_capture_order() {
        let (sample_tx, sample_rx) = crossbeam_channel::bounded(32);

        let (mut encoder, frame_rx) = FrameEncoder::start(
            Box::new(Pcm16Codec::new()),
            sample_rx,
            Duration::from_millis(5),
            0,
        );

        for i in 0..4 {
            sample_tx
                .send(SampleChunk {
                    samples: vec![0.1; 480],
                    sequence: i,
                })
                .unwrap();
            thread::sleep(Duration::from_millis(10));
        }

        encoder.stop();

        let frames: Vec<_> = frame_rx.try_iter().collect();
        assert!(!frames.is_empty());
        for pair in frames.windows(2) {
            assert!(pair[0].sequence < pair[1].sequence);
        }
        assert_eq!(frames[0].sequence, 0);
        assert_eq!(encoder.frames_emitted(), frames.len() as u64);
    }

    #[test]
    fn test_sequence_resumes_from_seed() {
        let (sample_tx, sample_rx) = crossbeam_channel::bounded(32);

        let (mut encoder, frame_rx) = FrameEncoder::start(
            Box::new(Pcm16Codec::new()),
            sample_rx,
            Duration::from_millis(5),
            42,
        );

        sample_tx
            .send(SampleChunk {
                samples: vec![0.1; 480],
                sequence: 0,
            })
            .unwrap();
        thread::sleep(Duration::from_millis(20));
        encoder.stop();

        let frame = frame_rx.try_iter().next().expect("one frame");
        assert_eq!(frame.sequence, 42);
        assert!(encoder.next_sequence() > 42);
    }

    #[test]
    fn test_encoder_exits_when_capture_closes() {
        let (sample_tx, sample_rx) = crossbeam_channel::bounded::<SampleChunk>(4);

        let (mut encoder, _frame_rx) = FrameEncoder::start(
            Box::new(Pcm16Codec::new()),
            sample_rx,
            Duration::from_millis(5),
            0,
        );

        drop(sample_tx);
        thread::sleep(Duration::from_millis(30));

        // The pacing thread has already exited; stop() just reaps it.
        encoder.stop();
    }
}
