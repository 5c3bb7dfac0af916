//! Microphone capture sessions.
//!
//! A capture session opens one cpal input stream on a dedicated thread,
//! runs the voice-processing front end in the stream callback, and fans
//! samples out to the encoder channel and the level tap. The cpal stream is
//! not `Send`, so it lives and dies on its thread; `close()` signals the
//! thread and joins it, releasing the device handle on every exit path.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, instrument, warn};

use crate::device::{default_input_device, find_device_by_id};
use crate::error::AudioError;
use crate::level::LevelTap;
use crate::{AudioResult, CHANNELS, SAMPLE_CHANNEL_CAPACITY, SAMPLE_RATE};

/// How long to wait for the capture thread to report startup.
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Noise gate threshold (block RMS below this is silenced).
const GATE_THRESHOLD: f32 = 1.0e-3;

/// Auto-gain target block RMS.
const AGC_TARGET_RMS: f32 = 0.1;

/// Auto-gain smoothing factor per block.
const AGC_ALPHA: f32 = 0.05;

/// Auto-gain bounds.
const AGC_MIN_GAIN: f32 = 0.5;
const AGC_MAX_GAIN: f32 = 8.0;

/// Front-end processing toggles for an open device.
#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    /// Gate out blocks below the noise floor.
    pub noise_suppression: bool,

    /// Slowly normalize block loudness toward a target.
    pub auto_gain: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            noise_suppression: true,
            auto_gain: true,
        }
    }
}

/// A block of mono f32 samples in capture order.
#[derive(Debug, Clone)]
pub struct SampleChunk {
    /// Mono samples at [`SAMPLE_RATE`].
    pub samples: Vec<f32>,

    /// Monotonically increasing block sequence number.
    pub sequence: u64,
}

/// An open handle to a microphone producing live audio.
pub struct CaptureSession {
    device_id: String,
    running: Arc<AtomicBool>,
    tap: Arc<LevelTap>,
    capture_thread: Option<JoinHandle<()>>,
}

impl CaptureSession {
    /// Open the given device (or the host default) and start capturing.
    ///
    /// Returns the session and a bounded receiver of sample chunks. The
    /// channel drops chunks on overrun rather than blocking the callback.
    #[instrument(name = "capture_open", skip(config))]
    pub fn open(
        device_id: Option<&str>,
        config: CaptureConfig,
    ) -> AudioResult<(Self, Receiver<SampleChunk>)> {
        let device = match device_id {
            Some(id) => find_device_by_id(id)?,
            None => default_input_device()?,
        };
        let resolved_id = device
            .name()
            .unwrap_or_else(|_| "unknown input".to_string());

        info!(device = %resolved_id, "Opening capture device");

        let (sample_tx, sample_rx) = crossbeam_channel::bounded(SAMPLE_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<AudioResult<()>>(1);

        let running = Arc::new(AtomicBool::new(true));
        let tap = Arc::new(LevelTap::new());

        let thread_running = Arc::clone(&running);
        let thread_tap = Arc::clone(&tap);
        let thread_id = resolved_id.clone();

        let handle = thread::Builder::new()
            .name("aircast-capture".to_string())
            .spawn(move || {
                capture_thread(
                    device,
                    thread_id,
                    config,
                    thread_running,
                    thread_tap,
                    sample_tx,
                    ready_tx,
                );
            })
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

        // Wait for the stream to actually start so device errors surface
        // from open() rather than being lost on the capture thread.
        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                return Err(AudioError::StreamBuild(
                    "capture thread did not start in time".to_string(),
                ));
            }
        }

        Ok((
            Self {
                device_id: resolved_id,
                running,
                tap,
                capture_thread: Some(handle),
            },
            sample_rx,
        ))
    }

    /// The resolved device identifier this session captures from.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The shared level tap fed by this session.
    pub fn level_tap(&self) -> Arc<LevelTap> {
        Arc::clone(&self.tap)
    }

    /// Whether the capture thread is still running.
    pub fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Release the device. Idempotent; the second call is a no-op.
    #[instrument(name = "capture_close", skip(self))]
    pub fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_thread.take() {
            let _ = handle.join();
            info!(device = %self.device_id, "Capture device released");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn capture_thread(
    device: cpal::Device,
    device_id: String,
    config: CaptureConfig,
    running: Arc<AtomicBool>,
    tap: Arc<LevelTap>,
    sample_tx: Sender<SampleChunk>,
    ready_tx: Sender<AudioResult<()>>,
) {
    let desired = StreamConfig {
        channels: CHANNELS,
        sample_rate: SampleRate(SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    };

    let (stream_config, channels) = match device.default_input_config() {
        Ok(default) => {
            // Prefer mono at the pipeline rate; fall back to the device's
            // native shape and downmix in the callback.
            if supports(&device, &desired) {
                (desired, CHANNELS)
            } else {
                let native: StreamConfig = default.config();
                let ch = native.channels;
                (native, ch)
            }
        }
        Err(cpal::DefaultStreamConfigError::DeviceNotAvailable) => {
            let _ = ready_tx.send(Err(AudioError::DeviceNotFound(device_id)));
            return;
        }
        Err(e) => {
            let _ = ready_tx.send(Err(AudioError::StreamBuild(e.to_string())));
            return;
        }
    };

    debug!(
        device = %device_id,
        channels = channels,
        sample_rate = stream_config.sample_rate.0,
        "Building input stream"
    );

    let sequence = AtomicU64::new(0);
    let mut front_end = FrontEnd::new(config);
    let mut mono = Vec::new();
    let callback_running = Arc::clone(&running);

    let stream = device.build_input_stream(
        &stream_config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if !callback_running.load(Ordering::Relaxed) {
                return;
            }

            downmix(data, channels, &mut mono);
            front_end.process(&mut mono);
            tap.push_samples(&mono);

            let seq = sequence.fetch_add(1, Ordering::Relaxed);
            let _ = sample_tx.try_send(SampleChunk {
                samples: mono.clone(),
                sequence: seq,
            });
        },
        move |err| {
            warn!("Input stream error: {}", err);
        },
        None,
    );

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(AudioError::from_build_error(&device_id, e)));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(AudioError::StreamBuild(e.to_string())));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(10));
    }

    // Dropping the stream here releases the device handle.
    drop(stream);
    debug!(device = %device_id, "Capture thread exiting");
}

fn supports(device: &cpal::Device, wanted: &StreamConfig) -> bool {
    let Ok(ranges) = device.supported_input_configs() else {
        return false;
    };
    ranges.into_iter().any(|range| {
        range.channels() == wanted.channels
            && range.min_sample_rate() <= wanted.sample_rate
            && range.max_sample_rate() >= wanted.sample_rate
    })
}

/// Average interleaved frames down to mono.
fn downmix(data: &[f32], channels: u16, out: &mut Vec<f32>) {
    out.clear();
    if channels <= 1 {
        out.extend_from_slice(data);
        return;
    }
    let ch = channels as usize;
    out.extend(
        data.chunks_exact(ch)
            .map(|frame| frame.iter().sum::<f32>() / ch as f32),
    );
}

/// Noise gate and slow automatic gain control.
struct FrontEnd {
    config: CaptureConfig,
    gain: f32,
}

impl FrontEnd {
    fn new(config: CaptureConfig) -> Self {
        Self { config, gain: 1.0 }
    }

    fn process(&mut self, samples: &mut [f32]) {
        if samples.is_empty() {
            return;
        }

        let rms = block_rms(samples);

        if self.config.noise_suppression && rms < GATE_THRESHOLD {
            samples.fill(0.0);
            return;
        }

        if self.config.auto_gain && rms > 0.0 {
            let desired = (AGC_TARGET_RMS / rms).clamp(AGC_MIN_GAIN, AGC_MAX_GAIN);
            self.gain += (desired - self.gain) * AGC_ALPHA;
            for sample in samples.iter_mut() {
                *sample = (*sample * self.gain).clamp(-1.0, 1.0);
            }
        }
    }
}

fn block_rms(samples: &[f32]) -> f32 {
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo_averages_frames() {
        let mut out = Vec::new();
        downmix(&[0.2, 0.4, -0.6, -0.2], 2, &mut out);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.3).abs() < 1.0e-6);
        assert!((out[1] + 0.4).abs() < 1.0e-6);
    }

    #[test]
    fn test_noise_gate_silences_floor() {
        let mut front_end = FrontEnd::new(CaptureConfig::default());
        let mut block = vec![1.0e-4; 480];
        front_end.process(&mut block);
        assert!(block.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_agc_raises_quiet_signal() {
        let mut front_end = FrontEnd::new(CaptureConfig {
            noise_suppression: false,
            auto_gain: true,
        });

        let quiet = vec![0.01; 480];
        let initial_rms = block_rms(&quiet);

        let mut block = quiet.clone();
        for _ in 0..200 {
            block.copy_from_slice(&quiet);
            front_end.process(&mut block);
        }

        assert!(block_rms(&block) > initial_rms * 2.0);
    }

    #[test]
    fn test_front_end_passthrough_when_disabled() {
        let mut front_end = FrontEnd::new(CaptureConfig {
            noise_suppression: false,
            auto_gain: false,
        });
        let mut block = vec![0.25; 16];
        front_end.process(&mut block);
        assert!(block.iter().all(|&s| s == 0.25));
    }

    #[test]
    fn test_open_unknown_device_fails() {
        // Hosts without any audio backend report enumeration errors instead
        // of DeviceNotFound, so only the failure itself is asserted.
        let result = CaptureSession::open(Some("::no-such-device::"), CaptureConfig::default());
        assert!(result.is_err());
    }
}
