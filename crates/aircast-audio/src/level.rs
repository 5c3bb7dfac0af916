//! Audio level metering.
//!
//! The capture callback feeds a shared sample window; a periodic analysis
//! thread runs a small FFT over it and maps the mean bin magnitude linearly
//! to a 0-100 level value. The analysis loop never touches the capture or
//! network paths.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use tracing::debug;

use crate::LEVEL_CHANNEL_CAPACITY;

/// FFT window size for the analysis tap.
pub const FFT_SIZE: usize = 256;

/// Analysis updates per second.
const UPDATE_HZ: u64 = 60;

/// Shared window of the most recent capture samples.
///
/// The capture callback is the only writer; the meter thread only reads.
pub struct LevelTap {
    window: Mutex<Vec<f32>>,
    level: AtomicU8,
}

impl LevelTap {
    /// Create an empty tap.
    pub fn new() -> Self {
        Self {
            window: Mutex::new(Vec::with_capacity(FFT_SIZE)),
            level: AtomicU8::new(0),
        }
    }

    /// Append samples, keeping only the most recent window.
    pub fn push_samples(&self, samples: &[f32]) {
        let mut window = self.window.lock();

        if samples.len() >= FFT_SIZE {
            window.clear();
            window.extend_from_slice(&samples[samples.len() - FFT_SIZE..]);
            return;
        }

        let overflow = (window.len() + samples.len()).saturating_sub(FFT_SIZE);
        if overflow > 0 {
            window.drain(..overflow);
        }
        window.extend_from_slice(samples);
    }

    /// Most recently computed level, 0-100.
    pub fn level(&self) -> u8 {
        self.level.load(Ordering::Relaxed)
    }

    fn snapshot(&self) -> Vec<f32> {
        self.window.lock().clone()
    }
}

impl Default for LevelTap {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic analysis loop publishing level updates.
pub struct LevelMeter {
    should_stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl LevelMeter {
    /// Start the analysis loop over the given tap.
    ///
    /// Returns the meter and a bounded receiver of level updates; stale
    /// updates are dropped rather than queued.
    pub fn start(tap: Arc<LevelTap>) -> (Self, Receiver<u8>) {
        let (level_tx, level_rx) = crossbeam_channel::bounded(LEVEL_CHANNEL_CAPACITY);
        let should_stop = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&should_stop);

        let thread = thread::spawn(move || {
            let mut planner = FftPlanner::<f32>::new();
            let fft = planner.plan_fft_forward(FFT_SIZE);
            let tick = Duration::from_nanos(1_000_000_000 / UPDATE_HZ);

            while !stop.load(Ordering::SeqCst) {
                let started = Instant::now();

                let window = tap.snapshot();
                let level = compute_level(&window, fft.as_ref());
                tap.level.store(level, Ordering::Relaxed);
                let _ = level_tx.try_send(level);

                let elapsed = started.elapsed();
                if elapsed < tick {
                    thread::sleep(tick - elapsed);
                }
            }

            debug!("Level meter stopped");
        });

        (
            Self {
                should_stop,
                thread: Some(thread),
            },
            level_rx,
        )
    }

    /// Stop the analysis loop.
    pub fn stop(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LevelMeter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Mean FFT bin magnitude mapped linearly to 0-100.
///
/// A full-scale sine concentrates magnitude `FFT_SIZE / 2` in one bin of the
/// half-spectrum, giving a mean of 1.0 across the `FFT_SIZE / 2` bins, so the
/// mapping is simply `mean * 100` clamped.
fn compute_level(window: &[f32], fft: &dyn rustfft::Fft<f32>) -> u8 {
    if window.len() < FFT_SIZE {
        return 0;
    }

    let mut buffer: Vec<Complex<f32>> = window[window.len() - FFT_SIZE..]
        .iter()
        .map(|&s| Complex::new(s, 0.0))
        .collect();
    fft.process(&mut buffer);

    let bins = FFT_SIZE / 2;
    let sum: f32 = buffer[..bins].iter().map(|c| c.norm()).sum();
    let mean = sum / bins as f32;

    (mean * 100.0).round().clamp(0.0, 100.0) as u8
}
