//! Resource management and phased startup/rollback.
//!
//! Broadcast startup runs through ordered phases (session, device, encoder,
//! transport, streaming); a failure in any phase rolls back everything
//! already initialized, and shutdown is a full rollback. Rolling back the
//! session phase last gives the teardown ordering the control plane needs:
//! capture and transport are gone before the session is marked ended.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use aircast_audio::{CaptureConfig, CaptureSession, LevelMeter, SampleChunk};
use aircast_control::{BroadcastControl, LifecycleController};
use aircast_encoder::{
    default_preferences, negotiate_codec, AudioFrame, EncoderConfig, FrameEncoder,
};
use aircast_ipc::{BroadcastSession, StartRequest, StartupPhase, StreamConfig};
use aircast_transport::{
    resolve_ingest_url, ReconnectPolicy, StreamSupervisor, TransportEvent,
};

/// Resources that have been initialized during startup.
#[derive(Default)]
pub struct ActiveResources {
    /// Lifecycle controller bound to the active broadcast.
    pub controller: Option<Arc<LifecycleController>>,

    /// The active broadcast session record.
    pub session: Option<BroadcastSession>,

    /// Open capture session.
    pub capture: Option<CaptureSession>,

    /// Sample stream from capture, consumed when the encoder starts.
    pub sample_rx: Option<Receiver<SampleChunk>>,

    /// Level analysis loop.
    pub level_meter: Option<LevelMeter>,

    /// Level updates from the meter.
    pub level_rx: Option<Receiver<u8>>,

    /// Frame pacing thread.
    pub encoder: Option<FrameEncoder>,

    /// Frame stream from the encoder, consumed by the forwarder.
    pub frame_rx: Option<Receiver<AudioFrame>>,

    /// Connection supervisor.
    pub supervisor: Option<StreamSupervisor>,

    /// Supervisor events for the engine loop.
    pub transport_rx: Option<Receiver<TransportEvent>>,

    /// Frame bridge thread (encoder channel → supervisor channel).
    forwarder: Option<JoinHandle<()>>,

    /// Stop flag for the forwarder.
    forwarder_stop: Option<Arc<AtomicBool>>,

    /// Frame sender handed to the forwarder.
    frame_tx: Option<tokio::sync::mpsc::Sender<AudioFrame>>,

    /// Start request, kept for the session phase.
    request: Option<StartRequest>,
}

/// Manages resource initialization and cleanup.
pub struct ResourceManager {
    resources: Mutex<ActiveResources>,
    current_phase: Mutex<Option<StartupPhase>>,
    next_sequence: AtomicU64,
}

impl ResourceManager {
    /// Create a new resource manager.
    pub fn new() -> Self {
        Self {
            resources: Mutex::new(ActiveResources::default()),
            current_phase: Mutex::new(None),
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Initialize all phases for a new broadcast.
    ///
    /// On error the already-initialized phases are left in place for the
    /// caller to roll back.
    #[instrument(name = "init_resources", skip(self, api, config, request))]
    pub fn initialize(
        &self,
        api: Arc<dyn BroadcastControl>,
        config: &StreamConfig,
        request: StartRequest,
    ) -> Result<BroadcastSession, String> {
        {
            let mut resources = self.resources.lock();
            resources.controller = Some(Arc::new(LifecycleController::new(api)));
            resources.request = Some(request);
        }
        self.next_sequence.store(0, Ordering::SeqCst);

        let mut phase = StartupPhase::StartSession;
        loop {
            *self.current_phase.lock() = Some(phase);
            self.init_phase(config, phase)?;

            match phase.next() {
                Some(next) => phase = next,
                None => break,
            }
        }

        self.resources
            .lock()
            .session
            .clone()
            .ok_or_else(|| "session missing after startup".to_string())
    }

    /// Initialize a single phase.
    fn init_phase(&self, config: &StreamConfig, phase: StartupPhase) -> Result<(), String> {
        info!(phase = phase.name(), "Initializing phase");

        match phase {
            StartupPhase::StartSession => self.init_session(),
            StartupPhase::OpenDevice => self.init_device(config, config.device_id.as_deref()),
            StartupPhase::InitEncoder => self.init_encoder(config),
            StartupPhase::ConnectTransport => self.init_transport(config),
            StartupPhase::StartStreaming => self.start_forwarder(),
        }
    }

    fn init_session(&self) -> Result<(), String> {
        let mut resources = self.resources.lock();

        let controller = resources
            .controller
            .clone()
            .ok_or("controller not configured")?;
        let request = resources.request.clone().ok_or("start request missing")?;

        let session = controller
            .start_broadcast(&request)
            .map_err(|e| format!("Session start failed: {}", e))?;

        resources.session = Some(session);
        debug!("Session started");
        Ok(())
    }

    fn init_device(&self, config: &StreamConfig, device_id: Option<&str>) -> Result<(), String> {
        let capture_config = CaptureConfig {
            noise_suppression: config.voice_processing,
            auto_gain: config.voice_processing,
        };

        let (capture, sample_rx) = CaptureSession::open(device_id, capture_config)
            .map_err(|e| format!("Capture open failed: {}", e))?;

        let (meter, level_rx) = LevelMeter::start(capture.level_tap());

        let mut resources = self.resources.lock();
        resources.capture = Some(capture);
        resources.sample_rx = Some(sample_rx);
        resources.level_meter = Some(meter);
        resources.level_rx = Some(level_rx);

        debug!("Capture initialized");
        Ok(())
    }

    fn init_encoder(&self, config: &StreamConfig) -> Result<(), String> {
        let mut resources = self.resources.lock();

        let sample_rx = resources
            .sample_rx
            .take()
            .ok_or("capture not initialized")?;

        let encoder_config = EncoderConfig {
            bitrate_kbps: config.audio_bitrate_kbps,
            ..Default::default()
        };
        let codec = negotiate_codec(
            &default_preferences(config.voice_processing),
            &encoder_config,
        )
        .map_err(|e| format!("Encoder init failed: {}", e))?;

        let (encoder, frame_rx) = FrameEncoder::start(
            codec,
            sample_rx,
            Duration::from_millis(config.chunk_interval_ms),
            self.next_sequence.load(Ordering::SeqCst),
        );

        resources.encoder = Some(encoder);
        resources.frame_rx = Some(frame_rx);

        debug!("Encoder initialized");
        Ok(())
    }

    fn init_transport(&self, config: &StreamConfig) -> Result<(), String> {
        let url = resolve_ingest_url(&config.ingest_url, config.secure_transport)
            .map_err(|e| format!("Ingest URL invalid: {}", e))?;

        let (mut supervisor, transport_rx) = StreamSupervisor::new(url, ReconnectPolicy::default());
        let frame_tx = supervisor
            .connect()
            .map_err(|e| format!("Transport connect failed: {}", e))?;

        let mut resources = self.resources.lock();
        resources.supervisor = Some(supervisor);
        resources.transport_rx = Some(transport_rx);
        resources.frame_tx = Some(frame_tx);

        debug!("Transport connected");
        Ok(())
    }

    fn start_forwarder(&self) -> Result<(), String> {
        let mut resources = self.resources.lock();

        let frame_rx = resources.frame_rx.take().ok_or("encoder not initialized")?;
        let frame_tx = resources
            .frame_tx
            .clone()
            .ok_or("transport not initialized")?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("aircast-forwarder".to_string())
            .spawn(move || {
                forward_frames(frame_rx, frame_tx, thread_stop);
            })
            .map_err(|e| format!("Forwarder spawn failed: {}", e))?;

        resources.forwarder = Some(handle);
        resources.forwarder_stop = Some(stop);

        debug!("Streaming started");
        Ok(())
    }

    /// Rollback resources from the current phase backwards.
    #[instrument(name = "rollback_resources", skip(self))]
    pub fn rollback(&self) {
        let current = *self.current_phase.lock();

        if let Some(mut phase) = current {
            loop {
                info!(phase = phase.name(), "Rolling back phase");
                self.rollback_phase(phase);

                match phase.previous() {
                    Some(prev) => phase = prev,
                    None => break,
                }
            }
        }

        *self.current_phase.lock() = None;
    }

    fn rollback_phase(&self, phase: StartupPhase) {
        let mut resources = self.resources.lock();

        match phase {
            StartupPhase::StartStreaming => {
                if let Some(stop) = resources.forwarder_stop.take() {
                    stop.store(true, Ordering::SeqCst);
                }
                if let Some(handle) = resources.forwarder.take() {
                    let _ = handle.join();
                }
            }
            StartupPhase::ConnectTransport => {
                resources.frame_tx = None;
                if let Some(mut supervisor) = resources.supervisor.take() {
                    supervisor.stop();
                }
                resources.transport_rx = None;
            }
            StartupPhase::InitEncoder => {
                if let Some(mut encoder) = resources.encoder.take() {
                    encoder.stop();
                    self.next_sequence
                        .store(encoder.next_sequence(), Ordering::SeqCst);
                }
                resources.frame_rx = None;
            }
            StartupPhase::OpenDevice => {
                if let Some(mut meter) = resources.level_meter.take() {
                    meter.stop();
                }
                if let Some(mut capture) = resources.capture.take() {
                    capture.close();
                }
                resources.level_rx = None;
                resources.sample_rx = None;
            }
            StartupPhase::StartSession => {
                if let Some(controller) = resources.controller.take() {
                    if let Err(e) = controller.end_broadcast() {
                        warn!("End broadcast failed: {}", e);
                    }
                }
                resources.session = None;
                resources.request = None;
            }
        }
    }

    /// Shutdown all resources cleanly.
    #[instrument(name = "shutdown_resources", skip(self))]
    pub fn shutdown(&self) {
        info!("Shutting down all resources");
        self.rollback();
    }

    /// Tear down and recreate the capture pipeline with a new device.
    ///
    /// Transport and session are untouched; frame numbering continues from
    /// where the previous encoder stopped.
    #[instrument(name = "swap_device", skip(self, config))]
    pub fn swap_device(&self, config: &StreamConfig, device_id: &str) -> Result<(), String> {
        if *self.current_phase.lock() != Some(StartupPhase::StartStreaming) {
            return Err("no active pipeline to rebind".to_string());
        }

        info!(device = device_id, "Switching capture device");

        self.rollback_phase(StartupPhase::StartStreaming);
        self.rollback_phase(StartupPhase::InitEncoder);
        self.rollback_phase(StartupPhase::OpenDevice);

        self.init_device(config, Some(device_id))?;
        self.init_encoder(config)?;
        self.start_forwarder()?;

        Ok(())
    }

    /// The active broadcast session, if any.
    pub fn session(&self) -> Option<BroadcastSession> {
        self.resources.lock().session.clone()
    }

    /// The lifecycle controller for the active broadcast, if any.
    pub fn controller(&self) -> Option<Arc<LifecycleController>> {
        self.resources.lock().controller.clone()
    }

    /// Drain a transport event, if one is pending.
    pub fn poll_transport_event(&self) -> Option<TransportEvent> {
        let resources = self.resources.lock();
        resources
            .transport_rx
            .as_ref()
            .and_then(|rx| rx.try_recv().ok())
    }

    /// Drain level updates down to the most recent one.
    pub fn poll_level(&self) -> Option<u8> {
        let resources = self.resources.lock();
        let rx = resources.level_rx.as_ref()?;

        let mut latest = None;
        while let Ok(level) = rx.try_recv() {
            latest = Some(level);
        }
        latest
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Bridge encoded frames into the supervisor's send channel.
///
/// The send channel is bounded; when it is full (transport down or slow)
/// frames are dropped here, keeping memory bounded during outages.
fn forward_frames(
    frame_rx: Receiver<AudioFrame>,
    frame_tx: tokio::sync::mpsc::Sender<AudioFrame>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::SeqCst) {
        match frame_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(frame) => {
                if let Err(e) = frame_tx.try_send(frame) {
                    if matches!(e, tokio::sync::mpsc::error::TrySendError::Closed(_)) {
                        debug!("Frame channel closed, forwarder exiting");
                        break;
                    }
                    debug!("Send channel full, dropping frame");
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Encoder channel disconnected, forwarder exiting");
                break;
            }
        }
    }
}
