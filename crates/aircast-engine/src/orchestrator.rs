//! Main client engine.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use tracing::{debug, error, info, instrument, warn};

use aircast_audio::list_devices;
use aircast_control::{BroadcastControl, HttpBroadcastControl};
use aircast_ipc::{
    ClientCommand, ClientEvent, SessionState, ShutdownPhase, StartRequest, StartupPhase,
    StopReason, StreamConfig,
};
use aircast_transport::TransportEvent;

use crate::state::ResourceManager;
use crate::status::{PushStatus, ReporterInput, StatusReporter};

/// The streaming client engine.
pub struct Engine {
    command_rx: Receiver<ClientCommand>,
    event_tx: Sender<ClientEvent>,
    state: Arc<RwLock<SessionState>>,
    resources: ResourceManager,
    control_override: Option<Arc<dyn BroadcastControl>>,
    reporter: Option<StatusReporter>,
    reporter_tx: Option<Sender<ReporterInput>>,
    active_config: Option<StreamConfig>,
}

impl Engine {
    /// Create a new engine.
    pub fn new(command_rx: Receiver<ClientCommand>, event_tx: Sender<ClientEvent>) -> Self {
        Self {
            command_rx,
            event_tx,
            state: Arc::new(RwLock::new(SessionState::Idle)),
            resources: ResourceManager::new(),
            control_override: None,
            reporter: None,
            reporter_tx: None,
            active_config: None,
        }
    }

    /// Create an engine with a custom control API client.
    pub fn with_control(
        command_rx: Receiver<ClientCommand>,
        event_tx: Sender<ClientEvent>,
        api: Arc<dyn BroadcastControl>,
    ) -> Self {
        let mut engine = Self::new(command_rx, event_tx);
        engine.control_override = Some(api);
        engine
    }

    /// Run the engine (blocking).
    #[instrument(name = "engine_run", skip(self))]
    pub fn run(&mut self) {
        info!("Client engine starting");
        self.send_event(ClientEvent::Ready);

        loop {
            match self.command_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(command) => {
                    if !self.handle_command(command) {
                        break;
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    self.pump_pipeline();
                }
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    info!("Command channel disconnected, shutting down");
                    self.stop_stream(StopReason::UserRequested);
                    break;
                }
            }
        }

        info!("Client engine stopped");
    }

    /// Handle a command. Returns false if the engine should stop.
    fn handle_command(&mut self, command: ClientCommand) -> bool {
        debug!(?command, "Handling command");

        match command {
            ClientCommand::Start { config, request } => self.start_stream(config, request),
            ClientCommand::Stop => self.stop_stream(StopReason::UserRequested),
            ClientCommand::SelectDevice { device_id } => self.select_device(device_id),
            ClientCommand::GetDevices => self.send_devices(),
            ClientCommand::GetState => self.send_state(),
            ClientCommand::Shutdown => {
                self.stop_stream(StopReason::UserRequested);
                self.send_event(ClientEvent::Shutdown);
                return false;
            }
        }

        true
    }

    /// Start broadcasting.
    #[instrument(name = "start_stream", skip(self, config, request))]
    fn start_stream(&mut self, config: StreamConfig, request: StartRequest) {
        // Idempotent: ignore if already starting or on air
        {
            let state = self.state.read();
            if state.is_starting() || state.is_on_air() {
                debug!("Already starting or on air, ignoring start command");
                return;
            }
        }

        info!("Starting broadcast");
        self.transition_to(SessionState::Starting {
            phase: StartupPhase::StartSession,
        });

        let api: Arc<dyn BroadcastControl> = match &self.control_override {
            Some(api) => Arc::clone(api),
            None => match HttpBroadcastControl::new(&config.control_base_url) {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    self.fail_start(format!("Control API client failed: {}", e));
                    return;
                }
            },
        };

        match self.resources.initialize(api, &config, request) {
            Ok(session) => {
                if let Some(controller) = self.resources.controller() {
                    let (reporter, reporter_tx) = StatusReporter::start(
                        controller,
                        self.event_tx.clone(),
                        Duration::from_millis(config.poll_interval_ms),
                    );
                    self.reporter = Some(reporter);
                    self.reporter_tx = Some(reporter_tx);
                }

                self.active_config = Some(config);
                self.transition_to(SessionState::OnAir { session });
                info!("Broadcast started successfully");
            }
            Err(e) => {
                self.fail_start(e);
            }
        }
    }

    fn fail_start(&mut self, message: String) {
        error!("Broadcast start failed: {}", message);

        // Rollback any initialized resources, including the compensating
        // session end when the session phase completed.
        self.resources.rollback();

        self.transition_to(SessionState::Error {
            message: message.clone(),
            recoverable: true,
        });
        self.send_event(ClientEvent::Error {
            recoverable: true,
            message,
        });
    }

    /// Stop broadcasting.
    #[instrument(name = "stop_stream", skip(self))]
    fn stop_stream(&mut self, reason: StopReason) {
        // Idempotent: ignore if already idle or stopping
        {
            let state = self.state.read();
            if state.is_idle() || state.is_stopping() {
                debug!("Already idle or stopping, ignoring stop command");
                return;
            }
        }

        info!(?reason, "Stopping broadcast");
        self.transition_to(SessionState::Stopping {
            reason,
            phase: ShutdownPhase::StopStreaming,
        });

        if let Some(mut reporter) = self.reporter.take() {
            reporter.stop();
        }
        self.reporter_tx = None;

        // Local teardown first, session end last.
        self.resources.shutdown();
        self.active_config = None;

        self.transition_to(SessionState::Idle);
        info!("Broadcast stopped");
    }

    /// End the broadcast because of a terminal failure.
    fn fail_stream(&mut self, reason: StopReason) {
        let message = reason.message();
        warn!("Broadcast failed: {}", message);

        self.stop_stream(reason);

        self.transition_to(SessionState::Error {
            message: message.clone(),
            recoverable: true,
        });
        self.send_event(ClientEvent::Error {
            recoverable: true,
            message,
        });
    }

    /// Rebind the capture pipeline to a different input device.
    fn select_device(&mut self, device_id: String) {
        if !self.state.read().is_on_air() {
            debug!(device = %device_id, "Not on air; device applies at next start");
            return;
        }

        let Some(mut config) = self.active_config.clone() else {
            return;
        };

        match self.resources.swap_device(&config, &device_id) {
            Ok(()) => {
                config.device_id = Some(device_id);
                self.active_config = Some(config);
            }
            Err(e) => {
                self.fail_stream(StopReason::DeviceError { message: e });
            }
        }
    }

    fn send_devices(&self) {
        match list_devices() {
            Ok(devices) => {
                if devices.is_empty() {
                    // Permission was granted but nothing is plugged in; the
                    // UI can offer a refresh.
                    self.send_event(ClientEvent::NoInputDevices);
                }
                self.send_event(ClientEvent::Devices(devices));
            }
            Err(e) => {
                self.send_event(ClientEvent::Error {
                    recoverable: true,
                    message: format!("Device enumeration failed: {}", e),
                });
            }
        }
    }

    fn send_state(&self) {
        let state = self.state.read().clone();
        self.send_event(ClientEvent::StateChanged {
            previous: Box::new(state.clone()),
            current: Box::new(state),
        });
    }

    /// Forward transport and level telemetry between pipeline threads.
    fn pump_pipeline(&mut self) {
        while let Some(event) = self.resources.poll_transport_event() {
            match event {
                TransportEvent::StateChanged(state) => {
                    self.send_event(ClientEvent::Connection { state });
                }
                TransportEvent::ReconnectAdvisory {
                    attempt,
                    max_attempts,
                } => {
                    self.send_event(ClientEvent::ReconnectAdvisory {
                        attempt,
                        max_attempts,
                    });
                }
                TransportEvent::Status(status) => {
                    if let Some(tx) = &self.reporter_tx {
                        let _ = tx.try_send(ReporterInput::Push(PushStatus {
                            audio_level: status.audio_level,
                            listener_count: status.listener_count,
                        }));
                    }
                }
                TransportEvent::RetriesExhausted { attempts } => {
                    self.fail_stream(StopReason::ConnectionLost { attempts });
                    return;
                }
            }
        }

        if let Some(level) = self.resources.poll_level() {
            if let Some(tx) = &self.reporter_tx {
                let _ = tx.try_send(ReporterInput::Level(level));
            }
        }
    }

    fn transition_to(&self, new_state: SessionState) {
        let previous = {
            let mut state = self.state.write();
            let prev = state.clone();
            *state = new_state.clone();
            prev
        };

        debug!(
            previous = %previous.name(),
            current = %new_state.name(),
            "State transition"
        );

        self.send_event(ClientEvent::StateChanged {
            previous: Box::new(previous),
            current: Box::new(new_state),
        });
    }

    fn send_event(&self, event: ClientEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("Failed to send event: {}", e);
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop_stream(StopReason::UserRequested);
    }
}
