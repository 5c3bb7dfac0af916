//! Connection supervision.
//!
//! The supervisor is split in two: a pure [`ConnectionSupervisor`] core that
//! consumes typed events and returns the actions to take, and the
//! [`StreamSupervisor`] driver that executes those actions against a live
//! socket on its own tokio runtime. All transition logic lives in the core
//! so the state machine is testable without a socket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};
use url::Url;

use aircast_encoder::AudioFrame;
use aircast_ipc::ConnectionState;

use crate::connection::{is_normal_closure, ReconnectPolicy, MANUAL_CLOSE_CODE};
use crate::error::TransportError;
use crate::socket::{connect_ingest, send_probe, IngestSocket, StatusMessage};
use crate::{TransportResult, SEND_CHANNEL_CAPACITY, TRANSPORT_EVENT_CAPACITY};

/// Closure code reported when the peer vanished without a close frame.
const ABNORMAL_CLOSE_CODE: u16 = 1006;

/// Typed events consumed by the supervisor core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// The engine asked for a connection.
    ConnectRequested,

    /// The socket handshake succeeded.
    Opened,

    /// A connection attempt failed before the socket opened.
    ConnectFailed,

    /// The socket closed with the given code.
    Closed { code: u16 },

    /// A write on a believed-open socket failed.
    SendFailed,

    /// The pending backoff delay elapsed.
    RetryElapsed,

    /// The engine asked for a manual stop.
    StopRequested,
}

/// Actions the driver must take after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorAction {
    /// Start a socket handshake.
    OpenSocket,

    /// Send the writability probe frame.
    SendProbe,

    /// Arm the backoff timer for the given attempt.
    ScheduleRetry { attempt: u32, delay: Duration },

    /// Disarm any pending backoff timer.
    CancelRetry,

    /// Close the socket with the given code.
    CloseSocket { code: u16 },

    /// The retry budget is exhausted; notify the engine.
    ReportFailure { attempts: u32 },
}

/// Pure supervisor state machine.
pub struct ConnectionSupervisor {
    state: ConnectionState,
    retry_count: u32,
    policy: ReconnectPolicy,
}

impl ConnectionSupervisor {
    /// Create a supervisor in the `Disconnected` state.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            retry_count: 0,
            policy,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Failures observed since the last successful connect.
    ///
    /// Resets only on a `Connected` transition, never on a manual stop.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// The reconnect policy in effect.
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Apply one event, returning the actions the driver must take.
    ///
    /// Events that are not meaningful in the current state (a late close
    /// after a manual stop, a timer that was already cancelled) are ignored.
    pub fn handle(&mut self, event: SupervisorEvent) -> Vec<SupervisorAction> {
        match event {
            SupervisorEvent::ConnectRequested => {
                if matches!(
                    self.state,
                    ConnectionState::Disconnected | ConnectionState::Failed { .. }
                ) {
                    self.state = ConnectionState::Connecting;
                    vec![SupervisorAction::OpenSocket]
                } else {
                    vec![]
                }
            }

            SupervisorEvent::Opened => {
                if matches!(self.state, ConnectionState::Connecting) {
                    self.state = ConnectionState::Connected;
                    self.retry_count = 0;
                    vec![SupervisorAction::SendProbe]
                } else {
                    vec![]
                }
            }

            SupervisorEvent::ConnectFailed => {
                if matches!(self.state, ConnectionState::Connecting) {
                    self.failure()
                } else {
                    vec![]
                }
            }

            SupervisorEvent::Closed { code } => {
                if matches!(
                    self.state,
                    ConnectionState::Connecting | ConnectionState::Connected
                ) {
                    if is_normal_closure(code) {
                        self.state = ConnectionState::Disconnected;
                        vec![]
                    } else {
                        self.failure()
                    }
                } else {
                    vec![]
                }
            }

            SupervisorEvent::SendFailed => {
                // A write failure on an open socket is equivalent to a
                // closed socket; do not wait for a close event.
                if matches!(self.state, ConnectionState::Connected) {
                    self.failure()
                } else {
                    vec![]
                }
            }

            SupervisorEvent::RetryElapsed => {
                if matches!(self.state, ConnectionState::Reconnecting { .. }) {
                    self.state = ConnectionState::Connecting;
                    vec![SupervisorAction::OpenSocket]
                } else {
                    vec![]
                }
            }

            SupervisorEvent::StopRequested => match self.state {
                ConnectionState::Connecting | ConnectionState::Connected => {
                    self.state = ConnectionState::Disconnected;
                    vec![
                        SupervisorAction::CancelRetry,
                        SupervisorAction::CloseSocket {
                            code: MANUAL_CLOSE_CODE,
                        },
                    ]
                }
                ConnectionState::Reconnecting { .. } => {
                    self.state = ConnectionState::Disconnected;
                    vec![SupervisorAction::CancelRetry]
                }
                ConnectionState::Disconnected | ConnectionState::Failed { .. } => vec![],
            },
        }
    }

    fn failure(&mut self) -> Vec<SupervisorAction> {
        self.retry_count += 1;

        if self.policy.should_retry(self.retry_count) {
            let attempt = self.retry_count;
            self.state = ConnectionState::Reconnecting { attempt };
            vec![SupervisorAction::ScheduleRetry {
                attempt,
                delay: self.policy.delay_for_attempt(attempt),
            }]
        } else {
            let attempts = self.retry_count - 1;
            self.state = ConnectionState::Failed {
                reason: format!("connection lost after {attempts} reconnect attempts"),
            };
            vec![SupervisorAction::ReportFailure { attempts }]
        }
    }
}

/// Events the supervisor driver reports to the engine.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Connection state changed.
    StateChanged(ConnectionState),

    /// A reconnect attempt is pending; non-blocking advisory.
    ReconnectAdvisory { attempt: u32, max_attempts: u32 },

    /// A push status message arrived on the socket.
    Status(StatusMessage),

    /// The retry budget is exhausted; the session must end.
    RetriesExhausted { attempts: u32 },
}

/// Transport statistics snapshot.
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub bytes_sent: u64,
}

#[derive(Default)]
struct SharedStats {
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    bytes_sent: AtomicU64,
}

impl SharedStats {
    fn snapshot(&self) -> TransportStats {
        TransportStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

/// Owns the ingest connection lifecycle.
///
/// Only this type opens or closes the socket; frames enter through the
/// sender returned by [`connect`](Self::connect) and are dropped, never
/// queued, while the connection is not up.
pub struct StreamSupervisor {
    ingest_url: Url,
    policy: ReconnectPolicy,
    state: Arc<RwLock<ConnectionState>>,
    stats: Arc<SharedStats>,
    event_tx: Sender<TransportEvent>,
    runtime: Option<Runtime>,
    stop_tx: Option<watch::Sender<bool>>,
}

impl StreamSupervisor {
    /// Create a supervisor for the given resolved ingest URL.
    ///
    /// Returns the supervisor and the receiver for its transport events.
    pub fn new(ingest_url: Url, policy: ReconnectPolicy) -> (Self, Receiver<TransportEvent>) {
        let (event_tx, event_rx) = crossbeam_channel::bounded(TRANSPORT_EVENT_CAPACITY);

        (
            Self {
                ingest_url,
                policy,
                state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
                stats: Arc::new(SharedStats::default()),
                event_tx,
                runtime: None,
                stop_tx: None,
            },
            event_rx,
        )
    }

    /// Bring the connection up.
    ///
    /// Returns the frame sender for the encoder bridge. Frames sent while
    /// the socket is not `Connected` are dropped by the driver.
    #[instrument(name = "supervisor_connect", skip(self))]
    pub fn connect(&mut self) -> TransportResult<mpsc::Sender<AudioFrame>> {
        if self.runtime.is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        info!(url = %self.ingest_url, "Connecting to ingest endpoint");

        let runtime = Runtime::new().map_err(TransportError::Io)?;
        let (frame_tx, frame_rx) = mpsc::channel(SEND_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = watch::channel(false);

        runtime.spawn(run_supervisor(
            self.ingest_url.clone(),
            self.policy.clone(),
            frame_rx,
            stop_rx,
            Arc::clone(&self.state),
            Arc::clone(&self.stats),
            self.event_tx.clone(),
        ));

        self.runtime = Some(runtime);
        self.stop_tx = Some(stop_tx);

        Ok(frame_tx)
    }

    /// Manual stop: close the socket with the manual code and cancel any
    /// pending reconnect. Idempotent; the second call is a no-op.
    #[instrument(name = "supervisor_stop", skip(self))]
    pub fn stop(&mut self) {
        let Some(stop_tx) = self.stop_tx.take() else {
            return;
        };

        let _ = stop_tx.send(true);

        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_secs(5));
        }

        let mut state = self.state.write();
        if !state.is_failed() {
            *state = ConnectionState::Disconnected;
        }

        info!("Ingest connection stopped");
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.read().clone()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state.read().is_connected()
    }

    /// Get transport statistics.
    pub fn stats(&self) -> TransportStats {
        self.stats.snapshot()
    }
}

impl Drop for StreamSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

enum ConnectedStep {
    Stop,
    Frame(Option<AudioFrame>),
    Inbound(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
    ProbeFailed,
}

async fn run_supervisor(
    url: Url,
    policy: ReconnectPolicy,
    mut frame_rx: mpsc::Receiver<AudioFrame>,
    mut stop_rx: watch::Receiver<bool>,
    shared_state: Arc<RwLock<ConnectionState>>,
    stats: Arc<SharedStats>,
    event_tx: Sender<TransportEvent>,
) {
    let max_attempts = policy.max_attempts;
    let mut core = ConnectionSupervisor::new(policy);
    let mut socket: Option<IngestSocket> = None;
    let mut retry_deadline: Option<tokio::time::Instant> = None;
    let mut probe_pending = false;
    let mut published = ConnectionState::Disconnected;

    let mut pending = core.handle(SupervisorEvent::ConnectRequested);

    loop {
        for action in std::mem::take(&mut pending) {
            match action {
                SupervisorAction::OpenSocket => {
                    // The Connecting arm below performs the handshake.
                }
                SupervisorAction::SendProbe => {
                    probe_pending = true;
                }
                SupervisorAction::ScheduleRetry { attempt, delay } => {
                    debug!(attempt, ?delay, "Scheduling reconnect");
                    // The broken stream is useless now; release it.
                    socket = None;
                    retry_deadline = Some(tokio::time::Instant::now() + delay);
                    let _ = event_tx.try_send(TransportEvent::ReconnectAdvisory {
                        attempt,
                        max_attempts,
                    });
                }
                SupervisorAction::CancelRetry => {
                    retry_deadline = None;
                }
                SupervisorAction::CloseSocket { code } => {
                    if let Some(mut ws) = socket.take() {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: "".into(),
                        };
                        let _ = ws.close(Some(frame)).await;
                    }
                }
                SupervisorAction::ReportFailure { attempts } => {
                    warn!(attempts, "Reconnect budget exhausted");
                    socket = None;
                    let _ = event_tx.try_send(TransportEvent::RetriesExhausted { attempts });
                }
            }
        }

        if *core.state() != published {
            published = core.state().clone();
            *shared_state.write() = published.clone();
            let _ = event_tx.try_send(TransportEvent::StateChanged(published.clone()));
        }

        match core.state().clone() {
            ConnectionState::Disconnected | ConnectionState::Failed { .. } => break,

            ConnectionState::Connecting => {
                let connect_fut = connect_ingest(&url);
                tokio::pin!(connect_fut);

                loop {
                    tokio::select! {
                        biased;
                        _ = stop_rx.changed() => {
                            pending = core.handle(SupervisorEvent::StopRequested);
                            break;
                        }
                        maybe_frame = frame_rx.recv() => match maybe_frame {
                            Some(_) => {
                                stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                            }
                            None => {
                                pending = core.handle(SupervisorEvent::StopRequested);
                                break;
                            }
                        },
                        result = &mut connect_fut => {
                            match result {
                                Ok(ws) => {
                                    info!("Ingest socket connected");
                                    socket = Some(ws);
                                    pending = core.handle(SupervisorEvent::Opened);
                                }
                                Err(e) => {
                                    warn!("Connect failed: {}", e);
                                    pending = core.handle(SupervisorEvent::ConnectFailed);
                                }
                            }
                            break;
                        }
                    }
                }
            }

            ConnectionState::Connected => {
                let Some(ws) = socket.as_mut() else {
                    pending = core.handle(SupervisorEvent::Closed {
                        code: ABNORMAL_CLOSE_CODE,
                    });
                    continue;
                };

                let step = if probe_pending {
                    probe_pending = false;
                    match send_probe(ws).await {
                        Ok(()) => continue,
                        Err(_) => ConnectedStep::ProbeFailed,
                    }
                } else {
                    tokio::select! {
                        biased;
                        _ = stop_rx.changed() => ConnectedStep::Stop,
                        maybe_frame = frame_rx.recv() => ConnectedStep::Frame(maybe_frame),
                        inbound = ws.next() => ConnectedStep::Inbound(inbound),
                    }
                };

                match step {
                    ConnectedStep::Stop => {
                        pending = core.handle(SupervisorEvent::StopRequested);
                    }
                    ConnectedStep::ProbeFailed => {
                        warn!("Probe frame rejected");
                        pending = core.handle(SupervisorEvent::SendFailed);
                    }
                    ConnectedStep::Frame(Some(frame)) => {
                        let len = frame.payload.len() as u64;
                        match ws.send(Message::Binary(frame.payload.to_vec())).await {
                            Ok(()) => {
                                stats.frames_sent.fetch_add(1, Ordering::Relaxed);
                                stats.bytes_sent.fetch_add(len, Ordering::Relaxed);
                            }
                            Err(e) => {
                                warn!("Send error: {}", e);
                                stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                                pending = core.handle(SupervisorEvent::SendFailed);
                            }
                        }
                    }
                    ConnectedStep::Frame(None) => {
                        pending = core.handle(SupervisorEvent::StopRequested);
                    }
                    ConnectedStep::Inbound(Some(Ok(Message::Text(text)))) => {
                        if let Some(status) = StatusMessage::parse(&text) {
                            let _ = event_tx.try_send(TransportEvent::Status(status));
                        }
                    }
                    ConnectedStep::Inbound(Some(Ok(Message::Close(close)))) => {
                        let code = close
                            .map(|f| u16::from(f.code))
                            .unwrap_or(ABNORMAL_CLOSE_CODE);
                        debug!(code, "Ingest socket closed by peer");
                        pending = core.handle(SupervisorEvent::Closed { code });
                    }
                    ConnectedStep::Inbound(Some(Ok(_))) => {
                        // Binary and ping/pong traffic on this channel is
                        // tolerated and ignored.
                    }
                    ConnectedStep::Inbound(Some(Err(e))) => {
                        warn!("Socket error: {}", e);
                        pending = core.handle(SupervisorEvent::Closed {
                            code: ABNORMAL_CLOSE_CODE,
                        });
                    }
                    ConnectedStep::Inbound(None) => {
                        pending = core.handle(SupervisorEvent::Closed {
                            code: ABNORMAL_CLOSE_CODE,
                        });
                    }
                }
            }

            ConnectionState::Reconnecting { .. } => {
                let deadline =
                    retry_deadline.unwrap_or_else(|| tokio::time::Instant::now());

                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => {
                        pending = core.handle(SupervisorEvent::StopRequested);
                    }
                    maybe_frame = frame_rx.recv() => match maybe_frame {
                        Some(_) => {
                            stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                        }
                        None => {
                            pending = core.handle(SupervisorEvent::StopRequested);
                        }
                    },
                    _ = tokio::time::sleep_until(deadline) => {
                        retry_deadline = None;
                        pending = core.handle(SupervisorEvent::RetryElapsed);
                    }
                }
            }
        }
    }

    debug!("Supervisor driver exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor() -> ConnectionSupervisor {
        ConnectionSupervisor::new(ReconnectPolicy::default())
    }

    fn connected() -> ConnectionSupervisor {
        let mut sup = supervisor();
        sup.handle(SupervisorEvent::ConnectRequested);
        sup.handle(SupervisorEvent::Opened);
        sup
    }

    #[test]
    fn test_connected_only_via_connecting() {
        let mut sup = supervisor();

        // Opened is meaningless while disconnected.
        assert!(sup.handle(SupervisorEvent::Opened).is_empty());
        assert_eq!(*sup.state(), ConnectionState::Disconnected);

        let actions = sup.handle(SupervisorEvent::ConnectRequested);
        assert_eq!(actions, vec![SupervisorAction::OpenSocket]);
        assert_eq!(*sup.state(), ConnectionState::Connecting);

        let actions = sup.handle(SupervisorEvent::Opened);
        assert_eq!(actions, vec![SupervisorAction::SendProbe]);
        assert_eq!(*sup.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_first_abnormal_closure_schedules_one_second_retry() {
        let mut sup = connected();

        let actions = sup.handle(SupervisorEvent::Closed { code: 1006 });
        assert_eq!(
            actions,
            vec![SupervisorAction::ScheduleRetry {
                attempt: 1,
                delay: Duration::from_secs(1),
            }]
        );
        assert_eq!(*sup.state(), ConnectionState::Reconnecting { attempt: 1 });

        // The elapsed timer produces a fresh connection attempt.
        let actions = sup.handle(SupervisorEvent::RetryElapsed);
        assert_eq!(actions, vec![SupervisorAction::OpenSocket]);
        assert_eq!(*sup.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_manual_closure_never_reconnects() {
        for code in [1000u16, 1001] {
            let mut sup = connected();
            let actions = sup.handle(SupervisorEvent::Closed { code });
            assert!(actions.is_empty());
            assert_eq!(*sup.state(), ConnectionState::Disconnected);
        }
    }

    #[test]
    fn test_send_failure_is_treated_as_closed_socket() {
        let mut sup = connected();

        let actions = sup.handle(SupervisorEvent::SendFailed);
        assert_eq!(
            actions,
            vec![SupervisorAction::ScheduleRetry {
                attempt: 1,
                delay: Duration::from_secs(1),
            }]
        );
        assert_eq!(*sup.state(), ConnectionState::Reconnecting { attempt: 1 });
    }

    #[test]
    fn test_reconnect_success_resets_retry_count() {
        let mut sup = connected();
        sup.handle(SupervisorEvent::Closed { code: 1006 });
        sup.handle(SupervisorEvent::RetryElapsed);
        assert_eq!(sup.retry_count(), 1);

        sup.handle(SupervisorEvent::Opened);
        assert_eq!(sup.retry_count(), 0);
        assert_eq!(*sup.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_budget_exhaustion_after_five_failed_attempts() {
        let mut sup = connected();

        // Initial drop, then five reconnect attempts that all fail.
        let mut scheduled = Vec::new();
        scheduled.extend(sup.handle(SupervisorEvent::Closed { code: 1006 }));

        for _ in 0..5 {
            let actions = sup.handle(SupervisorEvent::RetryElapsed);
            if actions.is_empty() {
                break;
            }
            assert_eq!(actions, vec![SupervisorAction::OpenSocket]);
            scheduled.extend(sup.handle(SupervisorEvent::ConnectFailed));
        }

        let retries: Vec<_> = scheduled
            .iter()
            .filter(|a| matches!(a, SupervisorAction::ScheduleRetry { .. }))
            .collect();
        assert_eq!(retries.len(), 5);

        assert!(scheduled
            .iter()
            .any(|a| matches!(a, SupervisorAction::ReportFailure { attempts: 5 })));
        assert!(sup.state().is_failed());

        // No sixth attempt fires.
        assert!(sup.handle(SupervisorEvent::RetryElapsed).is_empty());
        assert!(sup.state().is_failed());
    }

    #[test]
    fn test_backoff_delays_follow_policy() {
        let mut sup = connected();
        let policy = ReconnectPolicy::default();

        let mut delays = Vec::new();
        for actions in [
            sup.handle(SupervisorEvent::Closed { code: 1006 }),
            {
                sup.handle(SupervisorEvent::RetryElapsed);
                sup.handle(SupervisorEvent::ConnectFailed)
            },
            {
                sup.handle(SupervisorEvent::RetryElapsed);
                sup.handle(SupervisorEvent::ConnectFailed)
            },
        ] {
            for action in actions {
                if let SupervisorAction::ScheduleRetry { attempt, delay } = action {
                    assert_eq!(delay, policy.delay_for_attempt(attempt));
                    delays.push(delay);
                }
            }
        }

        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ]
        );
    }

    #[test]
    fn test_stop_cancels_pending_retry() {
        let mut sup = connected();
        sup.handle(SupervisorEvent::Closed { code: 1006 });
        assert_eq!(*sup.state(), ConnectionState::Reconnecting { attempt: 1 });

        let actions = sup.handle(SupervisorEvent::StopRequested);
        assert_eq!(actions, vec![SupervisorAction::CancelRetry]);
        assert_eq!(*sup.state(), ConnectionState::Disconnected);

        // A timer that fires late produces no Connecting transition.
        assert!(sup.handle(SupervisorEvent::RetryElapsed).is_empty());
        assert_eq!(*sup.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_stop_is_idempotent_with_one_socket_close() {
        let mut sup = connected();

        let first = sup.handle(SupervisorEvent::StopRequested);
        let closes: Vec<_> = first
            .iter()
            .filter(|a| matches!(a, SupervisorAction::CloseSocket { code: 1000 }))
            .collect();
        assert_eq!(closes.len(), 1);

        let second = sup.handle(SupervisorEvent::StopRequested);
        assert!(second.is_empty());
        assert_eq!(*sup.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_retry_count_survives_manual_stop() {
        let mut sup = connected();
        sup.handle(SupervisorEvent::Closed { code: 1006 });
        sup.handle(SupervisorEvent::StopRequested);
        assert_eq!(sup.retry_count(), 1);
    }

    #[test]
    fn test_late_closure_after_stop_is_ignored() {
        let mut sup = connected();
        sup.handle(SupervisorEvent::StopRequested);

        // The socket's close echo must not be misclassified as abnormal.
        assert!(sup.handle(SupervisorEvent::Closed { code: 1006 }).is_empty());
        assert_eq!(*sup.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_driver_starts_disconnected_with_zero_stats() {
        let url = crate::resolve_ingest_url("ws://localhost:9/ws/live", false).unwrap();
        let (sup, _events) = StreamSupervisor::new(url, ReconnectPolicy::default());

        assert_eq!(sup.state(), ConnectionState::Disconnected);
        assert!(!sup.is_connected());

        let stats = sup.stats();
        assert_eq!(stats.frames_sent, 0);
        assert_eq!(stats.frames_dropped, 0);
        assert_eq!(stats.bytes_sent, 0);
    }

    #[test]
    fn test_failed_state_allows_manual_restart() {
        let mut sup = connected();
        sup.handle(SupervisorEvent::Closed { code: 1006 });
        for _ in 0..5 {
            sup.handle(SupervisorEvent::RetryElapsed);
            sup.handle(SupervisorEvent::ConnectFailed);
        }
        assert!(sup.state().is_failed());

        let actions = sup.handle(SupervisorEvent::ConnectRequested);
        assert_eq!(actions, vec![SupervisorAction::OpenSocket]);
        assert_eq!(*sup.state(), ConnectionState::Connecting);
    }
}
