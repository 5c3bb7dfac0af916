//! Status reporting.
//!
//! Merges three telemetry inputs into one `StatusSnapshot` stream: push
//! updates from the ingest socket, a periodic poll of the control API, and
//! the local level meter. The push channel can stall silently without a
//! close event, so the poll keeps running; its results are discarded while
//! push updates are fresh and become authoritative once they go stale.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info};

use aircast_control::LifecycleController;
use aircast_ipc::{ClientEvent, StatusSnapshot, StatusSource};

/// How many poll intervals a push update stays fresh.
const PUSH_FRESHNESS_INTERVALS: u32 = 2;

/// Input pacing for the reporter loop.
const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Channel capacity for reporter inputs.
const INPUT_CHANNEL_CAPACITY: usize = 64;

/// A push status update, already stripped of its wire envelope.
#[derive(Debug, Clone)]
pub struct PushStatus {
    /// Server-observed audio level, 0-100.
    pub audio_level: Option<u8>,

    /// Current listener count.
    pub listener_count: Option<u32>,
}

/// Inputs fed to the reporter by the engine loop.
#[derive(Debug, Clone)]
pub enum ReporterInput {
    /// A push status message arrived on the ingest socket.
    Push(PushStatus),

    /// The local level meter produced a new reading.
    Level(u8),
}

/// Merges push, poll, and local telemetry into status snapshots.
pub struct StatusReporter {
    should_stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl StatusReporter {
    /// Start the reporter loop.
    ///
    /// Returns the reporter and the sender the engine uses to feed it.
    pub fn start(
        controller: Arc<LifecycleController>,
        event_tx: Sender<ClientEvent>,
        poll_interval: Duration,
    ) -> (Self, Sender<ReporterInput>) {
        let (input_tx, input_rx) = crossbeam_channel::bounded(INPUT_CHANNEL_CAPACITY);
        let should_stop = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&should_stop);

        let thread = thread::Builder::new()
            .name("aircast-status".to_string())
            .spawn(move || {
                run_reporter(controller, input_rx, event_tx, poll_interval, stop);
            })
            .expect("failed to spawn status thread");

        (
            Self {
                should_stop,
                thread: Some(thread),
            },
            input_tx,
        )
    }

    /// Stop the reporter loop.
    pub fn stop(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatusReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_reporter(
    controller: Arc<LifecycleController>,
    input_rx: Receiver<ReporterInput>,
    event_tx: Sender<ClientEvent>,
    poll_interval: Duration,
    should_stop: Arc<AtomicBool>,
) {
    info!(poll_ms = poll_interval.as_millis() as u64, "Status reporter started");

    let freshness_window = poll_interval * PUSH_FRESHNESS_INTERVALS;
    let mut next_poll = Instant::now() + poll_interval;
    let mut last_push: Option<Instant> = None;

    let mut local_level: Option<u8> = None;
    let mut remote_level: Option<u8> = None;
    let mut listener_count: u32 = 0;
    let mut last_source = StatusSource::Poll;

    let emit = |level: Option<u8>,
                remote: Option<u8>,
                listeners: u32,
                source: StatusSource,
                event_tx: &Sender<ClientEvent>| {
        let snapshot = StatusSnapshot {
            audio_level: level.or(remote).unwrap_or(0),
            listener_count: listeners,
            observed_at: Utc::now(),
            source,
        };
        let _ = event_tx.try_send(ClientEvent::Status(snapshot));
    };

    while !should_stop.load(Ordering::SeqCst) {
        match input_rx.recv_timeout(INPUT_POLL_INTERVAL) {
            Ok(ReporterInput::Push(push)) => {
                last_push = Some(Instant::now());
                last_source = StatusSource::Push;
                if let Some(count) = push.listener_count {
                    listener_count = count;
                }
                remote_level = push.audio_level.or(remote_level);
                emit(
                    local_level,
                    remote_level,
                    listener_count,
                    StatusSource::Push,
                    &event_tx,
                );
            }
            Ok(ReporterInput::Level(level)) => {
                local_level = Some(level);
                emit(
                    local_level,
                    remote_level,
                    listener_count,
                    last_source,
                    &event_tx,
                );
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }

        if Instant::now() >= next_poll {
            next_poll = Instant::now() + poll_interval;

            // The poll always runs; whether its result counts depends on
            // how fresh the push channel is.
            match controller.remote_status() {
                Ok(remote) => {
                    let push_fresh = last_push
                        .map(|at| at.elapsed() < freshness_window)
                        .unwrap_or(false);

                    if push_fresh {
                        debug!("Discarding poll result in favor of push");
                    } else {
                        listener_count = remote.listener_count;
                        remote_level = remote.audio_level.or(remote_level);
                        last_source = StatusSource::Poll;
                        emit(
                            local_level,
                            remote_level,
                            listener_count,
                            StatusSource::Poll,
                            &event_tx,
                        );
                    }
                }
                Err(e) => debug!("Status poll failed: {}", e),
            }
        }
    }

    debug!("Status reporter stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use aircast_control::{BroadcastControl, ControlError, RemoteStatus};
    use aircast_ipc::{BroadcastSession, BroadcastSpec};
    use std::sync::atomic::AtomicU32;

    struct PollControl {
        polls: AtomicU32,
    }

    impl BroadcastControl for PollControl {
        fn create(&self, _spec: &BroadcastSpec) -> Result<BroadcastSession, ControlError> {
            Err(ControlError::SessionState("not used".to_string()))
        }

        fn get(&self, _id: u64) -> Result<BroadcastSession, ControlError> {
            Err(ControlError::SessionState("not used".to_string()))
        }

        fn start(&self, _id: u64) -> Result<(), ControlError> {
            Ok(())
        }

        fn start_test(&self, _id: u64) -> Result<(), ControlError> {
            Ok(())
        }

        fn end(&self, _id: u64) -> Result<(), ControlError> {
            Ok(())
        }

        fn authorize_stream(&self) -> Result<(), ControlError> {
            Ok(())
        }

        fn deauthorize_stream(&self) -> Result<(), ControlError> {
            Ok(())
        }

        fn get_status(&self) -> Result<RemoteStatus, ControlError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(RemoteStatus {
                audio_level: None,
                listener_count: 7,
            })
        }
    }

    fn reporter_fixture(
        poll_interval: Duration,
    ) -> (
        StatusReporter,
        Sender<ReporterInput>,
        Receiver<ClientEvent>,
    ) {
        let controller = Arc::new(LifecycleController::new(Arc::new(PollControl {
            polls: AtomicU32::new(0),
        })));
        let (event_tx, event_rx) = crossbeam_channel::bounded(256);
        let (reporter, input_tx) = StatusReporter::start(controller, event_tx, poll_interval);
        (reporter, input_tx, event_rx)
    }

    fn snapshots(event_rx: &Receiver<ClientEvent>) -> Vec<StatusSnapshot> {
        event_rx
            .try_iter()
            .filter_map(|e| match e {
                ClientEvent::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_push_wins_while_fresh() {
        let (mut reporter, input_tx, event_rx) = reporter_fixture(Duration::from_millis(80));

        input_tx
            .send(ReporterInput::Push(PushStatus {
                audio_level: Some(30),
                listener_count: Some(3),
            }))
            .unwrap();
        thread::sleep(Duration::from_millis(100));
        reporter.stop();

        let snaps = snapshots(&event_rx);
        assert!(!snaps.is_empty());
        // The poll fired inside the freshness window, so every snapshot is
        // push-sourced with the pushed listener count.
        for snap in &snaps {
            assert_eq!(snap.source, StatusSource::Push);
            assert_eq!(snap.listener_count, 3);
        }
    }

    #[test]
    fn test_poll_becomes_authoritative_when_push_stales() {
        let (mut reporter, input_tx, event_rx) = reporter_fixture(Duration::from_millis(50));

        input_tx
            .send(ReporterInput::Push(PushStatus {
                audio_level: None,
                listener_count: Some(3),
            }))
            .unwrap();

        // Wait past two poll intervals with no further push traffic.
        thread::sleep(Duration::from_millis(250));
        reporter.stop();

        let snaps = snapshots(&event_rx);
        let last = snaps.last().expect("snapshots");
        assert_eq!(last.source, StatusSource::Poll);
        assert_eq!(last.listener_count, 7);
    }

    #[test]
    fn test_local_level_overrides_remote() {
        let (mut reporter, input_tx, event_rx) = reporter_fixture(Duration::from_secs(10));

        input_tx
            .send(ReporterInput::Push(PushStatus {
                audio_level: Some(10),
                listener_count: Some(1),
            }))
            .unwrap();
        input_tx.send(ReporterInput::Level(64)).unwrap();
        thread::sleep(Duration::from_millis(120));
        reporter.stop();

        let snaps = snapshots(&event_rx);
        let last = snaps.last().expect("snapshots");
        assert_eq!(last.audio_level, 64);
    }

    #[test]
    fn test_snapshots_carry_monotonic_observation_times() {
        let (mut reporter, input_tx, event_rx) = reporter_fixture(Duration::from_secs(10));

        for level in [10u8, 20, 30] {
            input_tx.send(ReporterInput::Level(level)).unwrap();
            thread::sleep(Duration::from_millis(40));
        }
        reporter.stop();

        let snaps = snapshots(&event_rx);
        assert!(snaps.len() >= 2);
        for pair in snaps.windows(2) {
            assert!(pair[0].observed_at <= pair[1].observed_at);
        }
    }
}
