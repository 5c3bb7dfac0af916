//! Broadcast session lifecycle.
//!
//! Starting a broadcast is a two-phase operation against the control API:
//! create-or-reuse the session and mark it started, then request stream
//! authorization. If authorization fails, the controller compensates by
//! ending the session it just started, so the system never holds a
//! started-but-unauthorized broadcast. The local status only becomes
//! `Live`/`Testing` after both phases succeed.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use aircast_ipc::{
    BroadcastMode, BroadcastSession, BroadcastStatus, SessionSelector, StartRequest,
};

use crate::api::{BroadcastControl, RemoteStatus};
use crate::error::ControlError;
use crate::ControlResult;

/// Coordinates the external control API with the local session record.
pub struct LifecycleController {
    api: Arc<dyn BroadcastControl>,
    active: Mutex<Option<BroadcastSession>>,
}

impl LifecycleController {
    /// Create a controller over the given API client.
    pub fn new(api: Arc<dyn BroadcastControl>) -> Self {
        Self {
            api,
            active: Mutex::new(None),
        }
    }

    /// Start a broadcast: create-or-reuse, mark started, authorize.
    ///
    /// On authorization failure the just-started session is ended before
    /// the error surfaces; authorization is never retried automatically.
    #[instrument(name = "start_broadcast", skip(self, request))]
    pub fn start_broadcast(&self, request: &StartRequest) -> ControlResult<BroadcastSession> {
        if self.active.lock().is_some() {
            return Err(ControlError::SessionState(
                "a broadcast is already active".to_string(),
            ));
        }

        // Phase 1: create-or-reuse the session and mark it started.
        let mut session = match &request.session {
            SessionSelector::New { spec } => self.api.create(spec)?,
            SessionSelector::Existing { id } => self.api.get(*id)?,
        };

        if session.status == BroadcastStatus::Ended {
            return Err(ControlError::SessionState(format!(
                "session {} has already ended",
                session.id
            )));
        }

        match request.mode {
            BroadcastMode::Live => self.api.start(session.id)?,
            BroadcastMode::Test => self.api.start_test(session.id)?,
        }

        // Phase 2: stream authorization, compensating on failure.
        if let Err(e) = self.api.authorize_stream() {
            warn!(session = session.id, "Authorization failed, ending session");
            if let Err(end_err) = self.api.end(session.id) {
                warn!(
                    session = session.id,
                    "Compensating end failed: {}", end_err
                );
            }
            return Err(e);
        }

        let on_air = match request.mode {
            BroadcastMode::Live => BroadcastStatus::Live,
            BroadcastMode::Test => BroadcastStatus::Testing,
        };
        session
            .transition_to(on_air)
            .map_err(ControlError::SessionState)?;

        info!(
            session = session.id,
            mode = on_air.name(),
            "Broadcast started"
        );
        *self.active.lock() = Some(session.clone());
        Ok(session)
    }

    /// End the active broadcast on the server and release local state.
    ///
    /// Callers must tear down capture and transport first; this runs last
    /// so a crash mid-shutdown leaves the session ended on the server.
    /// Idempotent: without an active session this is a no-op.
    #[instrument(name = "end_broadcast", skip(self))]
    pub fn end_broadcast(&self) -> ControlResult<Option<BroadcastSession>> {
        let Some(mut session) = self.active.lock().take() else {
            return Ok(None);
        };

        if let Err(e) = self.api.deauthorize_stream() {
            warn!(session = session.id, "Deauthorize failed: {}", e);
        }

        let end_result = self.api.end(session.id);

        // The pipeline is already gone, so the local record ends even if
        // the API call failed; the error still surfaces to the caller.
        let _ = session.transition_to(BroadcastStatus::Ended);
        info!(session = session.id, "Broadcast ended");

        end_result.map(|()| Some(session))
    }

    /// The active session, if any.
    pub fn active_session(&self) -> Option<BroadcastSession> {
        self.active.lock().clone()
    }

    /// Poll the control API for remote stream status.
    pub fn remote_status(&self) -> ControlResult<RemoteStatus> {
        self.api.get_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aircast_ipc::BroadcastSpec;

    #[derive(Default)]
    struct MockControl {
        calls: Mutex<Vec<String>>,
        fail_authorize: bool,
        existing_status: Option<BroadcastStatus>,
    }

    impl MockControl {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn record(&self, call: &str) {
            self.calls.lock().push(call.to_string());
        }
    }

    impl BroadcastControl for MockControl {
        fn create(&self, spec: &BroadcastSpec) -> ControlResult<BroadcastSession> {
            self.record("create");
            Ok(BroadcastSession {
                id: 11,
                title: spec.title.clone(),
                status: BroadcastStatus::Scheduled,
                started_at: None,
                ended_at: None,
            })
        }

        fn get(&self, id: u64) -> ControlResult<BroadcastSession> {
            self.record("get");
            Ok(BroadcastSession {
                id,
                title: "Scheduled Show".to_string(),
                status: self.existing_status.unwrap_or(BroadcastStatus::Scheduled),
                started_at: None,
                ended_at: None,
            })
        }

        fn start(&self, _id: u64) -> ControlResult<()> {
            self.record("start");
            Ok(())
        }

        fn start_test(&self, _id: u64) -> ControlResult<()> {
            self.record("start_test");
            Ok(())
        }

        fn end(&self, _id: u64) -> ControlResult<()> {
            self.record("end");
            Ok(())
        }

        fn authorize_stream(&self) -> ControlResult<()> {
            self.record("authorize");
            if self.fail_authorize {
                Err(ControlError::AuthorizationFailure("refused".to_string()))
            } else {
                Ok(())
            }
        }

        fn deauthorize_stream(&self) -> ControlResult<()> {
            self.record("deauthorize");
            Ok(())
        }

        fn get_status(&self) -> ControlResult<RemoteStatus> {
            self.record("get_status");
            Ok(RemoteStatus {
                audio_level: None,
                listener_count: 0,
            })
        }
    }

    fn new_request() -> StartRequest {
        StartRequest {
            session: SessionSelector::New {
                spec: BroadcastSpec {
                    title: "Night Owls".to_string(),
                    description: None,
                },
            },
            mode: BroadcastMode::Live,
        }
    }

    #[test]
    fn test_start_runs_both_phases_in_order() {
        let api = Arc::new(MockControl::default());
        let controller = LifecycleController::new(api.clone());

        let session = controller.start_broadcast(&new_request()).unwrap();
        assert_eq!(session.status, BroadcastStatus::Live);
        assert!(session.started_at.is_some());
        assert_eq!(api.calls(), vec!["create", "start", "authorize"]);
    }

    #[test]
    fn test_test_mode_starts_dry_run() {
        let api = Arc::new(MockControl::default());
        let controller = LifecycleController::new(api.clone());

        let request = StartRequest {
            mode: BroadcastMode::Test,
            ..new_request()
        };
        let session = controller.start_broadcast(&request).unwrap();
        assert_eq!(session.status, BroadcastStatus::Testing);
        assert_eq!(api.calls(), vec!["create", "start_test", "authorize"]);
    }

    #[test]
    fn test_authorization_failure_compensates_with_end() {
        let api = Arc::new(MockControl {
            fail_authorize: true,
            ..Default::default()
        });
        let controller = LifecycleController::new(api.clone());

        let result = controller.start_broadcast(&new_request());
        assert!(matches!(result, Err(ControlError::AuthorizationFailure(_))));

        // The just-started session was ended, and no local session exists,
        // so the status never reached Live.
        assert_eq!(api.calls(), vec!["create", "start", "authorize", "end"]);
        assert!(controller.active_session().is_none());
    }

    #[test]
    fn test_reuse_existing_scheduled_session() {
        let api = Arc::new(MockControl::default());
        let controller = LifecycleController::new(api.clone());

        let request = StartRequest {
            session: SessionSelector::Existing { id: 99 },
            mode: BroadcastMode::Live,
        };
        let session = controller.start_broadcast(&request).unwrap();
        assert_eq!(session.id, 99);
        assert_eq!(api.calls(), vec!["get", "start", "authorize"]);
    }

    #[test]
    fn test_reuse_ended_session_is_rejected() {
        let api = Arc::new(MockControl {
            existing_status: Some(BroadcastStatus::Ended),
            ..Default::default()
        });
        let controller = LifecycleController::new(api.clone());

        let request = StartRequest {
            session: SessionSelector::Existing { id: 4 },
            mode: BroadcastMode::Live,
        };
        let result = controller.start_broadcast(&request);
        assert!(matches!(result, Err(ControlError::SessionState(_))));
        assert_eq!(api.calls(), vec!["get"]);
    }

    #[test]
    fn test_second_start_while_active_is_rejected() {
        let api = Arc::new(MockControl::default());
        let controller = LifecycleController::new(api.clone());

        controller.start_broadcast(&new_request()).unwrap();
        let result = controller.start_broadcast(&new_request());
        assert!(matches!(result, Err(ControlError::SessionState(_))));
    }

    #[test]
    fn test_end_deauthorizes_then_ends_then_releases() {
        let api = Arc::new(MockControl::default());
        let controller = LifecycleController::new(api.clone());

        controller.start_broadcast(&new_request()).unwrap();
        let ended = controller.end_broadcast().unwrap().expect("session");

        assert_eq!(ended.status, BroadcastStatus::Ended);
        assert!(ended.ended_at.is_some());
        assert!(controller.active_session().is_none());
        assert_eq!(
            api.calls(),
            vec!["create", "start", "authorize", "deauthorize", "end"]
        );
    }

    #[test]
    fn test_end_without_active_session_is_noop() {
        let api = Arc::new(MockControl::default());
        let controller = LifecycleController::new(api.clone());

        assert!(controller.end_broadcast().unwrap().is_none());
        assert!(api.calls().is_empty());
    }
}
