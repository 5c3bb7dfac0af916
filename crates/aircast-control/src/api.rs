//! Broadcast control API client.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, instrument};

use aircast_ipc::{BroadcastSession, BroadcastSpec, BroadcastStatus};

use crate::error::ControlError;
use crate::{ControlResult, API_TIMEOUT_SECS};

/// Remote status as reported by the control API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStatus {
    /// Server-observed audio level, 0-100.
    #[serde(default)]
    pub audio_level: Option<u8>,

    /// Current listener count.
    #[serde(default)]
    pub listener_count: u32,
}

/// Operations the external broadcast control API offers.
///
/// A trait seam so the lifecycle controller and the engine are testable
/// against an in-memory implementation.
pub trait BroadcastControl: Send + Sync {
    /// Create a new broadcast session record.
    fn create(&self, spec: &BroadcastSpec) -> ControlResult<BroadcastSession>;

    /// Fetch an existing session record.
    fn get(&self, id: u64) -> ControlResult<BroadcastSession>;

    /// Mark a session started (publicly live).
    fn start(&self, id: u64) -> ControlResult<()>;

    /// Mark a session started in dry-run mode.
    fn start_test(&self, id: u64) -> ControlResult<()>;

    /// Mark a session ended.
    fn end(&self, id: u64) -> ControlResult<()>;

    /// Authorize this client to publish to the ingest endpoint.
    fn authorize_stream(&self) -> ControlResult<()>;

    /// Revoke this client's publish authorization.
    fn deauthorize_stream(&self) -> ControlResult<()>;

    /// Fetch the current stream status.
    fn get_status(&self) -> ControlResult<RemoteStatus>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionDto {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl SessionDto {
    fn into_session(self) -> BroadcastSession {
        let status = match self.status.as_deref() {
            Some("LIVE") => BroadcastStatus::Live,
            Some("TESTING") => BroadcastStatus::Testing,
            Some("ENDED") => BroadcastStatus::Ended,
            _ => BroadcastStatus::Scheduled,
        };

        BroadcastSession {
            id: self.id,
            title: self.title.unwrap_or_default(),
            status,
            started_at: None,
            ended_at: None,
        }
    }
}

/// REST implementation of [`BroadcastControl`].
pub struct HttpBroadcastControl {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpBroadcastControl {
    /// Create a client against the given API base URL.
    pub fn new(base_url: &str) -> ControlResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn check(response: reqwest::blocking::Response) -> ControlResult<reqwest::blocking::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().unwrap_or_default();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            Err(ControlError::AuthorizationFailure(message))
        } else {
            Err(ControlError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    fn post_empty(&self, path: &str) -> ControlResult<()> {
        let response = self.client.post(self.url(path)).send()?;
        Self::check(response)?;
        Ok(())
    }
}

impl BroadcastControl for HttpBroadcastControl {
    #[instrument(name = "control_create", skip(self, spec))]
    fn create(&self, spec: &BroadcastSpec) -> ControlResult<BroadcastSession> {
        let response = self
            .client
            .post(self.url("/api/broadcasts"))
            .json(spec)
            .send()?;
        let dto: SessionDto = Self::check(response)?
            .json()
            .map_err(|e| ControlError::InvalidResponse(e.to_string()))?;

        debug!(id = dto.id, "Created broadcast session");
        let mut session = dto.into_session();
        if session.title.is_empty() {
            session.title = spec.title.clone();
        }
        Ok(session)
    }

    fn get(&self, id: u64) -> ControlResult<BroadcastSession> {
        let response = self
            .client
            .get(self.url(&format!("/api/broadcasts/{id}")))
            .send()?;
        let dto: SessionDto = Self::check(response)?
            .json()
            .map_err(|e| ControlError::InvalidResponse(e.to_string()))?;
        Ok(dto.into_session())
    }

    fn start(&self, id: u64) -> ControlResult<()> {
        self.post_empty(&format!("/api/broadcasts/{id}/start"))
    }

    fn start_test(&self, id: u64) -> ControlResult<()> {
        self.post_empty(&format!("/api/broadcasts/{id}/start-test"))
    }

    fn end(&self, id: u64) -> ControlResult<()> {
        self.post_empty(&format!("/api/broadcasts/{id}/end"))
    }

    fn authorize_stream(&self) -> ControlResult<()> {
        self.post_empty("/api/stream/authorize")
    }

    fn deauthorize_stream(&self) -> ControlResult<()> {
        self.post_empty("/api/stream/deauthorize")
    }

    fn get_status(&self) -> ControlResult<RemoteStatus> {
        let response = self.client.get(self.url("/api/stream/status")).send()?;
        Self::check(response)?
            .json()
            .map_err(|e| ControlError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_dto_status_mapping() {
        let dto = SessionDto {
            id: 3,
            title: Some("Drive Time".to_string()),
            status: Some("LIVE".to_string()),
        };
        let session = dto.into_session();
        assert_eq!(session.status, BroadcastStatus::Live);
        assert_eq!(session.title, "Drive Time");
    }

    #[test]
    fn test_session_dto_defaults_to_scheduled() {
        let dto = SessionDto {
            id: 3,
            title: None,
            status: None,
        };
        assert_eq!(dto.into_session().status, BroadcastStatus::Scheduled);
    }

    #[test]
    fn test_remote_status_parses_camel_case() {
        let status: RemoteStatus =
            serde_json::from_str(r#"{"audioLevel":12,"listenerCount":40}"#).unwrap();
        assert_eq!(status.audio_level, Some(12));
        assert_eq!(status.listener_count, 40);
    }
}
