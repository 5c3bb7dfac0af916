//! Ingest websocket plumbing.
//!
//! URL resolution happens once, before the supervisor starts: http(s)
//! schemes map to their websocket counterparts and a secure console origin
//! forces the upgrade to wss. Inbound traffic on the socket doubles as the
//! push status subscription; anything that is not a well-formed status
//! message is ignored.

use futures_util::SinkExt;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use crate::error::TransportError;
use crate::TransportResult;

/// The connected ingest socket type.
pub type IngestSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Resolve the ingest URL, upgrading the scheme to match the console's own
/// transport security.
pub fn resolve_ingest_url(raw: &str, secure: bool) -> TransportResult<Url> {
    let mut url = Url::parse(raw).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;

    let scheme = match url.scheme() {
        "ws" | "http" => {
            if secure {
                "wss"
            } else {
                "ws"
            }
        }
        "wss" | "https" => "wss",
        other => {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme: {other}"
            )))
        }
    };

    url.set_scheme(scheme)
        .map_err(|_| TransportError::InvalidUrl(format!("cannot set scheme {scheme}")))?;

    Ok(url)
}

/// Open the ingest socket.
pub async fn connect_ingest(url: &Url) -> TransportResult<IngestSocket> {
    debug!(url = %url, "Connecting ingest socket");
    let (socket, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
    Ok(socket)
}

/// Send the near-zero-length probe frame that confirms writability.
pub async fn send_probe(socket: &mut IngestSocket) -> TransportResult<()> {
    socket
        .send(Message::Binary(Vec::new()))
        .await
        .map_err(|e| TransportError::Send(e.to_string()))
}

/// A push status update from the ingest server.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    /// Message discriminator; only `STREAM_STATUS` is meaningful.
    #[serde(rename = "type")]
    pub kind: String,

    /// Server-observed audio level, 0-100.
    #[serde(default)]
    pub audio_level: Option<u8>,

    /// Current listener count.
    #[serde(default)]
    pub listener_count: Option<u32>,
}

impl StatusMessage {
    /// Parse an inbound text message, tolerating unrelated traffic.
    ///
    /// Returns `None` for non-JSON payloads and for JSON that is not a
    /// stream-status message.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str::<Self>(text)
            .ok()
            .filter(|m| m.kind == "STREAM_STATUS")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_upgrades_ws_on_secure_origin() {
        let url = resolve_ingest_url("ws://radio.example.edu/ws/live", true).unwrap();
        assert_eq!(url.scheme(), "wss");
    }

    #[test]
    fn test_resolve_keeps_ws_on_plain_origin() {
        let url = resolve_ingest_url("ws://localhost:8080/ws/live", false).unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.path(), "/ws/live");
    }

    #[test]
    fn test_resolve_maps_http_schemes() {
        let url = resolve_ingest_url("https://radio.example.edu/ws/live", false).unwrap();
        assert_eq!(url.scheme(), "wss");
    }

    #[test]
    fn test_resolve_rejects_unknown_scheme() {
        assert!(matches!(
            resolve_ingest_url("ftp://radio.example.edu/live", true),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_status_message_parse() {
        let msg = StatusMessage::parse(
            r#"{"type":"STREAM_STATUS","audioLevel":42,"listenerCount":17,"isLive":true}"#,
        )
        .expect("status message");
        assert_eq!(msg.audio_level, Some(42));
        assert_eq!(msg.listener_count, Some(17));
    }

    #[test]
    fn test_status_message_ignores_noise() {
        assert!(StatusMessage::parse("not json at all").is_none());
        assert!(StatusMessage::parse(r#"{"type":"CHAT","text":"hi"}"#).is_none());
        assert!(StatusMessage::parse(r#"{"listenerCount":3}"#).is_none());
    }

    #[test]
    fn test_status_message_tolerates_missing_fields() {
        let msg = StatusMessage::parse(r#"{"type":"STREAM_STATUS"}"#).expect("status message");
        assert_eq!(msg.audio_level, None);
        assert_eq!(msg.listener_count, None);
    }
}
