use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{self, AuthenticationSession};
use crate::error::{TransmitError, TransportError};
use crate::events::EventSender;
use crate::profile::Credentials;

/// Authenticated SignalK WebSocket session
///
/// Connects to the server's stream endpoint and, when credentials are
/// configured, runs the login handshake after the socket opens. Inbound
/// frames route three ways: auth responses to the authentication session,
/// logout responses logged and dropped, raw-output events published as
/// protocol lines. The server hello becomes a synthetic placeholder line.
/// Authentication failure degrades to unauthenticated operation; there is
/// no automatic reconnect.
pub struct SignalKAdapter {
    url: String,
    credentials: Option<Credentials>,
    events: EventSender,
    session: Arc<Mutex<AuthenticationSession>>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    read_task: Option<JoinHandle<()>>,
    write_task: Option<JoinHandle<()>>,
    done: Arc<AtomicBool>,
    started: bool,
}

impl SignalKAdapter {
    pub fn new(url: String, credentials: Option<Credentials>, events: EventSender) -> Self {
        Self {
            url,
            credentials,
            events,
            session: Arc::new(Mutex::new(AuthenticationSession::new())),
            outbound: None,
            read_task: None,
            write_task: None,
            done: Arc::new(AtomicBool::new(false)),
            started: false,
        }
    }

    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if self.started {
            return Ok(());
        }
        let stream_url = derive_stream_url(&self.url)?;
        let (socket, _) = connect_async(stream_url.as_str()).await.map_err(|e| {
            TransportError::WebSocket {
                url: stream_url.to_string(),
                reason: e.to_string(),
            }
        })?;
        info!("Connected to SignalK stream at {}", stream_url);

        let (mut sink, mut stream) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        self.write_task = Some(tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    log::warn!("SignalK write failed: {}", e);
                    break;
                }
            }
        }));

        let events = self.events.clone();
        let session = Arc::clone(&self.session);
        let done = Arc::clone(&self.done);
        let url_for_log = stream_url.to_string();
        self.read_task = Some(tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => route_incoming(&text, &events, &session),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        events.error(TransportError::WebSocket {
                            url: url_for_log.clone(),
                            reason: e.to_string(),
                        });
                        break;
                    }
                }
            }
            // Socket gone: any pending login resolves false right away
            session.lock().unwrap().socket_closed();
            events.disconnected_once(&done);
        }));

        self.started = true;
        self.events.connected();

        if let Some(credentials) = self.credentials.clone() {
            let authenticated = auth::authenticate(
                &self.session,
                &tx,
                &credentials.username,
                &credentials.password,
            )
            .await;
            if !authenticated {
                let state = self.session.lock().unwrap().state();
                warn!(
                    "SignalK authentication failed ({:?}), continuing unauthenticated",
                    state
                );
            }
        }
        self.outbound = Some(tx);
        Ok(())
    }

    pub async fn disconnect(&mut self) {
        // Explicit teardown: log out first, clearing the token locally
        // whether or not the server ever answers
        {
            let mut session = self.session.lock().unwrap();
            if session.token().is_some() {
                let body = session.begin_logout();
                if let Some(outbound) = &self.outbound {
                    let _ = outbound.send(body);
                }
            }
        }
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        if let Some(task) = self.write_task.take() {
            task.abort();
        }
        self.outbound = None;
        self.session.lock().unwrap().socket_closed();
        self.events.disconnected_once(&self.done);
    }

    /// Transmit a JSON envelope as a text frame
    pub fn send_text(&mut self, body: String) -> Result<(), TransmitError> {
        let outbound = self.outbound.as_ref().ok_or(TransmitError::NotConnected)?;
        outbound.send(body).map_err(|_| TransmitError::NotConnected)
    }
}

/// Derive the stream endpoint from the configured server URL
///
/// Accepts http(s) or ws(s) URLs; a bare server root gets the standard
/// `/signalk/v1/stream` path and a subscription query appended.
fn derive_stream_url(raw: &str) -> Result<Url, TransportError> {
    let mut url = Url::parse(raw).map_err(|e| TransportError::WebSocket {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(TransportError::WebSocket {
                url: raw.to_string(),
                reason: format!("unsupported scheme '{}'", other),
            });
        }
    };
    url.set_scheme(scheme).map_err(|_| TransportError::WebSocket {
        url: raw.to_string(),
        reason: "unsupported scheme".to_string(),
    })?;

    if url.path() == "/" || url.path().is_empty() {
        url.set_path("/signalk/v1/stream");
    }
    if url.query().is_none() {
        url.set_query(Some("subscribe=none&events=canboatjs:rawoutput"));
    }
    Ok(url)
}

/// Route one inbound text frame to its consumer
fn route_incoming(text: &str, events: &EventSender, session: &Arc<Mutex<AuthenticationSession>>) {
    // Malformed frames are dropped per line, never fatal
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        debug!("dropping unparseable SignalK frame");
        return;
    };

    if let Some(request_id) = value.get("requestId").and_then(Value::as_str) {
        if request_id.starts_with("auth-") {
            session.lock().unwrap().handle_response(&value);
            return;
        }
        if request_id.starts_with("logout-") {
            debug!("logout acknowledged by server");
            return;
        }
    }

    if let Some(data) = value.get("data").and_then(Value::as_str) {
        if value.get("event").is_some() {
            events.raw_message(data.to_string());
            return;
        }
    }

    // Server hello carries the instance name and version
    if let (Some(name), Some(version)) = (
        value.get("name").and_then(Value::as_str),
        value.get("version").and_then(Value::as_str),
    ) {
        events.synthetic_message(format!("$PSKSRV,{},{}", name, version));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ConnectionEvent;
    use serde_json::json;

    #[test]
    fn test_stream_url_from_http_root() {
        let url = derive_stream_url("http://localhost:3000").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:3000/signalk/v1/stream?subscribe=none&events=canboatjs:rawoutput"
        );
    }

    #[test]
    fn test_stream_url_preserves_explicit_path() {
        let url = derive_stream_url("wss://boat.local/signalk/v1/stream?subscribe=all").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://boat.local/signalk/v1/stream?subscribe=all"
        );
    }

    #[test]
    fn test_stream_url_rejects_unknown_scheme() {
        assert!(derive_stream_url("ftp://boat.local").is_err());
    }

    #[test]
    fn test_raw_output_event_routing() {
        let (events, mut rx) = EventSender::new();
        let session = Arc::new(Mutex::new(AuthenticationSession::new()));
        route_incoming(
            &json!({"event": "canboatjs:rawoutput", "data": "09F11217 00 11"}).to_string(),
            &events,
            &session,
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            ConnectionEvent::RawMessage(l) if l == "09F11217 00 11"
        ));
    }

    #[test]
    fn test_hello_becomes_synthetic_line() {
        let (events, mut rx) = EventSender::new();
        let session = Arc::new(Mutex::new(AuthenticationSession::new()));
        route_incoming(
            &json!({"name": "signalk-server", "version": "2.0.0"}).to_string(),
            &events,
            &session,
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            ConnectionEvent::SyntheticMessage(l) if l == "$PSKSRV,signalk-server,2.0.0"
        ));
    }

    #[test]
    fn test_auth_response_reaches_session() {
        let (events, mut rx) = EventSender::new();
        let session = Arc::new(Mutex::new(AuthenticationSession::new()));
        let (request_id, _body, mut auth_rx) =
            session.lock().unwrap().begin_login("pilot", "secret");

        route_incoming(
            &json!({
                "requestId": request_id,
                "statusCode": 200,
                "login": {"token": "tok"}
            })
            .to_string(),
            &events,
            &session,
        );

        assert_eq!(auth_rx.try_recv().unwrap(), true);
        assert_eq!(session.lock().unwrap().token(), Some("tok"));
        // Auth traffic never surfaces as protocol lines
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_logout_response_is_dropped() {
        let (events, mut rx) = EventSender::new();
        let session = Arc::new(Mutex::new(AuthenticationSession::new()));
        route_incoming(
            &json!({"requestId": "logout-123", "statusCode": 200}).to_string(),
            &events,
            &session,
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_malformed_frame_is_dropped() {
        let (events, mut rx) = EventSender::new();
        let session = Arc::new(Mutex::new(AuthenticationSession::new()));
        route_incoming("not json at all", &events, &session);
        assert!(rx.try_recv().is_err());
    }
}
