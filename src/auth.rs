use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

/// How long a login request may remain unanswered
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Requested,
    Authenticated,
    Failed,
}

struct PendingRequest {
    request_id: String,
    resolve: oneshot::Sender<bool>,
}

/// SignalK login/logout handshake state
///
/// Requests and responses are correlated strictly by request id: a stale
/// response can never settle a newer request, and a response arriving after
/// the timeout has cleared the pending state is ignored. The pending future
/// is single-resolution by construction (the sender is taken exactly once).
/// This session is the only owner of the bearer token.
pub struct AuthenticationSession {
    state: AuthState,
    token: Option<String>,
    pending: Option<PendingRequest>,
}

impl AuthenticationSession {
    pub fn new() -> Self {
        Self {
            state: AuthState::Unauthenticated,
            token: None,
            pending: None,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Build a login request and register it as pending
    ///
    /// Returns the request id, the request body to transmit, and the
    /// receiver that resolves once the request settles. A new login
    /// supersedes any outstanding one, which resolves false.
    pub fn begin_login(
        &mut self,
        username: &str,
        password: &str,
    ) -> (String, String, oneshot::Receiver<bool>) {
        if let Some(stale) = self.pending.take() {
            let _ = stale.resolve.send(false);
        }

        let request_id = format!("auth-{}", Uuid::new_v4());
        let body = json!({
            "requestId": request_id,
            "login": {
                "username": username,
                "password": password,
            }
        })
        .to_string();

        let (tx, rx) = oneshot::channel();
        self.pending = Some(PendingRequest {
            request_id: request_id.clone(),
            resolve: tx,
        });
        self.state = AuthState::Requested;
        (request_id, body, rx)
    }

    /// Handle a login response, matching on request id
    pub fn handle_response(&mut self, response: &Value) {
        let Some(id) = response.get("requestId").and_then(Value::as_str) else {
            return;
        };
        match &self.pending {
            Some(pending) if pending.request_id == id => {}
            _ => {
                debug!("ignoring uncorrelated auth response for {}", id);
                return;
            }
        }
        let pending = self.pending.take().expect("pending checked above");

        let status = response.get("statusCode").and_then(Value::as_u64);
        let token = response
            .pointer("/login/token")
            .and_then(Value::as_str)
            .map(str::to_string);

        if status == Some(200) && token.is_some() {
            self.token = token;
            self.state = AuthState::Authenticated;
            let _ = pending.resolve.send(true);
        } else {
            warn!("authentication rejected (status {:?})", status);
            self.state = AuthState::Failed;
            let _ = pending.resolve.send(false);
        }
    }

    /// Expire an unanswered request after its timeout window
    pub fn expire(&mut self, request_id: &str) {
        if matches!(&self.pending, Some(p) if p.request_id == request_id) {
            let pending = self.pending.take().expect("pending checked above");
            self.state = AuthState::Failed;
            let _ = pending.resolve.send(false);
        }
    }

    /// The underlying socket closed: fail any outstanding request now
    /// rather than waiting for its timeout, and drop the token
    pub fn socket_closed(&mut self) {
        if let Some(pending) = self.pending.take() {
            let _ = pending.resolve.send(false);
        }
        self.token = None;
        self.state = AuthState::Unauthenticated;
    }

    /// Build a logout request and clear the local token
    ///
    /// The token is cleared unconditionally before any server response:
    /// local security state never depends on a logout confirmation.
    pub fn begin_logout(&mut self) -> String {
        let request_id = format!("logout-{}", Uuid::new_v4());
        let body = json!({
            "requestId": request_id,
            "logout": {
                "token": self.token,
            }
        })
        .to_string();
        self.token = None;
        self.state = AuthState::Unauthenticated;
        body
    }
}

impl Default for AuthenticationSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a login over the session's outbound text channel
///
/// Resolves true only on a confirmed Authenticated transition; false on
/// rejection, timeout, or socket loss. A response arriving after the
/// timeout has expired the request has no observable effect.
pub async fn authenticate(
    session: &Arc<Mutex<AuthenticationSession>>,
    outbound: &mpsc::UnboundedSender<String>,
    username: &str,
    password: &str,
) -> bool {
    let (request_id, body, rx) = session
        .lock()
        .unwrap()
        .begin_login(username, password);

    if outbound.send(body).is_err() {
        session.lock().unwrap().socket_closed();
        return false;
    }

    match tokio::time::timeout(AUTH_TIMEOUT, rx).await {
        Ok(Ok(result)) => result,
        // Sender dropped: session superseded or torn down
        Ok(Err(_)) => false,
        Err(_) => {
            session.lock().unwrap().expire(&request_id);
            false
        }
    }
}
