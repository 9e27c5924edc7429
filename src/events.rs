use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::TransportError;

/// Connection lifecycle and session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Events published to downstream consumers
///
/// One tagged stream per manager: lifecycle, inbound traffic and non-fatal
/// errors all travel the same channel so arrival order is preserved
/// end-to-end.
#[derive(Debug)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    /// One decoded protocol line, in arrival order
    RawMessage(String),
    /// A non-NMEA status update translated into a placeholder line
    SyntheticMessage(String),
    /// Non-fatal; the session keeps operating
    Error(TransportError),
}

/// Emitter handle shared with the active adapter's tasks
///
/// Lifecycle emissions also update the manager-owned state cell, so state
/// transitions happen exactly where the corresponding event is published.
/// Emission is fire-and-forget: a dropped receiver never blocks a transport.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<ConnectionEvent>,
    state: Arc<Mutex<ConnectionState>>,
}

impl EventSender {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = Self {
            tx,
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
        };
        (sender, rx)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn connected(&self) {
        self.set_state(ConnectionState::Connected);
        self.emit(ConnectionEvent::Connected);
    }

    /// Emit `Disconnected` at most once per session
    ///
    /// Both the read task (on natural stream end) and `disconnect()` (on
    /// operator teardown) reach this; whichever arrives first wins the
    /// guard and the other is a no-op.
    pub fn disconnected_once(&self, guard: &AtomicBool) {
        if !guard.swap(true, Ordering::SeqCst) {
            self.set_state(ConnectionState::Disconnected);
            self.emit(ConnectionEvent::Disconnected);
        }
    }

    pub fn raw_message(&self, line: String) {
        self.emit(ConnectionEvent::RawMessage(line));
    }

    pub fn synthetic_message(&self, line: String) {
        self.emit(ConnectionEvent::SyntheticMessage(line));
    }

    pub fn error(&self, err: TransportError) {
        self.emit(ConnectionEvent::Error(err));
    }

    fn emit(&self, event: ConnectionEvent) {
        if self.tx.send(event).is_err() {
            debug!("event receiver dropped, discarding event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emission_preserves_order() {
        let (events, mut rx) = EventSender::new();
        events.connected();
        events.raw_message("line one".to_string());
        events.raw_message("line two".to_string());

        assert!(matches!(rx.try_recv().unwrap(), ConnectionEvent::Connected));
        assert!(
            matches!(rx.try_recv().unwrap(), ConnectionEvent::RawMessage(l) if l == "line one")
        );
        assert!(
            matches!(rx.try_recv().unwrap(), ConnectionEvent::RawMessage(l) if l == "line two")
        );
    }

    #[test]
    fn test_connected_updates_state() {
        let (events, _rx) = EventSender::new();
        assert_eq!(events.state(), ConnectionState::Disconnected);
        events.connected();
        assert_eq!(events.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_disconnected_fires_once() {
        let (events, mut rx) = EventSender::new();
        events.connected();
        let guard = AtomicBool::new(false);
        events.disconnected_once(&guard);
        events.disconnected_once(&guard);

        assert!(matches!(rx.try_recv().unwrap(), ConnectionEvent::Connected));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ConnectionEvent::Disconnected
        ));
        assert!(rx.try_recv().is_err());
        assert_eq!(events.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_emission_survives_dropped_receiver() {
        let (events, rx) = EventSender::new();
        drop(rx);
        events.raw_message("nobody listening".to_string());
    }
}
