use n2k_codec::OutboundMessage;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::adapters::Transport;
use crate::error::{ActivateError, TransmitError};
use crate::events::{ConnectionEvent, ConnectionState, EventSender};
use crate::outbound::{OutboundFormatRouter, RoutedMessage};
use crate::profile::{ConnectionProfile, OutboundRoute};

/// How a `send()` call was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Encoded bytes went out on the active transport
    Transmitted,
    /// No physical transmit path; the message reaches non-transport
    /// listeners only
    BroadcastOnly,
}

struct ActiveTransport {
    profile: ConnectionProfile,
    transport: Transport,
    route: OutboundRoute,
}

/// Owns the single active transport and its lifecycle
///
/// At most one adapter is ever in a non-disconnected state: activating a
/// new profile first runs the full teardown of the current one, so the old
/// transport's `Disconnected` is always observed before any event from the
/// new transport. Errors are informational and never force a transition;
/// an adapter that dies emits its own `Disconnected`.
pub struct ConnectionManager {
    events: EventSender,
    active: Option<ActiveTransport>,
    router: OutboundFormatRouter,
}

impl ConnectionManager {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events, rx) = EventSender::new();
        (
            Self {
                events,
                active: None,
                router: OutboundFormatRouter::new(),
            },
            rx,
        )
    }

    pub fn state(&self) -> ConnectionState {
        self.events.state()
    }

    pub fn active_profile(&self) -> Option<&ConnectionProfile> {
        self.active.as_ref().map(|a| &a.profile)
    }

    /// Make `profile` the active transport
    ///
    /// A different live profile is fully torn down first; re-activating
    /// the already-active profile is a no-op. Validation runs before any
    /// resource is acquired, so a rejected profile changes nothing.
    pub async fn activate(&mut self, profile: ConnectionProfile) -> Result<(), ActivateError> {
        if let Some(active) = &self.active {
            if active.profile.id == profile.id
                && matches!(
                    self.state(),
                    ConnectionState::Connected | ConnectionState::Connecting
                )
            {
                debug!("profile '{}' is already active", profile.id);
                return Ok(());
            }
        }

        profile.validate()?;
        self.deactivate().await;

        info!("Activating profile '{}' ({})", profile.id, profile.name);
        self.events.set_state(ConnectionState::Connecting);

        let mut transport = Transport::from_profile(&profile, self.events.clone());
        match transport.connect().await {
            Ok(()) => {
                self.active = Some(ActiveTransport {
                    route: OutboundRoute::resolve(&profile.transport),
                    profile,
                    transport,
                });
                Ok(())
            }
            Err(e) => {
                self.events.set_state(ConnectionState::Disconnected);
                Err(ActivateError::Transport(e))
            }
        }
    }

    /// Tear down the active transport, releasing all its resources
    pub async fn deactivate(&mut self) {
        if let Some(mut active) = self.active.take() {
            info!("Deactivating profile '{}'", active.profile.id);
            self.events.set_state(ConnectionState::Disconnecting);
            active.transport.disconnect().await;
        }
        self.events.set_state(ConnectionState::Disconnected);
    }

    /// Transmit a structured message on the active transport
    ///
    /// With no transport activated the message is broadcast-only and the
    /// call still succeeds. A transport that has dropped out from under a
    /// live session fails the call with a transmit error until the next
    /// activation.
    pub async fn send(&mut self, msg: OutboundMessage) -> Result<SendOutcome, TransmitError> {
        let Some(active) = &mut self.active else {
            return Ok(SendOutcome::BroadcastOnly);
        };
        if self.events.state() != ConnectionState::Connected {
            return Err(TransmitError::NotConnected);
        }

        match self.router.route(msg, active.route)? {
            RoutedMessage::BroadcastOnly(_) => Ok(SendOutcome::BroadcastOnly),
            routed => {
                active.transport.transmit(routed).await?;
                Ok(SendOutcome::Transmitted)
            }
        }
    }
}
