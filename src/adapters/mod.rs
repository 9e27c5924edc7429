pub mod file;
pub mod network;
pub mod serial;
pub mod signalk;
pub mod socketcan;

use crate::error::{TransmitError, TransportError};
use crate::events::EventSender;
use crate::outbound::RoutedMessage;
use crate::profile::{ConnectionProfile, TransportKind};

pub use file::FileReplayAdapter;
pub use network::NetworkAdapter;
pub use serial::SerialAdapter;
pub use signalk::SignalKAdapter;
pub use socketcan::SocketCanAdapter;

/// The closed set of transport adapters
///
/// One variant per transport kind, resolved once from the active profile.
/// All variants share the same contract: `connect` is idempotent-safe,
/// `disconnect` releases every owned resource on any exit path, and
/// `transmit` fails with a per-call error when no channel is open.
pub enum Transport {
    Serial(SerialAdapter),
    Network(NetworkAdapter),
    SocketCan(SocketCanAdapter),
    SignalK(SignalKAdapter),
    FileReplay(FileReplayAdapter),
}

impl Transport {
    pub fn from_profile(profile: &ConnectionProfile, events: EventSender) -> Self {
        match &profile.transport {
            TransportKind::Serial {
                port,
                baud_rate,
                device,
            } => Transport::Serial(SerialAdapter::new(
                port.clone(),
                *baud_rate,
                *device,
                events,
            )),
            TransportKind::Network {
                host,
                port,
                protocol,
                device: _,
            } => Transport::Network(NetworkAdapter::new(host.clone(), *port, *protocol, events)),
            TransportKind::Socketcan { interface } => {
                Transport::SocketCan(SocketCanAdapter::new(interface.clone(), events))
            }
            TransportKind::Signalk { url, credentials } => Transport::SignalK(SignalKAdapter::new(
                url.clone(),
                credentials.clone(),
                events,
            )),
            TransportKind::File {
                path,
                loop_playback,
                speed,
            } => Transport::FileReplay(FileReplayAdapter::new(
                path.clone(),
                *loop_playback,
                *speed,
                events,
            )),
        }
    }

    pub async fn connect(&mut self) -> Result<(), TransportError> {
        match self {
            Transport::Serial(adapter) => adapter.connect().await,
            Transport::Network(adapter) => adapter.connect().await,
            Transport::SocketCan(adapter) => adapter.connect().await,
            Transport::SignalK(adapter) => adapter.connect().await,
            Transport::FileReplay(adapter) => adapter.connect().await,
        }
    }

    pub async fn disconnect(&mut self) {
        match self {
            Transport::Serial(adapter) => adapter.disconnect().await,
            Transport::Network(adapter) => adapter.disconnect().await,
            Transport::SocketCan(adapter) => adapter.disconnect().await,
            Transport::SignalK(adapter) => adapter.disconnect().await,
            Transport::FileReplay(adapter) => adapter.disconnect().await,
        }
    }

    /// Hand a routed message to the transport it was encoded for
    pub async fn transmit(&mut self, routed: RoutedMessage) -> Result<(), TransmitError> {
        match (self, routed) {
            (Transport::Serial(adapter), RoutedMessage::Line(line)) => {
                adapter.send_bytes(line.as_bytes()).await
            }
            (Transport::Serial(adapter), RoutedMessage::Structured(msg)) => {
                adapter.send_structured(msg)
            }
            (Transport::Network(adapter), RoutedMessage::Line(line)) => {
                adapter.send_bytes(line.as_bytes()).await
            }
            (Transport::SocketCan(adapter), RoutedMessage::CanFrames(id, frames)) => {
                adapter.send_frames(id, frames)
            }
            (Transport::SignalK(adapter), RoutedMessage::Json(body)) => adapter.send_text(body),
            // Routing is resolved from the active profile, so a mismatched
            // pairing means there is no usable channel
            _ => Err(TransmitError::NotConnected),
        }
    }
}
