use socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Socket};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{TransmitError, TransportError};
use crate::events::EventSender;

/// Read timeout so the blocking loop can notice shutdown without traffic
const READ_TIMEOUT: Duration = Duration::from_millis(500);
/// Spacing between reopen attempts after a bus error
const RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Linux SocketCAN transport
///
/// Reads run in a blocking task with a short socket timeout; recovery from
/// bus errors is delegated to the reopen-with-retry helper, the one place
/// in the system that retries automatically. Inbound frames are rendered
/// as raw gateway lines; outbound structured messages arrive pre-split
/// into CAN frames by the codec.
pub struct SocketCanAdapter {
    interface: String,
    events: EventSender,
    read_task: Option<JoinHandle<()>>,
    tx_socket: Option<CanSocket>,
    shutdown: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
    started: bool,
}

impl SocketCanAdapter {
    pub fn new(interface: String, events: EventSender) -> Self {
        Self {
            interface,
            events,
            read_task: None,
            tx_socket: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            done: Arc::new(AtomicBool::new(false)),
            started: false,
        }
    }

    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if self.started {
            return Ok(());
        }
        let rx_socket = open_configured_socket(&self.interface)
            .map_err(|e| unavailable(&self.interface, e))?;
        let tx_socket = open_configured_socket(&self.interface)
            .map_err(|e| unavailable(&self.interface, e))?;
        info!("Opened CAN interface: {}", self.interface);
        self.tx_socket = Some(tx_socket);

        let interface = self.interface.clone();
        let events = self.events.clone();
        let shutdown = Arc::clone(&self.shutdown);
        let done = Arc::clone(&self.done);
        self.read_task = Some(tokio::task::spawn_blocking(move || {
            read_loop(rx_socket, &interface, &events, &shutdown);
            events.disconnected_once(&done);
        }));

        self.started = true;
        self.events.connected();
        Ok(())
    }

    pub async fn disconnect(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.tx_socket = None;
        // The blocking loop exits on its next timeout tick; don't hold
        // teardown hostage to it
        self.read_task = None;
        self.events.disconnected_once(&self.done);
    }

    /// Write pre-split CAN frames onto the bus
    pub fn send_frames(&mut self, id: u32, frames: Vec<Vec<u8>>) -> Result<(), TransmitError> {
        let socket = self.tx_socket.as_ref().ok_or(TransmitError::NotConnected)?;
        let ext = ExtendedId::new(id & 0x1FFF_FFFF)
            .ok_or_else(|| TransmitError::Io(invalid_data("CAN identifier out of range")))?;
        for data in frames {
            let frame = CanFrame::new(ext, &data)
                .ok_or_else(|| TransmitError::Io(invalid_data("CAN frame payload too long")))?;
            socket.write_frame(&frame)?;
        }
        Ok(())
    }
}

fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn unavailable(interface: &str, source: io::Error) -> TransportError {
    TransportError::CanInterfaceUnavailable {
        interface: interface.to_string(),
        source,
    }
}

/// Open a CAN socket with the read timeout applied
pub(crate) fn open_configured_socket(interface: &str) -> Result<CanSocket, io::Error> {
    let socket = CanSocket::open(interface)?;
    socket.set_read_timeout(READ_TIMEOUT)?;
    Ok(socket)
}

/// Reopen a CAN socket, retrying until it succeeds or shutdown is flagged
fn open_with_retry(interface: &str, shutdown: &AtomicBool) -> Option<CanSocket> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return None;
        }
        match open_configured_socket(interface) {
            Ok(socket) => {
                info!("Reconnected to CAN interface: {}", interface);
                return Some(socket);
            }
            Err(e) => {
                warn!("Failed to open CAN interface '{}': {}", interface, e);
                warn!("Retrying in {} seconds...", RETRY_INTERVAL.as_secs());
                // Sleep in short steps so shutdown is honoured promptly
                let mut waited = Duration::ZERO;
                while waited < RETRY_INTERVAL {
                    if shutdown.load(Ordering::SeqCst) {
                        return None;
                    }
                    std::thread::sleep(READ_TIMEOUT);
                    waited += READ_TIMEOUT;
                }
            }
        }
    }
}

fn read_loop(
    mut socket: CanSocket,
    interface: &str,
    events: &EventSender,
    shutdown: &AtomicBool,
) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match socket.read_frame() {
            Ok(frame) => {
                if !frame.is_extended() {
                    continue;
                }
                // NMEA2000 uses 29-bit extended identifiers
                let id = frame.can_id().as_raw() & 0x1FFF_FFFF;
                events.raw_message(n2k_codec::encoders::raw_frame_line(id, frame.data()));
            }
            Err(e) => {
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut {
                    // Timeout tick: just gives shutdown a chance to run
                    continue;
                }
                events.error(TransportError::Io(e));
                warn!("CAN bus connection lost. Attempting to reconnect...");
                match open_with_retry(interface, shutdown) {
                    Some(reopened) => {
                        socket = reopened;
                        info!("Resuming CAN frame processing");
                    }
                    None => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_interface_is_actionable() {
        let (events, _rx) = EventSender::new();
        let mut adapter = SocketCanAdapter::new("nosuchcan0".to_string(), events);
        let err = adapter.connect().await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("nosuchcan0"));
        assert!(text.contains("ip link"));
    }

    #[test]
    fn test_send_without_socket_fails() {
        let (events, _rx) = EventSender::new();
        let mut adapter = SocketCanAdapter::new("vcan0".to_string(), events);
        assert!(matches!(
            adapter.send_frames(0x09F11217, vec![vec![1, 2]]),
            Err(TransmitError::NotConnected)
        ));
    }
}
