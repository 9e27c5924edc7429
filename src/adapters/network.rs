use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpStream, UdpSocket};
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::{TransmitError, TransportError};
use crate::events::EventSender;
use crate::line_reader::{Delimiter, LineReader};
use crate::profile::NetworkProtocol;

/// TCP or UDP network gateway transport
///
/// TCP opens a stream to the gateway; UDP binds the local port and treats
/// each datagram as a chunk of the same line stream. Inbound data is split
/// on `\n` either way, with empty lines dropped. There is no automatic
/// retry: a lost socket surfaces as an error followed by disconnection.
pub struct NetworkAdapter {
    host: String,
    port: u16,
    protocol: NetworkProtocol,
    events: EventSender,
    read_task: Option<JoinHandle<()>>,
    tcp_writer: Option<OwnedWriteHalf>,
    udp: Option<Arc<UdpSocket>>,
    done: Arc<AtomicBool>,
    started: bool,
}

impl NetworkAdapter {
    pub fn new(host: String, port: u16, protocol: NetworkProtocol, events: EventSender) -> Self {
        Self {
            host,
            port,
            protocol,
            events,
            read_task: None,
            tcp_writer: None,
            udp: None,
            done: Arc::new(AtomicBool::new(false)),
            started: false,
        }
    }

    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if self.started {
            return Ok(());
        }
        match self.protocol {
            NetworkProtocol::Tcp => self.connect_tcp().await?,
            NetworkProtocol::Udp => self.connect_udp().await?,
        }
        self.started = true;
        self.events.connected();
        Ok(())
    }

    async fn connect_tcp(&mut self) -> Result<(), TransportError> {
        let addr = format!("{}:{}", self.host, self.port);
        let stream = TcpStream::connect(addr.as_str())
            .await
            .map_err(|e| TransportError::Connect {
                addr: addr.clone(),
                source: e,
            })?;
        info!("Connected to {}", addr);

        let (mut read_half, write_half) = stream.into_split();
        self.tcp_writer = Some(write_half);

        let events = self.events.clone();
        let done = Arc::clone(&self.done);
        self.read_task = Some(tokio::spawn(async move {
            let mut reader = LineReader::new(Delimiter::Lf);
            let mut buf = [0u8; 2048];
            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        for line in reader.push(&buf[..n]) {
                            events.raw_message(line);
                        }
                    }
                    Err(e) => {
                        events.error(TransportError::Io(e));
                        break;
                    }
                }
            }
            events.disconnected_once(&done);
        }));
        Ok(())
    }

    async fn connect_udp(&mut self) -> Result<(), TransportError> {
        let socket = UdpSocket::bind(("0.0.0.0", self.port))
            .await
            .map_err(|e| TransportError::UdpBind {
                port: self.port,
                source: e,
            })?;
        info!("Listening for UDP datagrams on port {}", self.port);

        let socket = Arc::new(socket);
        self.udp = Some(Arc::clone(&socket));

        let events = self.events.clone();
        let done = Arc::clone(&self.done);
        self.read_task = Some(tokio::spawn(async move {
            let mut reader = LineReader::new(Delimiter::Lf);
            let mut buf = [0u8; 65536];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((n, _peer)) => {
                        for line in reader.push(&buf[..n]) {
                            events.raw_message(line);
                        }
                    }
                    Err(e) => {
                        events.error(TransportError::Io(e));
                        break;
                    }
                }
            }
            events.disconnected_once(&done);
        }));
        Ok(())
    }

    pub async fn disconnect(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        self.tcp_writer = None;
        self.udp = None;
        self.events.disconnected_once(&self.done);
    }

    pub async fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), TransmitError> {
        match self.protocol {
            NetworkProtocol::Tcp => {
                let writer = self.tcp_writer.as_mut().ok_or(TransmitError::NotConnected)?;
                writer.write_all(bytes).await?;
                Ok(())
            }
            NetworkProtocol::Udp => {
                let socket = self.udp.as_ref().ok_or(TransmitError::NotConnected)?;
                socket
                    .send_to(bytes, (self.host.as_str(), self.port))
                    .await?;
                Ok(())
            }
        }
    }

    #[cfg(test)]
    fn udp_local_addr(&self) -> Option<std::net::SocketAddr> {
        self.udp.as_ref().and_then(|s| s.local_addr().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ConnectionEvent;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn next_event(
        rx: &mut tokio::sync::mpsc::UnboundedReceiver<ConnectionEvent>,
    ) -> ConnectionEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_tcp_lines_split_across_reads() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (events, mut rx) = EventSender::new();
        let mut adapter = NetworkAdapter::new(
            addr.ip().to_string(),
            addr.port(),
            NetworkProtocol::Tcp,
            events,
        );
        adapter.connect().await.unwrap();

        let (mut server, _) = listener.accept().await.unwrap();
        assert!(matches!(next_event(&mut rx).await, ConnectionEvent::Connected));

        server.write_all(b"09F11217 00 11\nsecond li").await.unwrap();
        server.write_all(b"ne\n\n").await.unwrap();

        assert!(matches!(
            next_event(&mut rx).await,
            ConnectionEvent::RawMessage(l) if l == "09F11217 00 11"
        ));
        assert!(matches!(
            next_event(&mut rx).await,
            ConnectionEvent::RawMessage(l) if l == "second line"
        ));

        drop(server);
        assert!(matches!(
            next_event(&mut rx).await,
            ConnectionEvent::Disconnected
        ));
    }

    #[tokio::test]
    async fn test_tcp_connect_refused_fails() {
        let (events, _rx) = EventSender::new();
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut adapter =
            NetworkAdapter::new("127.0.0.1".to_string(), port, NetworkProtocol::Tcp, events);
        assert!(matches!(
            adapter.connect().await,
            Err(TransportError::Connect { .. })
        ));
    }

    #[tokio::test]
    async fn test_udp_datagrams() {
        let (events, mut rx) = EventSender::new();
        let mut adapter =
            NetworkAdapter::new("127.0.0.1".to_string(), 0, NetworkProtocol::Udp, events);
        adapter.connect().await.unwrap();
        assert!(matches!(next_event(&mut rx).await, ConnectionEvent::Connected));

        let target = adapter.udp_local_addr().unwrap();
        let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"first\nsecond\n", target).unwrap();

        assert!(matches!(
            next_event(&mut rx).await,
            ConnectionEvent::RawMessage(l) if l == "first"
        ));
        assert!(matches!(
            next_event(&mut rx).await,
            ConnectionEvent::RawMessage(l) if l == "second"
        ));

        adapter.disconnect().await;
        assert!(matches!(
            next_event(&mut rx).await,
            ConnectionEvent::Disconnected
        ));
    }

    #[tokio::test]
    async fn test_send_without_channel_fails() {
        let (events, _rx) = EventSender::new();
        let mut adapter =
            NetworkAdapter::new("127.0.0.1".to_string(), 1456, NetworkProtocol::Tcp, events);
        assert!(matches!(
            adapter.send_bytes(b"data").await,
            Err(TransmitError::NotConnected)
        ));
    }
}
