use n2k_codec::{IKonvertLine, Ngt1Codec, OutboundMessage, encoders};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

use crate::error::{TransmitError, TransportError};
use crate::events::EventSender;
use crate::line_reader::{Delimiter, LineReader};
use crate::profile::DeviceType;

/// Commands accepted by the serial writer task
///
/// Decoder-backed devices (NGT-1) receive structured messages and the
/// codec performs its own framing; everything else receives pre-encoded
/// bytes from the outbound router.
enum SerialCommand {
    Bytes(Vec<u8>),
    Structured(OutboundMessage),
}

/// Serial gateway transport
///
/// NGT-1 devices delegate framing and decoding to the codec's binary
/// stream helper; iKonvert lines are classified by the codec into traffic
/// and gateway status. Every other device type falls back to a generic
/// line-delimited read using the per-device delimiter table. No automatic
/// retry: a failed open or a dead port surfaces as an error.
pub struct SerialAdapter {
    port: String,
    baud_rate: u32,
    device: DeviceType,
    events: EventSender,
    read_task: Option<JoinHandle<()>>,
    write_task: Option<JoinHandle<()>>,
    outbound: Option<mpsc::UnboundedSender<SerialCommand>>,
    done: Arc<AtomicBool>,
    started: bool,
}

impl SerialAdapter {
    pub fn new(port: String, baud_rate: u32, device: DeviceType, events: EventSender) -> Self {
        Self {
            port,
            baud_rate,
            device,
            events,
            read_task: None,
            write_task: None,
            outbound: None,
            done: Arc::new(AtomicBool::new(false)),
            started: false,
        }
    }

    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if self.started {
            return Ok(());
        }
        let stream = tokio_serial::new(self.port.as_str(), self.baud_rate)
            .open_native_async()
            .map_err(|e| TransportError::SerialOpen {
                port: self.port.clone(),
                source: e,
            })?;
        info!("Opened serial port {} at {} baud", self.port, self.baud_rate);

        let (read_half, write_half) = tokio::io::split(stream);
        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound = Some(tx);
        self.write_task = Some(tokio::spawn(write_loop(write_half, rx)));

        let events = self.events.clone();
        let done = Arc::clone(&self.done);
        let device = self.device;
        self.read_task = Some(tokio::spawn(async move {
            match device {
                DeviceType::Ngt1 => ngt1_read_loop(read_half, &events).await,
                _ => line_read_loop(read_half, device, &events).await,
            }
            events.disconnected_once(&done);
        }));

        self.started = true;
        self.events.connected();
        Ok(())
    }

    pub async fn disconnect(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        if let Some(task) = self.write_task.take() {
            task.abort();
        }
        self.outbound = None;
        self.events.disconnected_once(&self.done);
    }

    pub async fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), TransmitError> {
        self.submit(SerialCommand::Bytes(bytes.to_vec()))
    }

    /// Hand a structured message to the decoder-backed stream
    pub fn send_structured(&mut self, msg: OutboundMessage) -> Result<(), TransmitError> {
        self.submit(SerialCommand::Structured(msg))
    }

    fn submit(&self, command: SerialCommand) -> Result<(), TransmitError> {
        let outbound = self.outbound.as_ref().ok_or(TransmitError::NotConnected)?;
        outbound
            .send(command)
            .map_err(|_| TransmitError::NotConnected)
    }
}

/// Per-device line terminator table for the generic fallback read
fn delimiter_for(device: DeviceType) -> Delimiter {
    match device {
        DeviceType::YdwgRaw => Delimiter::CrLf,
        _ => Delimiter::Lf,
    }
}

async fn write_loop(
    mut writer: WriteHalf<SerialStream>,
    mut rx: mpsc::UnboundedReceiver<SerialCommand>,
) {
    while let Some(command) = rx.recv().await {
        let bytes = match command {
            SerialCommand::Bytes(bytes) => bytes,
            SerialCommand::Structured(msg) => Ngt1Codec::encode_send(&msg),
        };
        if let Err(e) = writer.write_all(&bytes).await {
            log::warn!("serial write failed: {}", e);
            break;
        }
    }
}

async fn ngt1_read_loop(mut reader: ReadHalf<SerialStream>, events: &EventSender) {
    let mut codec = Ngt1Codec::new();
    let mut buf = [0u8; 1024];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for frame in codec.decode(&buf[..n]) {
                    events.raw_message(frame.to_ascii_line());
                }
            }
            Err(e) => {
                events.error(TransportError::Io(e));
                break;
            }
        }
    }
}

async fn line_read_loop(
    mut reader: ReadHalf<SerialStream>,
    device: DeviceType,
    events: &EventSender,
) {
    let mut lines = LineReader::new(delimiter_for(device));
    let mut buf = [0u8; 1024];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for line in lines.push(&buf[..n]) {
                    publish_line(device, line, events);
                }
            }
            Err(e) => {
                events.error(TransportError::Io(e));
                break;
            }
        }
    }
}

fn publish_line(device: DeviceType, line: String, events: &EventSender) {
    match device {
        DeviceType::Ikonvert => match encoders::classify_ikonvert_line(&line) {
            IKonvertLine::Data(line) => events.raw_message(line),
            IKonvertLine::Status(line) => {
                // Gateway heartbeat, surfaced as a placeholder line
                debug!("iKonvert status: {}", line);
                events.synthetic_message(line);
            }
        },
        _ => events.raw_message(line),
    }
}
