use tracing::debug;

use crate::encoders;
use crate::message::OutboundMessage;

const DLE: u8 = 0x10;
const STX: u8 = 0x02;
const ETX: u8 = 0x03;

/// N2K message received from the bus
const CMD_N2K_RECEIVED: u8 = 0x93;
/// N2K message to transmit onto the bus
const CMD_N2K_SEND: u8 = 0x94;

/// A complete NMEA2000 message decoded from an NGT-1 serial stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ngt1Frame {
    pub priority: u8,
    pub pgn: u32,
    pub destination: u8,
    pub source: u8,
    pub data: Vec<u8>,
}

impl Ngt1Frame {
    /// Render as a raw protocol line in Actisense ASCII form
    pub fn to_ascii_line(&self) -> String {
        encoders::actisense_line(
            self.source,
            self.destination,
            self.priority,
            self.pgn,
            &self.data,
        )
    }
}

enum DecodeState {
    /// Scanning for the DLE that opens a frame
    Idle,
    /// Saw a DLE while idle, expecting STX
    IdleEscape,
    /// Inside a frame, collecting unescaped content
    InFrame,
    /// Saw a DLE inside a frame: DLE DLE is a literal, DLE ETX ends it
    FrameEscape,
}

/// Stateful decoder for the Actisense NGT-1 binary serial protocol
///
/// Frames are DLE/STX ... DLE/ETX delimited with DLE doubling inside the
/// body. The body is `command, length, payload..., checksum` where the sum
/// of all body bytes is zero modulo 256. Bytes between frames and frames
/// that fail the checksum are dropped.
pub struct Ngt1Codec {
    state: DecodeState,
    body: Vec<u8>,
}

impl Ngt1Codec {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Idle,
            body: Vec::new(),
        }
    }

    /// Consume a chunk of serial bytes, returning any completed messages
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Ngt1Frame> {
        let mut frames = Vec::new();
        for &byte in chunk {
            match self.state {
                DecodeState::Idle => {
                    if byte == DLE {
                        self.state = DecodeState::IdleEscape;
                    }
                }
                DecodeState::IdleEscape => {
                    if byte == STX {
                        self.body.clear();
                        self.state = DecodeState::InFrame;
                    } else {
                        self.state = DecodeState::Idle;
                    }
                }
                DecodeState::InFrame => {
                    if byte == DLE {
                        self.state = DecodeState::FrameEscape;
                    } else {
                        self.body.push(byte);
                    }
                }
                DecodeState::FrameEscape => {
                    if byte == DLE {
                        // Escaped literal 0x10
                        self.body.push(DLE);
                        self.state = DecodeState::InFrame;
                    } else if byte == ETX {
                        if let Some(frame) = self.finish_frame() {
                            frames.push(frame);
                        }
                        self.state = DecodeState::Idle;
                    } else {
                        // Malformed escape: resynchronise
                        debug!("NGT-1 framing error, dropping partial frame");
                        self.state = DecodeState::Idle;
                    }
                }
            }
        }
        frames
    }

    fn finish_frame(&mut self) -> Option<Ngt1Frame> {
        let body = std::mem::take(&mut self.body);
        if body.len() < 3 {
            return None;
        }
        let sum: u8 = body.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        if sum != 0 {
            debug!("NGT-1 checksum mismatch, dropping frame");
            return None;
        }

        let command = body[0];
        let length = body[1] as usize;
        let payload = &body[2..body.len() - 1];
        if command != CMD_N2K_RECEIVED || payload.len() != length {
            return None;
        }

        // Payload: priority, pgn (3 bytes LE), destination, source,
        // timestamp (4 bytes), data length, data
        if payload.len() < 11 {
            return None;
        }
        let data_len = payload[10] as usize;
        if payload.len() < 11 + data_len {
            return None;
        }

        Some(Ngt1Frame {
            priority: payload[0],
            pgn: u32::from(payload[1]) | u32::from(payload[2]) << 8 | u32::from(payload[3]) << 16,
            destination: payload[4],
            source: payload[5],
            data: payload[11..11 + data_len].to_vec(),
        })
    }

    /// Frame a structured message for transmission through the NGT-1
    ///
    /// Payload layout for the send command: priority, pgn (3 bytes LE),
    /// destination, data length, data.
    pub fn encode_send(msg: &OutboundMessage) -> Vec<u8> {
        let mut payload = Vec::with_capacity(6 + msg.data.len());
        payload.push(msg.priority);
        payload.push((msg.pgn & 0xFF) as u8);
        payload.push((msg.pgn >> 8 & 0xFF) as u8);
        payload.push((msg.pgn >> 16 & 0xFF) as u8);
        payload.push(msg.destination);
        payload.push(msg.data.len() as u8);
        payload.extend_from_slice(&msg.data);

        let mut body = Vec::with_capacity(payload.len() + 3);
        body.push(CMD_N2K_SEND);
        body.push(payload.len() as u8);
        body.extend_from_slice(&payload);
        let sum: u8 = body.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        body.push(0u8.wrapping_sub(sum));

        let mut out = vec![DLE, STX];
        for byte in body {
            if byte == DLE {
                out.push(DLE);
            }
            out.push(byte);
        }
        out.push(DLE);
        out.push(ETX);
        out
    }
}

impl Default for Ngt1Codec {
    fn default() -> Self {
        Self::new()
    }
}
