use base64::{Engine as _, engine::general_purpose::STANDARD};
use thiserror::Error;

use crate::canid::CanId;
use crate::fastpacket::{self, MAX_FAST_PACKET_LEN};
use crate::message::OutboundMessage;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("payload of {0} bytes exceeds the {MAX_FAST_PACKET_LEN} byte fast packet limit")]
    PayloadTooLarge(usize),
}

/// Encode for a Digital Yacht iKonvert gateway (serial)
///
/// Transmit sentences take the form `!PDGY,<pgn>,<destination>,<base64 payload>`.
pub fn to_ikonvert_serial(msg: &OutboundMessage) -> String {
    format!(
        "!PDGY,{},{},{}\r\n",
        msg.pgn,
        msg.destination,
        STANDARD.encode(&msg.data)
    )
}

/// Encode for an Actisense N2K ASCII gateway
///
/// Line shape: `A<time> <src><dst><priority> <pgn hex> <payload hex>`. The
/// wall-clock field is ignored by the gateway and emitted as a fixed zero
/// prefix so the encoding stays byte-stable.
pub fn to_actisense_ascii(msg: &OutboundMessage) -> String {
    format!(
        "{}\r\n",
        actisense_line(msg.source, msg.destination, msg.priority, msg.pgn, &msg.data)
    )
}

/// Format an Actisense ASCII line without the terminator
pub fn actisense_line(source: u8, destination: u8, priority: u8, pgn: u32, data: &[u8]) -> String {
    format!(
        "A000000.000 {:02X}{:02X}{:X} {:05X} {}",
        source,
        destination,
        priority & 0x7,
        pgn,
        hex_string(data)
    )
}

/// Encode for a Yacht Devices RAW network gateway
///
/// One `<id> <hex bytes>` line per CAN frame; payloads longer than a single
/// frame are fast packet fragmented with the given sequence counter.
pub fn to_ydwg_raw(msg: &OutboundMessage, sequence: u8) -> Result<String, EncodeError> {
    let (id, frames) = to_can_frames(msg, sequence)?;
    let mut out = String::new();
    for frame in frames {
        out.push_str(&raw_frame_line(id, &frame));
        out.push_str("\r\n");
    }
    Ok(out)
}

/// Produce the raw CAN frames for a structured message
///
/// Returns the packed 29-bit identifier and the frame payloads, fragmented
/// when the message payload exceeds a single frame.
pub fn to_can_frames(
    msg: &OutboundMessage,
    sequence: u8,
) -> Result<(u32, Vec<Vec<u8>>), EncodeError> {
    if msg.data.len() > MAX_FAST_PACKET_LEN {
        return Err(EncodeError::PayloadTooLarge(msg.data.len()));
    }
    let id = CanId::new(msg.priority, msg.pgn, msg.source, msg.destination).to_raw();
    Ok((id, fastpacket::fragment(&msg.data, sequence)))
}

/// Format a single received or transmitted CAN frame as a RAW gateway line
pub fn raw_frame_line(id: u32, data: &[u8]) -> String {
    let mut line = format!("{:08X}", id);
    for byte in data {
        line.push(' ');
        line.push_str(&format!("{:02X}", byte));
    }
    line
}

fn hex_string(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        out.push_str(&format!("{:02X}", byte));
    }
    out
}

/// Classification of an inbound iKonvert serial line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IKonvertLine {
    /// NMEA2000 traffic in the gateway's receive sentence format
    Data(String),
    /// Gateway status/heartbeat sentence, not NMEA2000 traffic
    Status(String),
}

/// Separate iKonvert data sentences from gateway status sentences
///
/// The gateway interleaves `$PDGY` status/heartbeat sentences with the
/// `!PDGY` traffic sentences on the same serial stream.
pub fn classify_ikonvert_line(line: &str) -> IKonvertLine {
    if line.starts_with("$PDGY") {
        IKonvertLine::Status(line.to_string())
    } else {
        IKonvertLine::Data(line.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(data: Vec<u8>) -> OutboundMessage {
        let mut msg = OutboundMessage::new(127250, data);
        msg.priority = 2;
        msg.source = 0x17;
        msg
    }

    #[test]
    fn test_ikonvert_encoding() {
        let msg = message(vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(
            to_ikonvert_serial(&msg),
            "!PDGY,127250,255,AQIDBAUGBwg=\r\n"
        );
    }

    #[test]
    fn test_actisense_ascii_encoding() {
        let mut msg = OutboundMessage::new(128267, vec![0x01, 0x02, 0x03, 0x04]);
        msg.priority = 7;
        msg.source = 0x23;
        assert_eq!(
            to_actisense_ascii(&msg),
            "A000000.000 23FF7 1F50B 01020304\r\n"
        );
    }

    #[test]
    fn test_ydwg_raw_single_frame() {
        let msg = message(vec![0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]);
        assert_eq!(
            to_ydwg_raw(&msg, 0).unwrap(),
            "09F11217 00 11 22 33 44 55 66 77\r\n"
        );
    }

    #[test]
    fn test_ydwg_raw_fast_packet_fragmentation() {
        let msg = message((0..16).collect());
        let out = to_ydwg_raw(&msg, 1).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.starts_with("09F11217 ")));
        // First fragment: counter byte then the total length
        assert_eq!(lines[0], "09F11217 20 10 00 01 02 03 04 05");
    }

    #[test]
    fn test_oversized_payload_is_rejected() {
        let msg = message(vec![0; 300]);
        assert!(matches!(
            to_ydwg_raw(&msg, 0),
            Err(EncodeError::PayloadTooLarge(300))
        ));
    }

    #[test]
    fn test_to_can_frames_identifier() {
        let msg = message(vec![1, 2]);
        let (id, frames) = to_can_frames(&msg, 0).unwrap();
        assert_eq!(id, 0x09F11217);
        assert_eq!(frames, vec![vec![1, 2]]);
    }

    #[test]
    fn test_ikonvert_line_classification() {
        assert_eq!(
            classify_ikonvert_line("$PDGY,000000,,,,,"),
            IKonvertLine::Status("$PDGY,000000,,,,,".to_string())
        );
        assert_eq!(
            classify_ikonvert_line("!PDGY,126992,3,2,255,0.563,AAAA"),
            IKonvertLine::Data("!PDGY,126992,3,2,255,0.563,AAAA".to_string())
        );
    }
}
