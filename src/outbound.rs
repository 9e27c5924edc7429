use n2k_codec::{OutboundMessage, encoders};
use serde_json::{Value, json};

use crate::error::{RouteError, TransmitError};
use crate::profile::{DeviceType, OutboundRoute};

/// A message resolved to its wire representation for the active transport
#[derive(Debug)]
pub enum RoutedMessage {
    /// Pre-encoded text for a generic serial/network gateway
    Line(String),
    /// JSON envelope for a SignalK session
    Json(String),
    /// Raw CAN frames (identifier plus payloads) for a SocketCAN transport
    CanFrames(u32, Vec<Vec<u8>>),
    /// Structured message for a decoder-backed serial stream, which
    /// performs its own encoding
    Structured(OutboundMessage),
    /// No physical transmit path; the message reaches non-transport
    /// listeners only
    BroadcastOnly(OutboundMessage),
}

/// Maps outbound messages to the wire format of the active device family
///
/// The routing target is resolved once at profile activation; send-time
/// work is a single match. Device families without an outbound encoding
/// fail closed: no bytes are produced for an unrecognised device.
pub struct OutboundFormatRouter {
    /// Fast packet sequence counter for frame-level encodings
    sequence: u8,
}

impl OutboundFormatRouter {
    pub fn new() -> Self {
        Self { sequence: 0 }
    }

    pub fn route(
        &mut self,
        msg: OutboundMessage,
        route: OutboundRoute,
    ) -> Result<RoutedMessage, TransmitError> {
        match route {
            OutboundRoute::DeviceTable(device) => self.encode_for_device(msg, device),
            OutboundRoute::SignalK => Ok(RoutedMessage::Json(signalk_envelope(&msg))),
            OutboundRoute::SocketCan => {
                let seq = self.next_sequence();
                let (id, frames) = encoders::to_can_frames(&msg, seq)?;
                Ok(RoutedMessage::CanFrames(id, frames))
            }
            OutboundRoute::DecoderStream => Ok(RoutedMessage::Structured(msg)),
            OutboundRoute::BroadcastOnly => Ok(RoutedMessage::BroadcastOnly(msg)),
        }
    }

    fn encode_for_device(
        &mut self,
        msg: OutboundMessage,
        device: DeviceType,
    ) -> Result<RoutedMessage, TransmitError> {
        match device {
            DeviceType::Ikonvert => Ok(RoutedMessage::Line(encoders::to_ikonvert_serial(&msg))),
            DeviceType::ActisenseAscii => {
                Ok(RoutedMessage::Line(encoders::to_actisense_ascii(&msg)))
            }
            DeviceType::YdwgRaw => {
                let seq = self.next_sequence();
                Ok(RoutedMessage::Line(encoders::to_ydwg_raw(&msg, seq)?))
            }
            // NGT-1 has no table entry: on a generic transport its binary
            // framing cannot be produced here
            DeviceType::Ngt1 | DeviceType::Unknown => Err(TransmitError::Route(
                RouteError::UnsupportedDevice(device.label().to_string()),
            )),
        }
    }

    fn next_sequence(&mut self) -> u8 {
        let seq = self.sequence;
        self.sequence = (self.sequence + 1) & 0x7;
        seq
    }
}

impl Default for OutboundFormatRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap a message in the SignalK delta envelope
///
/// The wildcard context is merged with the message's own serialized fields.
fn signalk_envelope(msg: &OutboundMessage) -> String {
    let mut envelope = match serde_json::to_value(msg) {
        Ok(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    envelope.insert("context".to_string(), json!("vessels.*"));
    Value::Object(envelope).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> OutboundMessage {
        let mut msg = OutboundMessage::new(127250, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        msg.priority = 2;
        msg.source = 0x17;
        msg
    }

    #[test]
    fn test_ikonvert_dispatch() {
        let mut router = OutboundFormatRouter::new();
        let routed = router
            .route(message(), OutboundRoute::DeviceTable(DeviceType::Ikonvert))
            .unwrap();
        match routed {
            RoutedMessage::Line(line) => {
                assert_eq!(line, "!PDGY,127250,255,AQIDBAUGBwg=\r\n")
            }
            other => panic!("unexpected routing: {:?}", other),
        }
    }

    #[test]
    fn test_ydwg_dispatch() {
        let mut router = OutboundFormatRouter::new();
        let routed = router
            .route(message(), OutboundRoute::DeviceTable(DeviceType::YdwgRaw))
            .unwrap();
        match routed {
            RoutedMessage::Line(line) => {
                assert_eq!(line, "09F11217 01 02 03 04 05 06 07 08\r\n")
            }
            other => panic!("unexpected routing: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_device_fails_closed() {
        let mut router = OutboundFormatRouter::new();
        let err = router
            .route(message(), OutboundRoute::DeviceTable(DeviceType::Unknown))
            .unwrap_err();
        assert!(matches!(
            err,
            TransmitError::Route(RouteError::UnsupportedDevice(d)) if d == "unknown"
        ));
    }

    #[test]
    fn test_ngt1_has_no_table_entry() {
        let mut router = OutboundFormatRouter::new();
        assert!(
            router
                .route(message(), OutboundRoute::DeviceTable(DeviceType::Ngt1))
                .is_err()
        );
    }

    #[test]
    fn test_signalk_envelope_merges_context() {
        let mut router = OutboundFormatRouter::new();
        let mut msg = message();
        msg.fields
            .insert("heading".to_string(), json!(1.5708));
        let routed = router.route(msg, OutboundRoute::SignalK).unwrap();
        match routed {
            RoutedMessage::Json(body) => {
                let parsed: Value = serde_json::from_str(&body).unwrap();
                assert_eq!(parsed["context"], "vessels.*");
                assert_eq!(parsed["pgn"], 127250);
                assert_eq!(parsed["fields"]["heading"], 1.5708);
            }
            other => panic!("unexpected routing: {:?}", other),
        }
    }

    #[test]
    fn test_socketcan_frames() {
        let mut router = OutboundFormatRouter::new();
        let routed = router.route(message(), OutboundRoute::SocketCan).unwrap();
        match routed {
            RoutedMessage::CanFrames(id, frames) => {
                assert_eq!(id, 0x09F11217);
                assert_eq!(frames, vec![vec![1, 2, 3, 4, 5, 6, 7, 8]]);
            }
            other => panic!("unexpected routing: {:?}", other),
        }
    }

    #[test]
    fn test_decoder_stream_passthrough() {
        let mut router = OutboundFormatRouter::new();
        let routed = router.route(message(), OutboundRoute::DecoderStream).unwrap();
        assert!(matches!(routed, RoutedMessage::Structured(m) if m.pgn == 127250));
    }

    #[test]
    fn test_no_transport_is_broadcast_only() {
        let mut router = OutboundFormatRouter::new();
        let routed = router.route(message(), OutboundRoute::BroadcastOnly).unwrap();
        assert!(matches!(routed, RoutedMessage::BroadcastOnly(_)));
    }

    #[test]
    fn test_sequence_counter_advances() {
        let mut router = OutboundFormatRouter::new();
        let mut msg = message();
        msg.data = (0..16).collect();
        for expected in [0x00u8, 0x20, 0x40] {
            let routed = router
                .route(msg.clone(), OutboundRoute::DeviceTable(DeviceType::YdwgRaw))
                .unwrap();
            match routed {
                RoutedMessage::Line(text) => {
                    let first = text.lines().next().unwrap();
                    let counter =
                        u8::from_str_radix(first.split(' ').nth(1).unwrap(), 16).unwrap();
                    assert_eq!(counter, expected);
                }
                other => panic!("unexpected routing: {:?}", other),
            }
        }
    }
}
