use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Structured outbound NMEA2000 message
///
/// `fields` carries the decoded field values as submitted by the caller and
/// is what JSON transports see; `data` carries the payload bytes already
/// produced by the external field encoder and is what the binary and ASCII
/// gateway framings transmit. A message is consumed once per send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub pgn: u32,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub source: u8,
    #[serde(default = "broadcast_address")]
    pub destination: u8,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default, skip_serializing)]
    pub data: Vec<u8>,
}

fn default_priority() -> u8 {
    6
}

fn broadcast_address() -> u8 {
    255
}

impl OutboundMessage {
    /// Create a broadcast message with default priority
    pub fn new(pgn: u32, data: Vec<u8>) -> Self {
        Self {
            pgn,
            priority: default_priority(),
            source: 0,
            destination: broadcast_address(),
            fields: Map::new(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_defaults() {
        let msg = OutboundMessage::new(127250, vec![1, 2, 3]);
        assert_eq!(msg.pgn, 127250);
        assert_eq!(msg.priority, 6);
        assert_eq!(msg.destination, 255);
        assert!(msg.fields.is_empty());
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let msg: OutboundMessage =
            serde_json::from_str(r#"{"pgn": 130306, "fields": {"windSpeed": 4.2}}"#).unwrap();
        assert_eq!(msg.pgn, 130306);
        assert_eq!(msg.priority, 6);
        assert_eq!(msg.destination, 255);
        assert!(msg.data.is_empty());
        assert_eq!(msg.fields.get("windSpeed"), Some(&serde_json::json!(4.2)));
    }

    #[test]
    fn test_serialize_omits_payload_bytes() {
        let msg = OutboundMessage::new(127250, vec![1, 2, 3]);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"pgn\":127250"));
        assert!(!json.contains("\"data\""));
    }
}
