use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ActivateError;

/// Gateway hardware family behind a serial or network transport
///
/// Resolved once at profile activation; outbound encoding dispatches on
/// this closed set rather than on raw device strings at send time. Strings
/// that do not match a known family parse as `Unknown`, which every
/// encoding path rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceType {
    /// Digital Yacht iKonvert serial gateway
    Ikonvert,
    /// Actisense NGT-1 binary serial gateway
    Ngt1,
    /// Actisense N2K ASCII gateway
    ActisenseAscii,
    /// Yacht Devices RAW gateway
    YdwgRaw,
    Unknown,
}

impl DeviceType {
    pub fn label(&self) -> &'static str {
        match self {
            DeviceType::Ikonvert => "ikonvert",
            DeviceType::Ngt1 => "ngt1",
            DeviceType::ActisenseAscii => "actisense-ascii",
            DeviceType::YdwgRaw => "ydwg-raw",
            DeviceType::Unknown => "unknown",
        }
    }

    fn from_tag(tag: &str) -> Self {
        match tag {
            "ikonvert" => DeviceType::Ikonvert,
            "ngt1" => DeviceType::Ngt1,
            "actisense-ascii" => DeviceType::ActisenseAscii,
            "ydwg-raw" => DeviceType::YdwgRaw,
            _ => DeviceType::Unknown,
        }
    }
}

// Unknown device strings must parse (and later fail closed at routing)
// rather than reject the whole configuration
impl<'de> Deserialize<'de> for DeviceType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        Ok(DeviceType::from_tag(&tag))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkProtocol {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Transport kind plus its kind-specific parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportKind {
    Serial {
        port: String,
        baud_rate: u32,
        device: DeviceType,
    },
    Network {
        host: String,
        port: u16,
        protocol: NetworkProtocol,
        device: DeviceType,
    },
    Socketcan {
        interface: String,
    },
    Signalk {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credentials: Option<Credentials>,
    },
    File {
        path: PathBuf,
        #[serde(default)]
        loop_playback: bool,
        #[serde(default = "default_speed")]
        speed: f64,
    },
}

fn default_speed() -> f64 {
    1.0
}

/// Immutable description of one attachable transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub transport: TransportKind,
}

impl ConnectionProfile {
    /// Fail-fast validation of the kind-specific parameters
    ///
    /// Runs before any resource acquisition so a rejected profile leaves
    /// nothing to release.
    pub fn validate(&self) -> Result<(), ActivateError> {
        match &self.transport {
            TransportKind::Serial { port, baud_rate, .. } => {
                if port.trim().is_empty() {
                    return Err(ActivateError::MissingSerialPort(self.id.clone()));
                }
                if *baud_rate == 0 {
                    return Err(ActivateError::InvalidBaudRate(self.id.clone()));
                }
            }
            TransportKind::Network { host, port, .. } => {
                if host.trim().is_empty() {
                    return Err(ActivateError::MissingHost(self.id.clone()));
                }
                if *port == 0 {
                    return Err(ActivateError::InvalidNetworkPort(self.id.clone()));
                }
            }
            TransportKind::Socketcan { interface } => {
                if interface.trim().is_empty() {
                    return Err(ActivateError::MissingCanInterface(self.id.clone()));
                }
            }
            TransportKind::Signalk { url, .. } => {
                if url.trim().is_empty() {
                    return Err(ActivateError::MissingUrl(self.id.clone()));
                }
                url::Url::parse(url).map_err(|e| {
                    ActivateError::InvalidUrl(self.id.clone(), e.to_string())
                })?;
            }
            TransportKind::File { path, speed, .. } => {
                if path.as_os_str().is_empty() {
                    return Err(ActivateError::MissingFilePath(self.id.clone()));
                }
                if !path.exists() {
                    return Err(ActivateError::FileNotFound(
                        self.id.clone(),
                        path.display().to_string(),
                    ));
                }
                if *speed < 0.0 {
                    return Err(ActivateError::InvalidSpeed(self.id.clone()));
                }
            }
        }
        Ok(())
    }
}

/// Outbound routing target, fixed at activation time
///
/// Collapses the per-send device-type decision into one resolution per
/// profile: the device table for generic serial/network gateways, or one
/// of the special-case paths that bypass the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundRoute {
    /// Encode through the per-device wire format table
    DeviceTable(DeviceType),
    /// JSON envelope over the SignalK session
    SignalK,
    /// Structured message handed to the CAN frame encoder
    SocketCan,
    /// Structured message handed to the decoder stream's own encoder
    DecoderStream,
    /// No physical transmit path; sends succeed as broadcast-only
    BroadcastOnly,
}

impl OutboundRoute {
    pub fn resolve(kind: &TransportKind) -> Self {
        match kind {
            TransportKind::Serial {
                device: DeviceType::Ngt1,
                ..
            } => OutboundRoute::DecoderStream,
            TransportKind::Serial { device, .. } => OutboundRoute::DeviceTable(*device),
            TransportKind::Network { device, .. } => OutboundRoute::DeviceTable(*device),
            TransportKind::Socketcan { .. } => OutboundRoute::SocketCan,
            TransportKind::Signalk { .. } => OutboundRoute::SignalK,
            TransportKind::File { .. } => OutboundRoute::BroadcastOnly,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serial_profile(port: &str, baud: u32) -> ConnectionProfile {
        ConnectionProfile {
            id: "test".to_string(),
            name: "Test".to_string(),
            transport: TransportKind::Serial {
                port: port.to_string(),
                baud_rate: baud,
                device: DeviceType::Ikonvert,
            },
        }
    }

    #[test]
    fn test_unknown_device_string_parses_as_unknown() {
        let device: DeviceType = serde_json::from_str("\"some-future-gateway\"").unwrap();
        assert_eq!(device, DeviceType::Unknown);
    }

    #[test]
    fn test_known_device_strings() {
        let device: DeviceType = serde_json::from_str("\"ydwg-raw\"").unwrap();
        assert_eq!(device, DeviceType::YdwgRaw);
        let device: DeviceType = serde_json::from_str("\"ngt1\"").unwrap();
        assert_eq!(device, DeviceType::Ngt1);
    }

    #[test]
    fn test_profile_deserialization() {
        let json = r#"{
            "id": "yd-wifi",
            "name": "YDWG over WiFi",
            "kind": "network",
            "host": "192.168.4.1",
            "port": 1456,
            "protocol": "tcp",
            "device": "ydwg-raw"
        }"#;
        let profile: ConnectionProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.id, "yd-wifi");
        match profile.transport {
            TransportKind::Network {
                host,
                port,
                protocol,
                device,
            } => {
                assert_eq!(host, "192.168.4.1");
                assert_eq!(port, 1456);
                assert_eq!(protocol, NetworkProtocol::Tcp);
                assert_eq!(device, DeviceType::YdwgRaw);
            }
            other => panic!("unexpected transport: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_empty_serial_port() {
        let profile = serial_profile("", 115200);
        assert!(matches!(
            profile.validate(),
            Err(ActivateError::MissingSerialPort(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_baud() {
        let profile = serial_profile("/dev/ttyUSB0", 0);
        assert!(matches!(
            profile.validate(),
            Err(ActivateError::InvalidBaudRate(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_host() {
        let profile = ConnectionProfile {
            id: "net".to_string(),
            name: "Net".to_string(),
            transport: TransportKind::Network {
                host: "  ".to_string(),
                port: 1456,
                protocol: NetworkProtocol::Tcp,
                device: DeviceType::YdwgRaw,
            },
        };
        assert!(matches!(
            profile.validate(),
            Err(ActivateError::MissingHost(_))
        ));
    }

    #[test]
    fn test_validate_rejects_missing_file() {
        let profile = ConnectionProfile {
            id: "replay".to_string(),
            name: "Replay".to_string(),
            transport: TransportKind::File {
                path: PathBuf::from("/nonexistent/capture.log"),
                loop_playback: false,
                speed: 1.0,
            },
        };
        assert!(matches!(
            profile.validate(),
            Err(ActivateError::FileNotFound(_, _))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let profile = ConnectionProfile {
            id: "sk".to_string(),
            name: "SignalK".to_string(),
            transport: TransportKind::Signalk {
                url: "not a url".to_string(),
                credentials: None,
            },
        };
        assert!(matches!(
            profile.validate(),
            Err(ActivateError::InvalidUrl(_, _))
        ));
    }

    #[test]
    fn test_route_resolution() {
        assert_eq!(
            OutboundRoute::resolve(&TransportKind::Serial {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: 115200,
                device: DeviceType::Ngt1,
            }),
            OutboundRoute::DecoderStream
        );
        assert_eq!(
            OutboundRoute::resolve(&TransportKind::Serial {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: 230400,
                device: DeviceType::Ikonvert,
            }),
            OutboundRoute::DeviceTable(DeviceType::Ikonvert)
        );
        assert_eq!(
            OutboundRoute::resolve(&TransportKind::File {
                path: PathBuf::from("x.log"),
                loop_playback: false,
                speed: 1.0,
            }),
            OutboundRoute::BroadcastOnly
        );
    }
}
