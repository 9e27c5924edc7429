use thiserror::Error;

/// Failures raised by `activate()` before any resource is acquired
///
/// These are configuration errors: the profile is structurally unable to
/// describe a connection, so activation fails fast with nothing to release.
#[derive(Debug, Error)]
pub enum ActivateError {
    #[error("profile '{0}' has no serial port configured")]
    MissingSerialPort(String),
    #[error("profile '{0}' has a zero baud rate")]
    InvalidBaudRate(String),
    #[error("profile '{0}' has no host configured")]
    MissingHost(String),
    #[error("profile '{0}' has no network port configured")]
    InvalidNetworkPort(String),
    #[error("profile '{0}' has no CAN interface name configured")]
    MissingCanInterface(String),
    #[error("profile '{0}' has no server URL configured")]
    MissingUrl(String),
    #[error("profile '{0}' server URL is malformed: {1}")]
    InvalidUrl(String, String),
    #[error("profile '{0}' has no capture file configured")]
    MissingFilePath(String),
    #[error("profile '{0}' capture file does not exist: {1}")]
    FileNotFound(String, String),
    #[error("profile '{0}' has a negative replay speed multiplier")]
    InvalidSpeed(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Session-level transport failures
///
/// Reported through the manager's `Error` event stream, never thrown
/// uncaught. The CAN variant carries the remediation text so the operator
/// sees an actionable message instead of a bare I/O error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open serial port {port}: {source}")]
    SerialOpen {
        port: String,
        source: tokio_serial::Error,
    },
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },
    #[error("failed to bind UDP port {port}: {source}")]
    UdpBind { port: u16, source: std::io::Error },
    #[error(
        "CAN interface '{interface}' is not available: {source}. \
         Check that SocketCAN is loaded and the interface is up, e.g. \
         `ip link show {interface}` and `sudo ip link set {interface} up type can bitrate 250000`"
    )]
    CanInterfaceUnavailable {
        interface: String,
        source: std::io::Error,
    },
    #[error("WebSocket connection to {url} failed: {reason}")]
    WebSocket { url: String, reason: String },
    #[error("failed to open capture file {path}: {source}")]
    FileOpen {
        path: String,
        source: std::io::Error,
    },
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-call failure returned to the `send()` caller
///
/// A failed transmit is not a session fault: it is surfaced as an explicit
/// result, not through the `Error` event stream.
#[derive(Debug, Error)]
pub enum TransmitError {
    #[error("no transport channel is open")]
    NotConnected,
    #[error("outbound routing failed: {0}")]
    Route(#[from] RouteError),
    #[error("encoding failed: {0}")]
    Encode(#[from] n2k_codec::EncodeError),
    #[error("transmit failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A structurally invalid outbound request
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("no outbound encoding is defined for device type '{0}'")]
    UnsupportedDevice(String),
}
