//! NMEA2000 Wire-Format Codec Library
//!
//! This library sits at the boundary between the connection manager and the
//! NMEA2000 gateway hardware it talks to:
//! - CAN identifier packing/unpacking (29-bit extended IDs)
//! - Fast packet fragmentation for payloads longer than one CAN frame
//! - Outbound encodings for the supported gateway families (Digital Yacht
//!   iKonvert, Actisense N2K ASCII, Yacht Devices RAW)
//! - Actisense NGT-1 binary serial framing (DLE/STX escaped streams)
//!
//! Bit-level PGN field encoding and decoding is out of scope here; payload
//! bytes arrive pre-encoded on [`OutboundMessage`] and inbound traffic is
//! surfaced as raw protocol lines for a downstream decoder.
//!
//! # Example
//!
//! ```no_run
//! use n2k_codec::{OutboundMessage, encoders};
//!
//! let mut msg = OutboundMessage::new(127250, vec![0x00, 0x10, 0x27, 0xFF]);
//! msg.destination = 255;
//!
//! // Encode for a Digital Yacht iKonvert gateway
//! let wire = encoders::to_ikonvert_serial(&msg);
//! assert!(wire.starts_with("!PDGY,127250,"));
//! ```

pub mod canid;
pub mod encoders;
pub mod fastpacket;
pub mod message;
pub mod ngt1;

// Re-export commonly used types
pub use canid::CanId;
pub use encoders::{EncodeError, IKonvertLine};
pub use fastpacket::MAX_FAST_PACKET_LEN;
pub use message::OutboundMessage;
pub use ngt1::{Ngt1Codec, Ngt1Frame};
