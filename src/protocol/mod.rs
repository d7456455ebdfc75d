//! Binary packet codec for the smart-light wire protocol.
//!
//! Every packet is three fixed little-endian header sections followed by a
//! type-specific payload:
//!
//! | Section | Bytes | Contents |
//! |---|---|---|
//! | [`FrameHeader`] | 8 | size, protocol bits, session source |
//! | [`FrameAddress`] | 16 | target id, response flags, sequence |
//! | [`ProtocolHeader`] | 12 | message type code |
//! | payload | variable | see [`MessageType`] |
//!
//! The codec has no I/O: it maps [`Packet`] values to byte buffers and back,
//! and nothing else. Decoding is strict about framing (declared size must
//! match the buffer) and lenient about content (unknown message types are
//! preserved as [`MessageType::Unknown`]).
//!
//! ```rust
//! use glowlink::protocol::Packet;
//!
//! let packet = Packet::get_service(0x0715_0632);
//! let decoded = Packet::decode(&packet.encode()).unwrap();
//! assert_eq!(decoded, packet);
//! ```

mod header;
mod message;
mod packet;

pub use header::{FrameAddress, FrameHeader, HEADER_LEN, PROTOCOL_NUMBER, ProtocolHeader, TargetId};
pub use message::{
    Hsbk, Label, LightState, Message, MessageType, PowerLevel, SetColor, StateService,
};
pub use packet::{MAX_PAYLOAD, Packet};

/// Well-known UDP port devices listen on.
pub const DEFAULT_PORT: u16 = 56700;
