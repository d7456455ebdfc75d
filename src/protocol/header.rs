//! Fixed-layout header sections of the wire protocol.
//!
//! Every packet starts with three little-endian sections totalling 36 bytes:
//! an 8-byte frame header, a 16-byte frame address and a 12-byte protocol
//! header. Reserved regions are written as zeros and ignored on decode.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FramingError;

/// Protocol number carried in the frame header's packed field.
pub const PROTOCOL_NUMBER: u16 = 1024;

/// Total length of the three fixed header sections.
pub const HEADER_LEN: usize = 36;

pub(crate) const FRAME_HEADER_LEN: usize = 8;
pub(crate) const FRAME_ADDRESS_LEN: usize = 16;

/// 8-byte device identifier. All-zero denotes broadcast / no specific target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId(pub [u8; 8]);

impl TargetId {
    /// The all-zero broadcast target.
    pub const BROADCAST: TargetId = TargetId([0; 8]);

    /// Whether this is the broadcast (all-zero) target.
    pub fn is_broadcast(&self) -> bool {
        self.0 == [0; 8]
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Transport-level envelope: total size, protocol bits and session source.
///
/// The second 16-bit field packs `protocol:12`, `addressable:1`, `tagged:1`
/// and `origin:2`, low bits first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Total encoded packet length, headers plus payload.
    pub size: u16,
    pub origin: u8,
    /// Set on broadcast discovery packets, clear on addressed traffic.
    pub tagged: bool,
    pub addressable: bool,
    pub protocol: u16,
    /// Session source id stamped by the originating client.
    pub source: u32,
}

impl FrameHeader {
    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.size.to_le_bytes());
        let mut packed = self.protocol & 0x0fff;
        if self.addressable {
            packed |= 1 << 12;
        }
        if self.tagged {
            packed |= 1 << 13;
        }
        packed |= u16::from(self.origin & 0b11) << 14;
        buf.extend_from_slice(&packed.to_le_bytes());
        buf.extend_from_slice(&self.source.to_le_bytes());
    }

    pub(crate) fn read(buf: &[u8]) -> Self {
        let size = u16::from_le_bytes([buf[0], buf[1]]);
        let packed = u16::from_le_bytes([buf[2], buf[3]]);
        let source = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        FrameHeader {
            size,
            origin: ((packed >> 14) & 0b11) as u8,
            tagged: packed & (1 << 13) != 0,
            addressable: packed & (1 << 12) != 0,
            protocol: packed & 0x0fff,
            source,
        }
    }
}

/// Addressing and acknowledgement envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameAddress {
    pub target: TargetId,
    /// Ask the device to reply with the matching state message.
    pub res_required: bool,
    /// Ask the device to reply with an acknowledgement.
    pub ack_required: bool,
    pub sequence: u8,
}

impl FrameAddress {
    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.target.0);
        buf.extend_from_slice(&[0u8; 6]);
        let mut flags = 0u8;
        if self.res_required {
            flags |= 1;
        }
        if self.ack_required {
            flags |= 1 << 1;
        }
        buf.push(flags);
        buf.push(self.sequence);
    }

    pub(crate) fn read(buf: &[u8]) -> Self {
        let mut target = [0u8; 8];
        target.copy_from_slice(&buf[..8]);
        let flags = buf[14];
        FrameAddress {
            target: TargetId(target),
            res_required: flags & 1 != 0,
            ack_required: flags & (1 << 1) != 0,
            sequence: buf[15],
        }
    }
}

/// Payload discriminator: the 16-bit message type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolHeader {
    pub type_code: u16,
}

impl ProtocolHeader {
    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&0u64.to_le_bytes());
        buf.extend_from_slice(&self.type_code.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
    }

    pub(crate) fn read(buf: &[u8]) -> Self {
        ProtocolHeader { type_code: u16::from_le_bytes([buf[8], buf[9]]) }
    }
}

/// Bounds-check a payload buffer against the minimum a message requires.
pub(crate) fn check_len(
    message: &'static str,
    buf: &[u8],
    expected: usize,
) -> Result<(), FramingError> {
    if buf.len() < expected {
        return Err(FramingError::PayloadTooShort { message, expected, actual: buf.len() });
    }
    Ok(())
}
