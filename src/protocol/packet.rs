//! Packet composition, encoding and decoding.

use crate::error::FramingError;

use super::header::{
    FRAME_ADDRESS_LEN, FRAME_HEADER_LEN, FrameAddress, FrameHeader, HEADER_LEN, PROTOCOL_NUMBER,
    ProtocolHeader, TargetId,
};
use super::message::{Message, MessageType};

/// Largest payload a frame can carry: the size field is 16 bits and must
/// count the 36 header bytes too.
pub const MAX_PAYLOAD: usize = u16::MAX as usize - HEADER_LEN;

/// One complete wire packet: the three header sections plus raw payload.
///
/// The payload is kept as raw bytes; typed decoding happens at the routing
/// layer so packets with unknown type codes still flow through intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub frame: FrameHeader,
    pub address: FrameAddress,
    pub protocol: ProtocolHeader,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build the broadcast discovery request.
    ///
    /// Discovery packets are tagged, target the broadcast address and ask
    /// every receiver to respond with a StateService message.
    pub fn get_service(source: u32) -> Packet {
        Packet {
            frame: FrameHeader {
                size: HEADER_LEN as u16,
                origin: 0,
                tagged: true,
                addressable: true,
                protocol: PROTOCOL_NUMBER,
                source,
            },
            address: FrameAddress {
                target: TargetId::BROADCAST,
                res_required: true,
                ack_required: false,
                sequence: 0,
            },
            protocol: ProtocolHeader { type_code: MessageType::GetService.code() },
            payload: Vec::new(),
        }
    }

    /// Build an addressed packet carrying a typed message.
    pub fn addressed(source: u32, target: TargetId, sequence: u8, message: &Message) -> Packet {
        let payload = message.encode_payload();
        Packet {
            frame: FrameHeader {
                size: (HEADER_LEN + payload.len()) as u16,
                origin: 0,
                tagged: false,
                addressable: true,
                protocol: PROTOCOL_NUMBER,
                source,
            },
            address: FrameAddress { target, res_required: false, ack_required: false, sequence },
            protocol: ProtocolHeader { type_code: message.message_type().code() },
            payload,
        }
    }

    /// The decoded message type code.
    pub fn message_type(&self) -> MessageType {
        MessageType::from_code(self.protocol.type_code)
    }

    /// Encode into a flat byte sequence. The frame header size field always
    /// reflects the actual encoded length.
    ///
    /// # Panics
    ///
    /// Panics if the payload exceeds [`MAX_PAYLOAD`]: the 16-bit size field
    /// cannot describe a longer frame. Every defined message payload is far
    /// below the limit.
    pub fn encode(&self) -> Vec<u8> {
        assert!(
            self.payload.len() <= MAX_PAYLOAD,
            "payload of {} bytes does not fit the 16-bit frame size field",
            self.payload.len()
        );
        let total = HEADER_LEN + self.payload.len();
        let mut buf = Vec::with_capacity(total);
        let frame = FrameHeader { size: total as u16, ..self.frame };
        frame.write(&mut buf);
        self.address.write(&mut buf);
        self.protocol.write(&mut buf);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode a received datagram.
    ///
    /// Fails when the buffer is shorter than the 36-byte header total or when
    /// the declared size disagrees with the buffer length.
    pub fn decode(buf: &[u8]) -> Result<Packet, FramingError> {
        if buf.len() < HEADER_LEN {
            return Err(FramingError::Truncated { len: buf.len(), minimum: HEADER_LEN });
        }
        let frame = FrameHeader::read(&buf[..FRAME_HEADER_LEN]);
        if frame.size as usize != buf.len() {
            return Err(FramingError::SizeMismatch { declared: frame.size, actual: buf.len() });
        }
        let address_end = FRAME_HEADER_LEN + FRAME_ADDRESS_LEN;
        Ok(Packet {
            frame,
            address: FrameAddress::read(&buf[FRAME_HEADER_LEN..address_end]),
            protocol: ProtocolHeader::read(&buf[address_end..HEADER_LEN]),
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}
