//! Message type codes and their typed payloads.

use serde::{Deserialize, Serialize};

use super::header::check_len;
use crate::error::FramingError;

/// The 16-bit message type code carried in the protocol header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    GetService,
    StateService,
    GetPower,
    SetPower,
    StatePower,
    GetLabel,
    StateLabel,
    LightGet,
    SetColor,
    LightState,
    /// Codes this client does not interpret; preserved for round-tripping.
    Unknown(u16),
}

impl MessageType {
    pub fn code(&self) -> u16 {
        match self {
            MessageType::GetService => 2,
            MessageType::StateService => 3,
            MessageType::GetPower => 20,
            MessageType::SetPower => 21,
            MessageType::StatePower => 22,
            MessageType::GetLabel => 23,
            MessageType::StateLabel => 25,
            MessageType::LightGet => 101,
            MessageType::SetColor => 102,
            MessageType::LightState => 107,
            MessageType::Unknown(code) => *code,
        }
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            2 => MessageType::GetService,
            3 => MessageType::StateService,
            20 => MessageType::GetPower,
            21 => MessageType::SetPower,
            22 => MessageType::StatePower,
            23 => MessageType::GetLabel,
            25 => MessageType::StateLabel,
            101 => MessageType::LightGet,
            102 => MessageType::SetColor,
            107 => MessageType::LightState,
            other => MessageType::Unknown(other),
        }
    }
}

/// Color in the device's native HSBK representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hsbk {
    pub hue: u16,
    pub saturation: u16,
    pub brightness: u16,
    pub kelvin: u16,
}

impl Hsbk {
    fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.hue.to_le_bytes());
        buf.extend_from_slice(&self.saturation.to_le_bytes());
        buf.extend_from_slice(&self.brightness.to_le_bytes());
        buf.extend_from_slice(&self.kelvin.to_le_bytes());
    }

    fn read(buf: &[u8]) -> Self {
        Hsbk {
            hue: u16::from_le_bytes([buf[0], buf[1]]),
            saturation: u16::from_le_bytes([buf[2], buf[3]]),
            brightness: u16::from_le_bytes([buf[4], buf[5]]),
            kelvin: u16::from_le_bytes([buf[6], buf[7]]),
        }
    }
}

/// Discovery response payload: the service tag and UDP port the device
/// listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateService {
    pub service: u8,
    pub port: u32,
}

impl StateService {
    pub const WIRE_LEN: usize = 5;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::WIRE_LEN);
        buf.push(self.service);
        buf.extend_from_slice(&self.port.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, FramingError> {
        check_len("StateService", buf, Self::WIRE_LEN)?;
        Ok(StateService {
            service: buf[0],
            port: u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]),
        })
    }
}

/// Color command payload: target color plus fade duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetColor {
    pub color: Hsbk,
    pub duration_ms: u32,
}

impl SetColor {
    pub const WIRE_LEN: usize = 12;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::WIRE_LEN);
        self.color.write(&mut buf);
        buf.extend_from_slice(&self.duration_ms.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, FramingError> {
        check_len("SetColor", buf, Self::WIRE_LEN)?;
        Ok(SetColor {
            color: Hsbk::read(buf),
            duration_ms: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }
}

/// Power payload shared by SetPower and StatePower.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerLevel {
    pub level: u16,
}

impl PowerLevel {
    pub const WIRE_LEN: usize = 2;

    pub fn encode(&self) -> Vec<u8> {
        self.level.to_le_bytes().to_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, FramingError> {
        check_len("PowerLevel", buf, Self::WIRE_LEN)?;
        Ok(PowerLevel { level: u16::from_le_bytes([buf[0], buf[1]]) })
    }
}

/// 32-byte NUL-padded device label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label(pub String);

impl Label {
    pub const WIRE_LEN: usize = 32;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::WIRE_LEN];
        let bytes = self.0.as_bytes();
        let len = bytes.len().min(Self::WIRE_LEN);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, FramingError> {
        check_len("Label", buf, Self::WIRE_LEN)?;
        let end = buf[..Self::WIRE_LEN].iter().position(|&b| b == 0).unwrap_or(Self::WIRE_LEN);
        Ok(Label(String::from_utf8_lossy(&buf[..end]).into_owned()))
    }
}

/// Full light state report: color, power and label in one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightState {
    pub color: Hsbk,
    pub power: u16,
    pub label: Label,
}

impl LightState {
    pub const WIRE_LEN: usize = 52;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::WIRE_LEN);
        self.color.write(&mut buf);
        buf.extend_from_slice(&0i16.to_le_bytes());
        buf.extend_from_slice(&self.power.to_le_bytes());
        buf.extend_from_slice(&self.label.encode());
        buf.extend_from_slice(&0u64.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, FramingError> {
        check_len("LightState", buf, Self::WIRE_LEN)?;
        Ok(LightState {
            color: Hsbk::read(buf),
            power: u16::from_le_bytes([buf[10], buf[11]]),
            label: Label::decode(&buf[12..44])?,
        })
    }
}

/// A typed outbound message: the type code plus its encoded payload.
///
/// Inbound traffic is matched on [`MessageType`] instead, because unknown
/// codes must still flow through the dispatcher untyped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    GetService,
    StateService(StateService),
    GetPower,
    SetPower(PowerLevel),
    StatePower(PowerLevel),
    GetLabel,
    StateLabel(Label),
    LightGet,
    SetColor(SetColor),
    LightState(LightState),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::GetService => MessageType::GetService,
            Message::StateService(_) => MessageType::StateService,
            Message::GetPower => MessageType::GetPower,
            Message::SetPower(_) => MessageType::SetPower,
            Message::StatePower(_) => MessageType::StatePower,
            Message::GetLabel => MessageType::GetLabel,
            Message::StateLabel(_) => MessageType::StateLabel,
            Message::LightGet => MessageType::LightGet,
            Message::SetColor(_) => MessageType::SetColor,
            Message::LightState(_) => MessageType::LightState,
        }
    }

    pub fn encode_payload(&self) -> Vec<u8> {
        match self {
            Message::GetService | Message::GetPower | Message::GetLabel | Message::LightGet => {
                Vec::new()
            }
            Message::StateService(p) => p.encode(),
            Message::SetPower(p) | Message::StatePower(p) => p.encode(),
            Message::StateLabel(label) => label.encode(),
            Message::SetColor(p) => p.encode(),
            Message::LightState(p) => p.encode(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_round_trip() {
        for code in 0..200u16 {
            assert_eq!(MessageType::from_code(code).code(), code);
        }
    }

    #[test]
    fn set_color_golden_bytes() {
        // Full brightness at 3500K over one second.
        let payload = SetColor {
            color: Hsbk { hue: 0, saturation: 0, brightness: 65535, kelvin: 3500 },
            duration_ms: 1000,
        };
        assert_eq!(
            payload.encode(),
            [0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xac, 0x0d, 0xe8, 0x03, 0x00, 0x00]
        );
        assert_eq!(SetColor::decode(&payload.encode()).unwrap(), payload);
    }

    #[test]
    fn state_service_layout() {
        let payload = StateService { service: 1, port: 56700 };
        let bytes = payload.encode();
        assert_eq!(bytes.len(), StateService::WIRE_LEN);
        assert_eq!(bytes[0], 1);
        assert_eq!(u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]), 56700);
        assert_eq!(StateService::decode(&bytes).unwrap(), payload);
    }

    #[test]
    fn label_pads_and_trims_nuls() {
        let label = Label("Kitchen".to_string());
        let bytes = label.encode();
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[..7], b"Kitchen");
        assert!(bytes[7..].iter().all(|&b| b == 0));
        assert_eq!(Label::decode(&bytes).unwrap(), label);
    }

    #[test]
    fn label_truncates_overlong_input() {
        let label = Label("x".repeat(40));
        let decoded = Label::decode(&label.encode()).unwrap();
        assert_eq!(decoded.0.len(), 32);
    }

    #[test]
    fn light_state_round_trip() {
        let state = LightState {
            color: Hsbk { hue: 21845, saturation: 65535, brightness: 32768, kelvin: 2700 },
            power: 65535,
            label: Label("Hallway".to_string()),
        };
        let bytes = state.encode();
        assert_eq!(bytes.len(), LightState::WIRE_LEN);
        assert_eq!(LightState::decode(&bytes).unwrap(), state);
    }

    #[test]
    fn short_payload_is_rejected() {
        let err = StateService::decode(&[1, 2]).unwrap_err();
        assert_eq!(
            err,
            FramingError::PayloadTooShort { message: "StateService", expected: 5, actual: 2 }
        );
    }
}
