//! EAP (Extensible Authentication Protocol) codec
//!
//! Packet structures from RFC 3748 and the EAP-Message encapsulation of
//! RFC 3579.
//!
//! # EAP Packet Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Code      |  Identifier   |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Type      |  Type-Data ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Type and Type-Data are present only for Request and Response.

pub mod extension;
pub mod md5;
#[cfg(feature = "tls")]
pub mod tls;

use crate::attributes::{Attribute, AttributeType};
use crate::packet::Packet;
use thiserror::Error;

/// EAP packet code (first byte of EAP packet)
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EapCode {
    Request = 1,
    Response = 2,
    Success = 3,
    Failure = 4,
}

impl EapCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EapCode::Request),
            2 => Some(EapCode::Response),
            3 => Some(EapCode::Success),
            4 => Some(EapCode::Failure),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Request and Response carry a Type octet, Success and Failure do not
    pub fn has_type(self) -> bool {
        matches!(self, EapCode::Request | EapCode::Response)
    }
}

/// EAP method types (RFC 3748 and IANA registry)
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum EapType {
    /// Identity (Type 1) - RFC 3748
    Identity = 1,
    /// Notification (Type 2) - RFC 3748
    Notification = 2,
    /// Legacy Nak (Type 3) - RFC 3748
    /// Response only, names the methods the peer would accept instead
    Nak = 3,
    /// MD5-Challenge (Type 4) - RFC 3748
    Md5Challenge = 4,
    /// One-Time Password (Type 5)
    OneTimePassword = 5,
    /// Generic Token Card (Type 6)
    GenericTokenCard = 6,
    /// EAP-TLS (Type 13) - RFC 5216
    Tls = 13,
    /// EAP-TTLS (Type 21) - RFC 5281
    Ttls = 21,
    /// PEAP (Type 25) - draft-josefsson-pppext-eap-tls-eap
    Peap = 25,
    /// EAP-MSCHAPv2 (Type 26)
    MsChapV2 = 26,
    /// PEAP Extensions (Type 33), only seen inside a PEAP tunnel
    PeapExtension = 33,
    /// EAP-TEAP (Type 55) - RFC 7170
    Teap = 55,
}

impl EapType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EapType::Identity),
            2 => Some(EapType::Notification),
            3 => Some(EapType::Nak),
            4 => Some(EapType::Md5Challenge),
            5 => Some(EapType::OneTimePassword),
            6 => Some(EapType::GenericTokenCard),
            13 => Some(EapType::Tls),
            21 => Some(EapType::Ttls),
            25 => Some(EapType::Peap),
            26 => Some(EapType::MsChapV2),
            33 => Some(EapType::PeapExtension),
            55 => Some(EapType::Teap),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// EAP packet structure
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapPacket {
    pub code: EapCode,
    /// Matches requests with responses, wraps at 255
    pub identifier: u8,
    /// Only present for Request/Response
    pub eap_type: Option<EapType>,
    /// Type-Data
    pub data: Vec<u8>,
}

impl EapPacket {
    /// EAP header: code, identifier, length
    pub const HEADER_LENGTH: usize = 4;

    pub fn new(code: EapCode, identifier: u8, eap_type: Option<EapType>, data: Vec<u8>) -> Self {
        EapPacket {
            code,
            identifier,
            eap_type,
            data,
        }
    }

    /// Request carrying `eap_type` and its Type-Data
    pub fn request(identifier: u8, eap_type: EapType, data: Vec<u8>) -> Self {
        Self::new(EapCode::Request, identifier, Some(eap_type), data)
    }

    /// Response carrying `eap_type` and its Type-Data
    pub fn response(identifier: u8, eap_type: EapType, data: Vec<u8>) -> Self {
        Self::new(EapCode::Response, identifier, Some(eap_type), data)
    }

    pub fn identity_request(identifier: u8, message: &str) -> Self {
        Self::request(identifier, EapType::Identity, message.as_bytes().to_vec())
    }

    pub fn identity_response(identifier: u8, identity: &str) -> Self {
        Self::response(identifier, EapType::Identity, identity.as_bytes().to_vec())
    }

    pub fn success(identifier: u8) -> Self {
        Self::new(EapCode::Success, identifier, None, Vec::new())
    }

    pub fn failure(identifier: u8) -> Self {
        Self::new(EapCode::Failure, identifier, None, Vec::new())
    }

    /// Parse an EAP packet.
    ///
    /// Bytes past the declared Length are ignored. An unknown Type octet is an
    /// error so that callers never see a Request/Response without a type.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EapError> {
        if bytes.len() < Self::HEADER_LENGTH {
            return Err(EapError::PacketTooShort {
                expected: Self::HEADER_LENGTH,
                actual: bytes.len(),
            });
        }

        let code = EapCode::from_u8(bytes[0]).ok_or(EapError::InvalidCode(bytes[0]))?;
        let identifier = bytes[1];
        let length = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;

        if length < Self::HEADER_LENGTH {
            return Err(EapError::InvalidLength(length));
        }
        if bytes.len() < length {
            return Err(EapError::PacketTooShort {
                expected: length,
                actual: bytes.len(),
            });
        }

        let (eap_type, data) = if code.has_type() {
            if length < Self::HEADER_LENGTH + 1 {
                return Err(EapError::InvalidLength(length));
            }
            let type_byte = bytes[4];
            let eap_type = EapType::from_u8(type_byte).ok_or(EapError::UnknownType(type_byte))?;
            (Some(eap_type), bytes[5..length].to_vec())
        } else {
            (None, Vec::new())
        };

        Ok(EapPacket {
            code,
            identifier,
            eap_type,
            data,
        })
    }

    /// Encode to bytes. A Request/Response without a type is written as a bare
    /// header so that the Length field always matches the output.
    pub fn to_bytes(&self) -> Vec<u8> {
        let length = self.length();
        let mut bytes = Vec::with_capacity(length);
        bytes.push(self.code.as_u8());
        bytes.push(self.identifier);
        bytes.extend_from_slice(&(length as u16).to_be_bytes());

        if self.code.has_type() {
            if let Some(eap_type) = self.eap_type {
                bytes.push(eap_type.as_u8());
                bytes.extend_from_slice(&self.data);
            }
        }

        bytes
    }

    /// Total encoded length
    pub fn length(&self) -> usize {
        match (self.code.has_type(), self.eap_type) {
            (true, Some(_)) => Self::HEADER_LENGTH + 1 + self.data.len(),
            _ => Self::HEADER_LENGTH,
        }
    }

    pub fn is_type(&self, eap_type: EapType) -> bool {
        self.eap_type == Some(eap_type)
    }
}

/// EAP-related errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EapError {
    #[error("Packet too short: expected at least {expected} bytes, got {actual}")]
    PacketTooShort { expected: usize, actual: usize },

    #[error("Invalid EAP code: {0}")]
    InvalidCode(u8),

    #[error("Invalid packet length: {0}")]
    InvalidLength(usize),

    #[error("Unknown EAP type: {0}")]
    UnknownType(u8),

    #[error("Unexpected EAP type: expected {expected:?}, got {actual:?}")]
    UnexpectedType {
        expected: EapType,
        actual: Option<EapType>,
    },

    #[error("AVP at offset {offset} declares {declared} value bytes, only {available} left")]
    AvpOverrun {
        offset: usize,
        declared: usize,
        available: usize,
    },

    #[error("Invalid challenge length: {0}")]
    InvalidChallengeLength(usize),

    #[error("Invalid response format")]
    InvalidResponseFormat,

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Reassembled message length {actual} does not match declared {declared}")]
    MessageLengthMismatch { declared: usize, actual: usize },

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[cfg(feature = "tls")]
    #[error("TLS error: {0}")]
    TlsError(String),

    #[cfg(feature = "tls")]
    #[error("Certificate error: {0}")]
    CertificateError(String),

    #[cfg(feature = "tls")]
    #[error("IO error: {0}")]
    IoError(String),
}

/// Legacy-Nak Type-Data (RFC 3748 Section 5.3.1)
///
/// One octet per method the peer would accept. A single `0` means the peer has
/// no alternative to propose.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyNak {
    pub desired: Vec<u8>,
}

impl LegacyNak {
    pub fn decode(data: &[u8]) -> Self {
        LegacyNak {
            desired: data.iter().copied().filter(|&t| t != 0).collect(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        if self.desired.is_empty() {
            vec![0]
        } else {
            self.desired.clone()
        }
    }

    /// Desired types this implementation recognises, in the peer's order
    pub fn desired_types(&self) -> Vec<EapType> {
        self.desired.iter().filter_map(|&t| EapType::from_u8(t)).collect()
    }
}

/// Split an EAP packet into EAP-Message attributes (RFC 3579 Section 3.1)
///
/// Anything longer than 253 bytes spans several consecutive attributes.
pub fn eap_to_radius_attributes(eap_packet: &EapPacket) -> Result<Vec<Attribute>, EapError> {
    eap_packet
        .to_bytes()
        .chunks(Attribute::MAX_VALUE_LENGTH)
        .map(|chunk| {
            Attribute::new(AttributeType::EapMessage as u8, chunk.to_vec()).map_err(|e| {
                EapError::EncodingError(format!("Failed to create EAP-Message attribute: {}", e))
            })
        })
        .collect()
}

fn eap_message_bytes(radius_packet: &Packet) -> Vec<u8> {
    let eap_message_type = AttributeType::EapMessage as u8;
    radius_packet
        .attributes
        .iter()
        .filter(|attr| attr.attr_type == eap_message_type)
        .flat_map(|attr| attr.value.iter().copied())
        .collect()
}

/// Reassemble every EAP-Message attribute of `radius_packet`, in order, and
/// decode the result. `Ok(None)` when the packet carries none.
pub fn eap_from_radius_packet(radius_packet: &Packet) -> Result<Option<EapPacket>, EapError> {
    let eap_bytes = eap_message_bytes(radius_packet);
    if eap_bytes.is_empty() {
        return Ok(None);
    }

    EapPacket::from_bytes(&eap_bytes).map(Some)
}

/// Identifier byte of the reassembled EAP-Message, read straight from the
/// header so it survives a packet that does not decode
pub fn eap_identifier_from_radius_packet(radius_packet: &Packet) -> Option<u8> {
    eap_message_bytes(radius_packet).get(1).copied()
}

pub fn add_eap_to_radius_packet(
    radius_packet: &mut Packet,
    eap_packet: &EapPacket,
) -> Result<(), EapError> {
    for attr in eap_to_radius_attributes(eap_packet)? {
        radius_packet.add_attribute(attr);
    }
    Ok(())
}
