use super::Code;
use crate::attributes::{Attribute, AttributeType};
use std::io::{self, Cursor, Read, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PacketError {
    #[error("Invalid packet length: {0}")]
    InvalidLength(usize),
    #[error("Invalid packet code: {0}")]
    InvalidCode(u8),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Attribute error: {0}")]
    AttributeError(String),
    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),
}

/// RADIUS Packet structure as defined in RFC 2865 Section 3
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Code      |  Identifier   |            Length             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         Authenticator                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Attributes ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-
/// ```
#[derive(Debug, Clone)]
pub struct Packet {
    pub code: Code,
    pub identifier: u8,
    /// Request Authenticator on requests, Response Authenticator on replies
    pub authenticator: [u8; 16],
    pub attributes: Vec<Attribute>,
}

impl Packet {
    /// Minimum RADIUS packet size (20 bytes: 1 code + 1 id + 2 length + 16 authenticator)
    pub const MIN_PACKET_SIZE: usize = 20;
    /// Maximum RADIUS packet size (4096 bytes as per RFC 2865)
    pub const MAX_PACKET_SIZE: usize = 4096;

    pub fn new(code: Code, identifier: u8, authenticator: [u8; 16]) -> Self {
        Packet {
            code,
            identifier,
            authenticator,
            attributes: Vec::new(),
        }
    }

    /// Start a reply to `request`: same identifier, Request Authenticator copied in
    /// until the Response Authenticator is computed.
    pub fn reply_to(request: &Packet, code: Code) -> Self {
        Packet::new(code, request.identifier, request.authenticator)
    }

    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    /// Replace every attribute of this type with `attribute`, keeping the position
    /// of the first one if it existed.
    pub fn set_attribute(&mut self, attribute: Attribute) {
        match self
            .attributes
            .iter()
            .position(|a| a.attr_type == attribute.attr_type)
        {
            Some(index) => {
                let attr_type = attribute.attr_type;
                self.attributes[index] = attribute;
                let mut seen = 0usize;
                self.attributes.retain(|a| {
                    if a.attr_type != attr_type {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => self.attributes.push(attribute),
        }
    }

    pub fn remove_attributes(&mut self, attr_type: u8) {
        self.attributes.retain(|a| a.attr_type != attr_type);
    }

    /// Encode packet to bytes
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let mut buffer = Vec::with_capacity(self.length());

        buffer.write_all(&[self.code.as_u8(), self.identifier])?;

        // Length is patched once the attributes are written
        let length_pos = buffer.len();
        buffer.write_all(&[0, 0])?;
        buffer.write_all(&self.authenticator)?;

        for attr in &self.attributes {
            let attr_bytes = attr.encode()?;
            buffer.write_all(&attr_bytes)?;
        }

        let total_length = buffer.len();
        if total_length > Self::MAX_PACKET_SIZE {
            return Err(PacketError::PacketTooLarge(total_length));
        }

        buffer[length_pos..length_pos + 2].copy_from_slice(&(total_length as u16).to_be_bytes());

        Ok(buffer)
    }

    /// Decode packet from bytes
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::MIN_PACKET_SIZE {
            return Err(PacketError::InvalidLength(data.len()));
        }

        let mut cursor = Cursor::new(data);

        let mut header = [0u8; 4];
        cursor.read_exact(&mut header)?;
        let code = Code::from_u8(header[0]).ok_or(PacketError::InvalidCode(header[0]))?;
        let identifier = header[1];
        let length = u16::from_be_bytes([header[2], header[3]]) as usize;

        if !(Self::MIN_PACKET_SIZE..=Self::MAX_PACKET_SIZE).contains(&length) {
            return Err(PacketError::InvalidLength(length));
        }
        if data.len() < length {
            return Err(PacketError::InvalidLength(data.len()));
        }

        let mut authenticator = [0u8; 16];
        cursor.read_exact(&mut authenticator)?;

        // Bytes past the declared length are padding and ignored (RFC 2865 Section 3)
        let mut attributes = Vec::new();
        let mut attr_data = &data[Self::MIN_PACKET_SIZE..length];
        while !attr_data.is_empty() {
            let attr = Attribute::decode(attr_data)?;
            attr_data = &attr_data[attr.encoded_length()..];
            attributes.push(attr);
        }

        Ok(Packet {
            code,
            identifier,
            authenticator,
            attributes,
        })
    }

    /// Get the length of the encoded packet
    pub fn length(&self) -> usize {
        Self::MIN_PACKET_SIZE
            + self
                .attributes
                .iter()
                .map(Attribute::encoded_length)
                .sum::<usize>()
    }

    /// Find first attribute by type
    pub fn find_attribute(&self, attr_type: u8) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.attr_type == attr_type)
    }

    /// Find all attributes by type
    pub fn find_all_attributes(&self, attr_type: u8) -> Vec<&Attribute> {
        self.attributes
            .iter()
            .filter(|a| a.attr_type == attr_type)
            .collect()
    }

    /// Offset of the first attribute value of `attr_type` inside the encoded packet
    pub fn attribute_value_offset(&self, attr_type: u8) -> Option<usize> {
        let mut offset = Self::MIN_PACKET_SIZE;
        for attr in &self.attributes {
            if attr.attr_type == attr_type {
                return Some(offset + Attribute::MIN_LENGTH);
            }
            offset += attr.encoded_length();
        }
        None
    }

    /// Raw value of the State attribute, the conversation correlation token
    pub fn state(&self) -> Option<&[u8]> {
        self.find_attribute(AttributeType::State as u8)
            .map(|attr| attr.value.as_slice())
    }
}
