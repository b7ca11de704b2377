use crate::packet::PacketError;

use super::AttributeType;

/// RADIUS Attribute structure as defined in RFC 2865 Section 5
///
/// ```text
///  0                   1                   2
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Type      |    Length     |  Value ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub attr_type: u8,
    /// Attribute value (0-253 bytes)
    pub value: Vec<u8>,
}

impl Attribute {
    /// Type and length octets
    pub const MIN_LENGTH: usize = 2;
    pub const MAX_LENGTH: usize = 255;
    pub const MAX_VALUE_LENGTH: usize = 253;

    pub fn new(attr_type: u8, value: Vec<u8>) -> Result<Self, PacketError> {
        if value.len() > Self::MAX_VALUE_LENGTH {
            return Err(PacketError::AttributeError(format!(
                "Attribute value too long: {} bytes (max {})",
                value.len(),
                Self::MAX_VALUE_LENGTH
            )));
        }
        Ok(Attribute { attr_type, value })
    }

    /// Create a string attribute
    pub fn string(attr_type: u8, value: impl Into<String>) -> Result<Self, PacketError> {
        Self::new(attr_type, value.into().into_bytes())
    }

    /// Vendor-Specific attribute (RFC 2865 Section 5.26) with a single
    /// vendor sub-attribute: Vendor-Id (4) | Vendor-Type (1) | Vendor-Length (1) | data
    pub fn vendor_specific(vendor_id: u32, vendor_type: u8, data: &[u8]) -> Result<Self, PacketError> {
        let vendor_length = data.len() + 2;
        if vendor_length > u8::MAX as usize {
            return Err(PacketError::AttributeError(format!(
                "Vendor attribute too long: {} bytes",
                vendor_length
            )));
        }
        let mut value = Vec::with_capacity(4 + vendor_length);
        value.extend_from_slice(&vendor_id.to_be_bytes());
        value.push(vendor_type);
        value.push(vendor_length as u8);
        value.extend_from_slice(data);
        Self::new(AttributeType::VendorSpecific as u8, value)
    }

    /// Split a Vendor-Specific value into (vendor id, vendor type, data)
    pub fn as_vendor_specific(&self) -> Result<(u32, u8, &[u8]), PacketError> {
        if self.attr_type != AttributeType::VendorSpecific as u8 || self.value.len() < 6 {
            return Err(PacketError::AttributeError(
                "Not a Vendor-Specific attribute".to_string(),
            ));
        }
        let vendor_id = u32::from_be_bytes([self.value[0], self.value[1], self.value[2], self.value[3]]);
        let vendor_type = self.value[4];
        let vendor_length = self.value[5] as usize;
        if vendor_length < 2 || 4 + vendor_length > self.value.len() {
            return Err(PacketError::AttributeError(format!(
                "Invalid vendor attribute length: {}",
                vendor_length
            )));
        }
        Ok((vendor_id, vendor_type, &self.value[6..4 + vendor_length]))
    }

    /// Encode attribute to bytes
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let length = self.encoded_length();
        if length > Self::MAX_LENGTH {
            return Err(PacketError::AttributeError(format!(
                "Encoded attribute too long: {} bytes",
                length
            )));
        }

        let mut buffer = Vec::with_capacity(length);
        buffer.push(self.attr_type);
        buffer.push(length as u8);
        buffer.extend_from_slice(&self.value);
        Ok(buffer)
    }

    /// Decode the first attribute in `data`
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::MIN_LENGTH {
            return Err(PacketError::AttributeError(format!(
                "Attribute data too short: {} bytes",
                data.len()
            )));
        }

        let attr_type = data[0];
        let length = data[1] as usize;

        if length < Self::MIN_LENGTH {
            return Err(PacketError::AttributeError(format!(
                "Invalid attribute length: {}",
                length
            )));
        }
        if data.len() < length {
            return Err(PacketError::AttributeError(format!(
                "Insufficient data for attribute: expected {}, got {}",
                length,
                data.len()
            )));
        }

        Ok(Attribute {
            attr_type,
            value: data[Self::MIN_LENGTH..length].to_vec(),
        })
    }

    pub fn encoded_length(&self) -> usize {
        Self::MIN_LENGTH + self.value.len()
    }

    /// Try to interpret value as a string
    pub fn as_string(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.value.clone())
    }
}
