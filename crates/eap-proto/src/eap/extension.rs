//! PEAP extension AVPs (draft-josefsson-pppext-eap-tls-eap Section 4)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |M|R|         AVP Type          |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                              Value...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Length counts the value only. The type/flags word is kept as received so a
//! decoded payload re-encodes to the same bytes.

use super::EapError;

/// Type of the Result AVP
pub const AVP_TYPE_RESULT: u16 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionAvp {
    /// M bit, R bit and 14-bit type, as on the wire
    pub type_flags: u16,
    pub value: Vec<u8>,
}

impl ExtensionAvp {
    pub const HEADER_LENGTH: usize = 4;
    pub const MANDATORY_FLAG: u16 = 0x8000;
    pub const RESERVED_FLAG: u16 = 0x4000;
    pub const TYPE_MASK: u16 = 0x3FFF;

    pub fn new(avp_type: u16, mandatory: bool, value: Vec<u8>) -> Self {
        let mut type_flags = avp_type & Self::TYPE_MASK;
        if mandatory {
            type_flags |= Self::MANDATORY_FLAG;
        }
        ExtensionAvp { type_flags, value }
    }

    pub fn avp_type(&self) -> u16 {
        self.type_flags & Self::TYPE_MASK
    }

    pub fn is_mandatory(&self) -> bool {
        self.type_flags & Self::MANDATORY_FLAG != 0
    }

    pub fn encoded_length(&self) -> usize {
        Self::HEADER_LENGTH + self.value.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_length());
        bytes.extend_from_slice(&self.type_flags.to_be_bytes());
        bytes.extend_from_slice(&(self.value.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&self.value);
        bytes
    }
}

/// Outcome carried by a Result AVP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ExtensionResult {
    Success = 1,
    Failure = 2,
}

impl ExtensionResult {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Success),
            2 => Some(Self::Failure),
            _ => None,
        }
    }

    pub fn to_avp(self) -> ExtensionAvp {
        ExtensionAvp::new(AVP_TYPE_RESULT, true, (self as u16).to_be_bytes().to_vec())
    }
}

/// Type-Data of a PEAP-Extension (type 33) packet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionPayload {
    pub avps: Vec<ExtensionAvp>,
}

impl ExtensionPayload {
    pub fn result(result: ExtensionResult) -> Self {
        ExtensionPayload {
            avps: vec![result.to_avp()],
        }
    }

    /// Parse AVPs until fewer than a header's worth of bytes remain.
    ///
    /// A trailing remainder shorter than 4 bytes is ignored. A declared length
    /// running past the end of `raw` is an error.
    pub fn decode(raw: &[u8]) -> Result<Self, EapError> {
        let mut avps = Vec::new();
        let mut offset = 0;

        while raw.len() - offset >= ExtensionAvp::HEADER_LENGTH {
            let type_flags = u16::from_be_bytes([raw[offset], raw[offset + 1]]);
            let declared = u16::from_be_bytes([raw[offset + 2], raw[offset + 3]]) as usize;
            let value_start = offset + ExtensionAvp::HEADER_LENGTH;
            let available = raw.len() - value_start;
            if declared > available {
                return Err(EapError::AvpOverrun {
                    offset,
                    declared,
                    available,
                });
            }

            avps.push(ExtensionAvp {
                type_flags,
                value: raw[value_start..value_start + declared].to_vec(),
            });
            offset = value_start + declared;
        }

        Ok(ExtensionPayload { avps })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.avps.iter().map(ExtensionAvp::encoded_length).sum());
        for avp in &self.avps {
            bytes.extend_from_slice(&avp.to_bytes());
        }
        bytes
    }

    /// Value of the first Result AVP, if any
    pub fn result_value(&self) -> Option<ExtensionResult> {
        self.avps
            .iter()
            .find(|avp| avp.avp_type() == AVP_TYPE_RESULT)
            .filter(|avp| avp.value.len() >= 2)
            .and_then(|avp| ExtensionResult::from_u16(u16::from_be_bytes([avp.value[0], avp.value[1]])))
    }
}
