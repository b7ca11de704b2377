/// RADIUS packet codes that take part in an EAP exchange (RFC 2865 Section 4, RFC 3579)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Code {
    /// Access-Request (1), carries the peer's EAP-Message
    AccessRequest = 1,
    /// Access-Accept (2), conversation ended in EAP Success
    AccessAccept = 2,
    /// Access-Reject (3), conversation ended in EAP Failure or a server fault
    AccessReject = 3,
    /// Access-Challenge (11), another EAP round follows
    AccessChallenge = 11,
}

impl Code {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Code::AccessRequest),
            2 => Some(Code::AccessAccept),
            3 => Some(Code::AccessReject),
            11 => Some(Code::AccessChallenge),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// True for the three codes a server may answer an Access-Request with
    pub fn is_response(self) -> bool {
        !matches!(self, Code::AccessRequest)
    }
}
