//! Retransmission detection
//!
//! A NAS that times out resends the very same Access-Request: same
//! Identifier, same Request Authenticator (RFC 2865 Section 2). Running the
//! negotiation again for it would hand out a fresh MD5 challenge or pop the
//! next TLS fragment, so the conversation keeps the last reply it sent and
//! answers a retransmission with that reply unchanged.

use eap_proto::Packet;

/// Identifies a RADIUS request across retransmissions
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct RequestFingerprint {
    pub identifier: u8,
    pub authenticator: [u8; 16],
}

impl RequestFingerprint {
    pub fn new(identifier: u8, authenticator: &[u8; 16]) -> Self {
        RequestFingerprint {
            identifier,
            authenticator: *authenticator,
        }
    }

    pub fn of(request: &Packet) -> Self {
        Self::new(request.identifier, &request.authenticator)
    }
}

/// Finished reply to the most recent request of a conversation
#[derive(Debug, Clone)]
pub(crate) struct LastReply {
    pub fingerprint: RequestFingerprint,
    pub reply: Packet,
}
