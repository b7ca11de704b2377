//! EAP-over-RADIUS wire codec
//!
//! Pure, synchronous encoders and decoders used by the EAP server:
//!
//! - RADIUS packets and attributes (RFC 2865)
//! - Request/Response Authenticator (RFC 2865) and Message-Authenticator (RFC 3579)
//! - EAP packets, EAP-Message encapsulation and Legacy-Nak (RFC 3748, RFC 3579)
//! - PEAP extension AVPs
//! - EAP-TLS/PEAP fragment framing and rustls configuration (feature `tls`)
//! - MS-MPPE key attributes (RFC 2548)
//!
//! Every decoder returns an error on malformed input; none of them panic.
//!
//! # Example
//!
//! ```rust
//! use eap_proto::{Code, EapPacket, Packet};
//! use eap_proto::eap::{add_eap_to_radius_packet, eap_from_radius_packet};
//!
//! let mut request = Packet::new(Code::AccessRequest, 1, [0u8; 16]);
//! add_eap_to_radius_packet(&mut request, &EapPacket::identity_response(0, "alice")).unwrap();
//!
//! let bytes = request.encode().unwrap();
//! let decoded = Packet::decode(&bytes).unwrap();
//! let eap = eap_from_radius_packet(&decoded).unwrap().unwrap();
//! assert_eq!(eap.data, b"alice");
//! ```

pub mod attributes;
pub mod auth;
pub mod eap;
pub mod message_auth;
pub mod mppe;
pub mod packet;

pub use attributes::{Attribute, AttributeType};
pub use auth::{
    calculate_response_authenticator, generate_request_authenticator,
    verify_response_authenticator,
};
pub use eap::{EapCode, EapError, EapPacket, EapType};
pub use message_auth::{calculate_message_authenticator, verify_message_authenticator};
pub use packet::{Code, Packet, PacketError};
