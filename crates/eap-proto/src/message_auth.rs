//! Message-Authenticator (RFC 2869 Section 5.14, RFC 3579 Section 3.2)
//!
//! HMAC-MD5 keyed with the shared secret over the whole RADIUS packet, with the
//! Message-Authenticator value zeroed during the calculation. Any packet that
//! carries an EAP-Message must carry one.
//!
//! For Access-Request the authenticator field holds the Request Authenticator.
//! For replies it also holds the *Request* Authenticator of the request being
//! answered; the Response Authenticator is computed afterwards.

use crate::attributes::{Attribute, AttributeType};
use crate::packet::{Packet, PacketError};
use hmac::{Hmac, Mac};
use md5_digest::Md5;

type HmacMd5 = Hmac<Md5>;

/// Width of the Message-Authenticator value
pub const MESSAGE_AUTHENTICATOR_LENGTH: usize = 16;

/// Calculate Message-Authenticator over `packet_bytes`, which must already have
/// the Message-Authenticator value set to zeros.
pub fn calculate_message_authenticator(
    packet_bytes: &[u8],
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    let mut mac = HmacMd5::new_from_slice(secret)
        .map_err(|e| PacketError::AttributeError(format!("Invalid HMAC key: {}", e)))?;
    mac.update(packet_bytes);

    let mut output = [0u8; MESSAGE_AUTHENTICATOR_LENGTH];
    output.copy_from_slice(&mac.finalize().into_bytes());
    Ok(output)
}

/// Verify the Message-Authenticator whose value starts at `message_auth_offset`
/// in the raw packet bytes.
pub fn verify_message_authenticator(
    packet_bytes: &[u8],
    secret: &[u8],
    message_auth_offset: usize,
) -> bool {
    let end = message_auth_offset + MESSAGE_AUTHENTICATOR_LENGTH;
    if end > packet_bytes.len() {
        return false;
    }

    let mut packet_copy = packet_bytes.to_vec();
    packet_copy[message_auth_offset..end].fill(0);

    match calculate_message_authenticator(&packet_copy, secret) {
        Ok(expected) => packet_bytes[message_auth_offset..end] == expected,
        Err(_) => false,
    }
}

/// Check the Message-Authenticator of a received request.
///
/// Returns `None` when the packet carries none, otherwise whether it is valid.
pub fn verify_request(packet: &Packet, secret: &[u8]) -> Option<bool> {
    let attr = packet.find_attribute(AttributeType::MessageAuthenticator as u8)?;
    if attr.value.len() != MESSAGE_AUTHENTICATOR_LENGTH {
        return Some(false);
    }
    let offset = packet.attribute_value_offset(AttributeType::MessageAuthenticator as u8)?;
    let bytes = match packet.encode() {
        Ok(bytes) => bytes,
        Err(_) => return Some(false),
    };
    Some(verify_message_authenticator(&bytes, secret, offset))
}

/// Sign a reply in place.
///
/// Sets the Message-Authenticator to zeros, serialises the reply with the
/// Request Authenticator in the authenticator field, computes the HMAC and
/// overwrites the zeros with it. The authenticator field itself is left for the
/// Response Authenticator calculation.
pub fn sign_response(
    packet: &mut Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<(), PacketError> {
    packet.set_attribute(Attribute::new(
        AttributeType::MessageAuthenticator as u8,
        vec![0u8; MESSAGE_AUTHENTICATOR_LENGTH],
    )?);

    let mut zeroed = packet.clone();
    zeroed.authenticator = *request_authenticator;
    let digest = calculate_message_authenticator(&zeroed.encode()?, secret)?;

    packet.set_attribute(Attribute::new(
        AttributeType::MessageAuthenticator as u8,
        digest.to_vec(),
    )?);
    Ok(())
}
