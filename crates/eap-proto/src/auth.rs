use crate::packet::{Packet, PacketError};
use rand::Rng;

/// Generate a random Request Authenticator (16 bytes) per RFC 2865 Section 3
pub fn generate_request_authenticator() -> [u8; 16] {
    let mut rng = rand::rng();
    let mut authenticator = [0u8; 16];
    rng.fill(&mut authenticator);
    authenticator
}

/// Calculate Response Authenticator per RFC 2865 Section 3
///
/// Response Authenticator = MD5(Code + ID + Length + Request Authenticator + Attributes + Secret)
///
/// Must run after every attribute, Message-Authenticator included, is final.
pub fn calculate_response_authenticator(
    packet: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    let mut response = packet.clone();
    response.authenticator = *request_authenticator;
    let mut data = response.encode()?;
    data.extend_from_slice(secret);

    Ok(md5::compute(&data).0)
}

/// Verify Response Authenticator
///
/// Verifies that the Response Authenticator matches the expected value
/// calculated from the request and secret.
pub fn verify_response_authenticator(
    response: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> bool {
    calculate_response_authenticator(response, request_authenticator, secret)
        .map(|calculated| calculated == response.authenticator)
        .unwrap_or(false)
}
