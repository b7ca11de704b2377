//! EAP-MD5-Challenge (RFC 3748 Section 5.4)
//!
//! ```text
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Value-Size   |  Value ...  |  Name ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The response Value is `MD5(identifier || secret || challenge)` where the
//! identifier is the one of the Request that carried the challenge.

use super::{EapError, EapPacket, EapType};

pub const MD5_CHALLENGE_SIZE: usize = 16;
pub const MD5_RESPONSE_SIZE: usize = 16;

/// Value and optional Name of an MD5-Challenge Request or Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Md5Value {
    pub value: Vec<u8>,
    pub name: String,
}

impl Md5Value {
    pub fn decode(data: &[u8]) -> Result<Self, EapError> {
        let (&value_size, rest) = data
            .split_first()
            .ok_or(EapError::InvalidChallengeLength(0))?;
        let value_size = value_size as usize;
        if value_size == 0 || rest.len() < value_size {
            return Err(EapError::InvalidChallengeLength(value_size));
        }

        Ok(Md5Value {
            value: rest[..value_size].to_vec(),
            name: String::from_utf8_lossy(&rest[value_size..]).to_string(),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, EapError> {
        if self.value.is_empty() || self.value.len() > u8::MAX as usize {
            return Err(EapError::InvalidChallengeLength(self.value.len()));
        }
        let mut data = Vec::with_capacity(1 + self.value.len() + self.name.len());
        data.push(self.value.len() as u8);
        data.extend_from_slice(&self.value);
        data.extend_from_slice(self.name.as_bytes());
        Ok(data)
    }

    /// Response hash, when the value has the right size for one
    pub fn response_hash(&self) -> Result<[u8; MD5_RESPONSE_SIZE], EapError> {
        <[u8; MD5_RESPONSE_SIZE]>::try_from(self.value.as_slice())
            .map_err(|_| EapError::InvalidChallengeLength(self.value.len()))
    }
}

/// Build a Request/MD5-Challenge
pub fn create_challenge(identifier: u8, challenge: &[u8], name: &str) -> Result<EapPacket, EapError> {
    let data = Md5Value {
        value: challenge.to_vec(),
        name: name.to_string(),
    }
    .encode()?;
    Ok(EapPacket::request(identifier, EapType::Md5Challenge, data))
}

/// Build a Response/MD5-Challenge, as a peer would
pub fn create_response(identifier: u8, response_hash: &[u8; 16], name: &str) -> EapPacket {
    let mut data = Vec::with_capacity(1 + MD5_RESPONSE_SIZE + name.len());
    data.push(MD5_RESPONSE_SIZE as u8);
    data.extend_from_slice(response_hash);
    data.extend_from_slice(name.as_bytes());
    EapPacket::response(identifier, EapType::Md5Challenge, data)
}

pub fn compute_response_hash(identifier: u8, secret: &[u8], challenge: &[u8]) -> [u8; 16] {
    let mut data = Vec::with_capacity(1 + secret.len() + challenge.len());
    data.push(identifier);
    data.extend_from_slice(secret);
    data.extend_from_slice(challenge);
    md5::compute(&data).0
}

pub fn verify_response(
    identifier: u8,
    secret: &[u8],
    challenge: &[u8],
    response_hash: &[u8; 16],
) -> bool {
    compute_response_hash(identifier, secret, challenge) == *response_hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_round_trip() {
        let challenge = [0x11u8; MD5_CHALLENGE_SIZE];
        let packet = create_challenge(4, &challenge, "server").unwrap();
        assert!(packet.is_type(EapType::Md5Challenge));
        assert_eq!(packet.data[0], 16);

        let parsed = Md5Value::decode(&packet.data).unwrap();
        assert_eq!(parsed.value, challenge);
        assert_eq!(parsed.name, "server");
    }

    #[test]
    fn test_response_verifies() {
        let challenge = [7u8; 16];
        let hash = compute_response_hash(5, b"password", &challenge);
        let response = create_response(5, &hash, "alice");

        let parsed = Md5Value::decode(&response.data).unwrap();
        let received = parsed.response_hash().unwrap();
        assert!(verify_response(5, b"password", &challenge, &received));
        assert!(!verify_response(6, b"password", &challenge, &received));
        assert!(!verify_response(5, b"wrong", &challenge, &received));
    }

    #[test]
    fn test_rfc_hash_layout() {
        let mut manual = vec![1u8];
        manual.extend_from_slice(b"pw");
        manual.extend_from_slice(&[1, 2, 3]);
        assert_eq!(compute_response_hash(1, b"pw", &[1, 2, 3]), md5::compute(&manual).0);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(Md5Value::decode(&[]), Err(EapError::InvalidChallengeLength(0)));
        assert_eq!(Md5Value::decode(&[0]), Err(EapError::InvalidChallengeLength(0)));
        assert_eq!(Md5Value::decode(&[16, 1, 2]), Err(EapError::InvalidChallengeLength(16)));
    }

    #[test]
    fn test_short_value_is_not_a_hash() {
        let parsed = Md5Value::decode(&[2, 9, 9]).unwrap();
        assert!(parsed.response_hash().is_err());
    }
}
