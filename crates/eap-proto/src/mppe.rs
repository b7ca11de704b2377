//! Microsoft MPPE key attributes (RFC 2548 Sections 2.4.2 and 2.4.3)
//!
//! An Access-Accept that concludes a key-generating EAP method hands the MSK to
//! the NAS as MS-MPPE-Recv-Key (first 32 octets) and MS-MPPE-Send-Key (next 32
//! octets). Each key is salt-encrypted with the shared secret and the Request
//! Authenticator:
//!
//! ```text
//! P    = key-length || key || zero padding to a multiple of 16
//! b(1) = MD5(secret || request-authenticator || salt)   c(1) = p(1) xor b(1)
//! b(i) = MD5(secret || c(i-1))                          c(i) = p(i) xor b(i)
//! value = salt || c(1) || ... || c(n)
//! ```

use crate::attributes::Attribute;
use crate::packet::PacketError;
use rand::Rng;

pub const VENDOR_MICROSOFT: u32 = 311;
pub const MS_MPPE_SEND_KEY: u8 = 16;
pub const MS_MPPE_RECV_KEY: u8 = 17;

const BLOCK: usize = 16;

/// Random salt with the high bit set
pub fn generate_salt() -> [u8; 2] {
    let mut salt = [0u8; 2];
    rand::rng().fill(&mut salt);
    salt[0] |= 0x80;
    salt
}

pub fn encrypt_key(
    key: &[u8],
    secret: &[u8],
    request_authenticator: &[u8; 16],
    salt: [u8; 2],
) -> Result<Vec<u8>, PacketError> {
    if key.len() > u8::MAX as usize {
        return Err(PacketError::AttributeError(format!(
            "MPPE key too long: {} bytes",
            key.len()
        )));
    }

    let mut plain = Vec::with_capacity(1 + key.len() + BLOCK);
    plain.push(key.len() as u8);
    plain.extend_from_slice(key);
    let padded = plain.len().div_ceil(BLOCK) * BLOCK;
    plain.resize(padded, 0);

    let mut output = Vec::with_capacity(2 + plain.len());
    output.extend_from_slice(&salt);

    let mut seed = Vec::with_capacity(secret.len() + 16 + 2);
    seed.extend_from_slice(secret);
    seed.extend_from_slice(request_authenticator);
    seed.extend_from_slice(&salt);

    for block in plain.chunks(BLOCK) {
        let b = md5::compute(&seed).0;
        let cipher: Vec<u8> = block.iter().zip(b.iter()).map(|(p, k)| p ^ k).collect();
        seed.clear();
        seed.extend_from_slice(secret);
        seed.extend_from_slice(&cipher);
        output.extend_from_slice(&cipher);
    }

    Ok(output)
}

/// Inverse of [`encrypt_key`], returns the key without padding
pub fn decrypt_key(
    value: &[u8],
    secret: &[u8],
    request_authenticator: &[u8; 16],
) -> Result<Vec<u8>, PacketError> {
    if value.len() < 2 + BLOCK || (value.len() - 2) % BLOCK != 0 {
        return Err(PacketError::AttributeError(format!(
            "Invalid MPPE key attribute length: {}",
            value.len()
        )));
    }

    let (salt, cipher) = value.split_at(2);
    let mut seed = Vec::with_capacity(secret.len() + 16 + 2);
    seed.extend_from_slice(secret);
    seed.extend_from_slice(request_authenticator);
    seed.extend_from_slice(salt);

    let mut plain = Vec::with_capacity(cipher.len());
    for block in cipher.chunks(BLOCK) {
        let b = md5::compute(&seed).0;
        plain.extend(block.iter().zip(b.iter()).map(|(c, k)| c ^ k));
        seed.clear();
        seed.extend_from_slice(secret);
        seed.extend_from_slice(block);
    }

    let key_length = plain[0] as usize;
    if 1 + key_length > plain.len() {
        return Err(PacketError::AttributeError(format!(
            "MPPE key length {} exceeds attribute",
            key_length
        )));
    }
    Ok(plain[1..1 + key_length].to_vec())
}

/// MS-MPPE-Recv-Key and MS-MPPE-Send-Key attributes for `msk`
pub fn mppe_key_attributes(
    msk: &[u8],
    secret: &[u8],
    request_authenticator: &[u8; 16],
) -> Result<Vec<Attribute>, PacketError> {
    if msk.len() < 64 {
        return Err(PacketError::AttributeError(format!(
            "MSK too short: {} bytes",
            msk.len()
        )));
    }

    let recv = encrypt_key(&msk[..32], secret, request_authenticator, generate_salt())?;
    let send = encrypt_key(&msk[32..64], secret, request_authenticator, generate_salt())?;
    Ok(vec![
        Attribute::vendor_specific(VENDOR_MICROSOFT, MS_MPPE_RECV_KEY, &recv)?,
        Attribute::vendor_specific(VENDOR_MICROSOFT, MS_MPPE_SEND_KEY, &send)?,
    ])
}
