//! EAP-TLS framing (RFC 5216) shared by EAP-TLS and PEAP
//!
//! Type-Data of both methods starts with a flags octet, optionally followed by
//! the four-byte total TLS message length, then a slice of the TLS record
//! stream. PEAP uses the low three flag bits for its version.
//!
//! Also hosts certificate loading and rustls `ServerConfig` construction.

use super::{EapError, EapPacket, EapType};
use pki_types::{CertificateDer, PrivateKeyDer};
use std::sync::Arc;

/// Flags octet
///
/// ```text
///  0 1 2 3 4 5 6 7
/// +-+-+-+-+-+-+-+-+
/// |L M S R R V V V|
/// +-+-+-+-+-+-+-+-+
/// ```
///
/// V bits are only meaningful for PEAP and are zero for EAP-TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TlsFlags(u8);

impl TlsFlags {
    pub const LENGTH_INCLUDED: u8 = 0x80;
    pub const MORE_FRAGMENTS: u8 = 0x40;
    pub const START: u8 = 0x20;
    pub const VERSION_MASK: u8 = 0x07;

    pub fn new(length_included: bool, more_fragments: bool, start: bool) -> Self {
        let mut flags = 0u8;
        if length_included {
            flags |= Self::LENGTH_INCLUDED;
        }
        if more_fragments {
            flags |= Self::MORE_FRAGMENTS;
        }
        if start {
            flags |= Self::START;
        }
        TlsFlags(flags)
    }

    /// Reserved bits are dropped
    pub fn from_u8(value: u8) -> Self {
        TlsFlags(value & (0xE0 | Self::VERSION_MASK))
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }

    pub fn with_version(self, version: u8) -> Self {
        TlsFlags((self.0 & !Self::VERSION_MASK) | (version & Self::VERSION_MASK))
    }

    pub fn version(self) -> u8 {
        self.0 & Self::VERSION_MASK
    }

    pub fn length_included(self) -> bool {
        (self.0 & Self::LENGTH_INCLUDED) != 0
    }

    pub fn more_fragments(self) -> bool {
        (self.0 & Self::MORE_FRAGMENTS) != 0
    }

    pub fn start(self) -> bool {
        (self.0 & Self::START) != 0
    }
}

/// EAP-TLS Type-Data
///
/// ```text
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Flags     |      TLS Message Length (only if L is set)
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           |  TLS Data...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EapTlsPacket {
    pub flags: TlsFlags,
    /// Total length of the TLS message this fragment belongs to (L flag)
    pub tls_message_length: Option<u32>,
    pub tls_data: Vec<u8>,
}

impl EapTlsPacket {
    pub fn new(flags: TlsFlags, tls_message_length: Option<u32>, tls_data: Vec<u8>) -> Self {
        EapTlsPacket {
            flags,
            tls_message_length,
            tls_data,
        }
    }

    /// Start packet, the server's first message
    pub fn start(version: u8) -> Self {
        EapTlsPacket {
            flags: TlsFlags::new(false, false, true).with_version(version),
            tls_message_length: None,
            tls_data: Vec::new(),
        }
    }

    /// Empty packet acknowledging a fragment
    pub fn ack(version: u8) -> Self {
        EapTlsPacket {
            flags: TlsFlags::default().with_version(version),
            tls_message_length: None,
            tls_data: Vec::new(),
        }
    }

    pub fn is_ack(&self) -> bool {
        self.tls_data.is_empty() && !self.flags.more_fragments() && !self.flags.start()
    }

    pub fn from_eap_data(data: &[u8]) -> Result<Self, EapError> {
        let (&flags, rest) = data.split_first().ok_or(EapError::PacketTooShort {
            expected: 1,
            actual: 0,
        })?;
        let flags = TlsFlags::from_u8(flags);

        let (tls_message_length, tls_data) = if flags.length_included() {
            if rest.len() < 4 {
                return Err(EapError::PacketTooShort {
                    expected: 5,
                    actual: data.len(),
                });
            }
            let length = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
            (Some(length), rest[4..].to_vec())
        } else {
            (None, rest.to_vec())
        };

        Ok(EapTlsPacket {
            flags,
            tls_message_length,
            tls_data,
        })
    }

    pub fn to_eap_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(5 + self.tls_data.len());
        data.push(self.flags.as_u8());
        if let Some(length) = self.tls_message_length {
            data.extend_from_slice(&length.to_be_bytes());
        }
        data.extend_from_slice(&self.tls_data);
        data
    }

    pub fn to_eap_request(&self, identifier: u8, eap_type: EapType) -> EapPacket {
        EapPacket::request(identifier, eap_type, self.to_eap_data())
    }

    pub fn to_eap_response(&self, identifier: u8, eap_type: EapType) -> EapPacket {
        EapPacket::response(identifier, eap_type, self.to_eap_data())
    }
}

/// Reassembles a fragmented TLS message.
///
/// The length declared by the first fragment must match the bytes received by
/// the time the last fragment arrives. Nothing larger than `max_message_size`
/// is buffered.
#[derive(Debug, Clone)]
pub struct TlsFragmentAssembler {
    expected_length: Option<u32>,
    buffer: Vec<u8>,
    in_progress: bool,
    max_message_size: usize,
}

impl TlsFragmentAssembler {
    pub fn new(max_message_size: usize) -> Self {
        TlsFragmentAssembler {
            expected_length: None,
            buffer: Vec::new(),
            in_progress: false,
            max_message_size,
        }
    }

    /// Add a fragment. Returns the whole message once the last fragment is in.
    ///
    /// On error the assembler is reset.
    pub fn add_fragment(&mut self, packet: &EapTlsPacket) -> Result<Option<Vec<u8>>, EapError> {
        let result = self.accept(packet);
        if !matches!(result, Ok(None)) {
            self.reset();
        }
        result
    }

    fn accept(&mut self, packet: &EapTlsPacket) -> Result<Option<Vec<u8>>, EapError> {
        if !self.in_progress {
            self.in_progress = true;
            if packet.flags.length_included() {
                self.expected_length = packet.tls_message_length;
            }
        }

        if let Some(expected) = self.expected_length
            && expected as usize > self.max_message_size
        {
            return Err(EapError::MessageTooLarge {
                size: expected as usize,
                max: self.max_message_size,
            });
        }

        let size = self.buffer.len() + packet.tls_data.len();
        if size > self.max_message_size {
            return Err(EapError::MessageTooLarge {
                size,
                max: self.max_message_size,
            });
        }
        if let Some(expected) = self.expected_length
            && size > expected as usize
        {
            return Err(EapError::MessageLengthMismatch {
                declared: expected as usize,
                actual: size,
            });
        }

        self.buffer.extend_from_slice(&packet.tls_data);

        if packet.flags.more_fragments() {
            return Ok(None);
        }

        if let Some(expected) = self.expected_length
            && self.buffer.len() != expected as usize
        {
            return Err(EapError::MessageLengthMismatch {
                declared: expected as usize,
                actual: self.buffer.len(),
            });
        }

        let message = std::mem::take(&mut self.buffer);
        self.reset();
        Ok(Some(message))
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn reset(&mut self) {
        self.expected_length = None;
        self.buffer.clear();
        self.in_progress = false;
    }
}

/// Split a TLS message into fragments of at most `max_fragment_size` bytes of
/// Type-Data each (flags and length field included).
///
/// The first fragment carries the L flag and total length; every fragment but
/// the last carries M. An empty message yields no fragments.
pub fn fragment_tls_message(
    tls_data: &[u8],
    max_fragment_size: usize,
    version: u8,
) -> Vec<EapTlsPacket> {
    let mut packets = Vec::new();
    let total_length = tls_data.len() as u32;
    let first_fragment_size = max_fragment_size.saturating_sub(5).max(1);
    let subsequent_fragment_size = max_fragment_size.saturating_sub(1).max(1);

    let mut offset = 0;
    while offset < tls_data.len() {
        let is_first = offset == 0;
        let limit = if is_first {
            first_fragment_size
        } else {
            subsequent_fragment_size
        };
        let fragment_size = limit.min(tls_data.len() - offset);
        let more_fragments = offset + fragment_size < tls_data.len();

        packets.push(EapTlsPacket::new(
            TlsFlags::new(is_first, more_fragments, false).with_version(version),
            is_first.then_some(total_length),
            tls_data[offset..offset + fragment_size].to_vec(),
        ));
        offset += fragment_size;
    }

    packets
}

/// Certificate configuration for the TLS-based methods
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsCertificateConfig {
    /// Server certificate chain (PEM)
    pub server_cert_path: String,
    /// Server private key (PEM)
    pub server_key_path: String,
    /// CA bundle used to verify client certificates (PEM)
    #[cfg_attr(feature = "serde", serde(default))]
    pub ca_cert_path: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub require_client_cert: bool,
}

impl TlsCertificateConfig {
    pub fn simple(server_cert_path: impl Into<String>, server_key_path: impl Into<String>) -> Self {
        TlsCertificateConfig {
            server_cert_path: server_cert_path.into(),
            server_key_path: server_key_path.into(),
            ca_cert_path: None,
            require_client_cert: false,
        }
    }
}

/// Load every certificate of a PEM file, DER-encoded
pub fn load_certificates_from_pem(path: &str) -> Result<Vec<CertificateDer<'static>>, EapError> {
    let file = std::fs::File::open(path).map_err(|e| {
        EapError::IoError(format!("Failed to open certificate file '{}': {}", path, e))
    })?;
    let mut reader = std::io::BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| EapError::CertificateError(format!("Failed to parse certificates: {}", e)))?;

    if certs.is_empty() {
        return Err(EapError::CertificateError(format!(
            "No certificates found in '{}'",
            path
        )));
    }
    Ok(certs)
}

/// Load the first private key (PKCS#8, PKCS#1 or SEC1) of a PEM file
pub fn load_private_key_from_pem(path: &str) -> Result<PrivateKeyDer<'static>, EapError> {
    let file = std::fs::File::open(path)
        .map_err(|e| EapError::IoError(format!("Failed to open key file '{}': {}", path, e)))?;
    let mut reader = std::io::BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| EapError::CertificateError(format!("Failed to parse private key: {}", e)))?
        .ok_or_else(|| EapError::CertificateError(format!("No private key found in '{}'", path)))
}

/// Reject certificates outside their validity period
pub fn validate_certificate(cert_der: &[u8]) -> Result<(), EapError> {
    use x509_parser::prelude::*;

    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| EapError::CertificateError(format!("Invalid X.509 certificate: {}", e)))?;

    if !cert.validity().is_valid() {
        return Err(EapError::CertificateError(format!(
            "Certificate outside validity period ({} - {})",
            cert.validity().not_before,
            cert.validity().not_after
        )));
    }
    Ok(())
}

/// Subject Common Name of a DER certificate
pub fn certificate_common_name(cert_der: &[u8]) -> Option<String> {
    use x509_parser::prelude::*;

    let (_, cert) = X509Certificate::from_der(cert_der).ok()?;
    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string)
}

/// Build the rustls server configuration used by every TLS tunnel
pub fn build_server_config(
    cert_config: &TlsCertificateConfig,
) -> Result<rustls::ServerConfig, EapError> {
    let certs = load_certificates_from_pem(&cert_config.server_cert_path)?;
    let key = load_private_key_from_pem(&cert_config.server_key_path)?;
    validate_certificate(&certs[0])?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ServerConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| EapError::TlsError(format!("Unsupported protocol versions: {}", e)))?;

    let builder = if cert_config.require_client_cert {
        let ca_path = cert_config.ca_cert_path.as_deref().ok_or_else(|| {
            EapError::CertificateError(
                "Client certificate verification required but no CA certificate path provided"
                    .to_string(),
            )
        })?;

        let mut root_store = rustls::RootCertStore::empty();
        for ca_cert in load_certificates_from_pem(ca_path)? {
            root_store.add(ca_cert).map_err(|e| {
                EapError::CertificateError(format!("Failed to add CA certificate: {}", e))
            })?;
        }

        let verifier =
            rustls::server::WebPkiClientVerifier::builder_with_provider(root_store.into(), provider)
                .build()
                .map_err(|e| EapError::TlsError(format!("Failed to build client verifier: {}", e)))?;
        builder.with_client_cert_verifier(verifier)
    } else {
        builder.with_no_client_auth()
    };

    builder
        .with_single_cert(certs, key)
        .map_err(|e| EapError::TlsError(format!("Failed to configure server: {}", e)))
}
