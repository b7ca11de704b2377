//! TLS tunnel bridging
//!
//! A TLS handshake wants a byte stream; EAP delivers one bounded fragment per
//! RADIUS round trip. The handshake runs on its own task against a
//! [`BuffConn`], which looks like a socket to the engine and like a pair of
//! channels to the request handler. [`TunnelState`] sits on the request side:
//! it reassembles inbound fragments, feeds whole messages to the task, waits a
//! bounded time for the next flight and hands that flight out one fragment
//! per round.

pub mod buff_conn;
pub mod engine;
pub mod state;

pub use buff_conn::BuffConn;
pub use engine::{HandshakeEngine, RustlsEngine, RustlsSession, TlsSession};
pub use state::{TunnelState, TunnelStep};

use eap_proto::EapError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// RFC 5216 Section 2.3 exporter label, also used by PEAPv0
pub const KEY_EXPORT_LABEL: &[u8] = b"client EAP encryption";
pub const MSK_LENGTH: usize = 64;
pub const EMSK_LENGTH: usize = 64;

#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("TLS handshake failed: {0}")]
    Handshake(String),
    #[error("TLS record error: {0}")]
    Record(String),
    #[error("No handshake progress within {0:?}")]
    Timeout(Duration),
    #[error("Handshake task is gone")]
    ChannelClosed,
    #[error("Outbound TLS data exceeds {max} bytes")]
    BufferOverflow { max: usize },
    #[error("Key export failed: {0}")]
    KeyExport(String),
    #[error("Fragment error: {0}")]
    Fragment(#[from] EapError),
    #[error("Unexpected message: {0}")]
    Unexpected(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the handshake task reports back to the request handler
pub enum TunnelEvent {
    /// Bytes to send before the peer can continue
    Flight(Vec<u8>),
    /// Handshake finished; `flight` is whatever the engine wrote last
    Done {
        flight: Vec<u8>,
        session: Box<dyn TlsSession>,
        peer: PeerInfo,
    },
    Failed(TunnelError),
}

impl fmt::Debug for TunnelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelEvent::Flight(bytes) => f.debug_tuple("Flight").field(&bytes.len()).finish(),
            TunnelEvent::Done { flight, peer, .. } => f
                .debug_struct("Done")
                .field("flight", &flight.len())
                .field("peer", peer)
                .finish(),
            TunnelEvent::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
        }
    }
}

/// Negotiated parameters and client identity of a finished handshake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerInfo {
    pub server_name: Option<String>,
    pub protocol_version: Option<String>,
    pub cipher_suite: Option<String>,
    /// Subject CN of the client certificate, when one was presented
    pub client_common_name: Option<String>,
}

/// MSK and EMSK exported from the tunnel
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub msk: Vec<u8>,
    pub emsk: Vec<u8>,
}

impl KeyMaterial {
    pub fn from_exported(mut exported: Vec<u8>) -> Result<Self, TunnelError> {
        if exported.len() != MSK_LENGTH + EMSK_LENGTH {
            return Err(TunnelError::KeyExport(format!(
                "expected {} bytes, got {}",
                MSK_LENGTH + EMSK_LENGTH,
                exported.len()
            )));
        }
        let emsk = exported.split_off(MSK_LENGTH);
        Ok(KeyMaterial {
            msk: exported,
            emsk,
        })
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("msk", &"<redacted>")
            .field("emsk", &"<redacted>")
            .finish()
    }
}
