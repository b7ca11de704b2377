//! Handshake engines and established TLS sessions

use super::{BuffConn, PeerInfo, TunnelError};
use async_trait::async_trait;
use eap_proto::eap::tls::certificate_common_name;
use rustls::ServerConnection;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tracing::debug;

/// Runs a TLS server handshake over a [`BuffConn`]
#[async_trait]
pub trait HandshakeEngine: Send {
    /// Drive the handshake to completion. Whatever the engine wrote but has
    /// not yet flushed as a flight stays in `conn` for the caller to collect.
    async fn handshake(
        self: Box<Self>,
        conn: &mut BuffConn,
    ) -> Result<(Box<dyn TlsSession>, PeerInfo), TunnelError>;
}

/// Record layer of a finished handshake
pub trait TlsSession: Send {
    /// Consume TLS records from the peer and return the plaintext they carry
    fn open(&mut self, records: &[u8]) -> Result<Vec<u8>, TunnelError>;

    /// Encrypt `plaintext` into TLS records
    fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, TunnelError>;

    fn export_keying_material(&self, label: &[u8], length: usize) -> Result<Vec<u8>, TunnelError>;
}

pub struct RustlsEngine {
    config: Arc<rustls::ServerConfig>,
}

impl RustlsEngine {
    pub fn new(config: Arc<rustls::ServerConfig>) -> Self {
        RustlsEngine { config }
    }
}

/// Feed `records` into `conn` one `read_tls` at a time, processing after each
fn ingest(conn: &mut ServerConnection, mut records: &[u8]) -> Result<(), rustls::Error> {
    while !records.is_empty() {
        match conn.read_tls(&mut records) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => return Err(rustls::Error::General(e.to_string())),
        }
        conn.process_new_packets()?;
    }
    Ok(())
}

fn flush(conn: &mut ServerConnection, out: &mut dyn Write) -> io::Result<()> {
    while conn.wants_write() {
        conn.write_tls(out)?;
    }
    Ok(())
}

#[async_trait]
impl HandshakeEngine for RustlsEngine {
    async fn handshake(
        self: Box<Self>,
        conn: &mut BuffConn,
    ) -> Result<(Box<dyn TlsSession>, PeerInfo), TunnelError> {
        let mut tls = ServerConnection::new(self.config)
            .map_err(|e| TunnelError::Handshake(e.to_string()))?;

        while tls.is_handshaking() {
            let message = conn.read().await?;
            debug!(bytes = message.len(), "Handshake message from peer");

            if let Err(e) = ingest(&mut tls, &message) {
                // the alert is best effort, the peer learns of the failure
                // from the EAP Failure anyway
                let _ = flush(&mut tls, conn);
                return Err(TunnelError::Handshake(e.to_string()));
            }
            flush(&mut tls, conn)?;
        }

        let peer = peer_info(&tls);
        debug!(peer = ?peer, "Handshake complete");
        Ok((Box::new(RustlsSession::new(tls)), peer))
    }
}

fn peer_info(tls: &ServerConnection) -> PeerInfo {
    PeerInfo {
        server_name: tls.server_name().map(str::to_string),
        protocol_version: tls.protocol_version().map(|v| format!("{:?}", v)),
        cipher_suite: tls
            .negotiated_cipher_suite()
            .map(|suite| format!("{:?}", suite.suite())),
        client_common_name: tls
            .peer_certificates()
            .and_then(|certs| certs.first())
            .and_then(|cert| certificate_common_name(cert.as_ref())),
    }
}

pub struct RustlsSession {
    conn: ServerConnection,
}

impl RustlsSession {
    pub fn new(conn: ServerConnection) -> Self {
        RustlsSession { conn }
    }
}

impl TlsSession for RustlsSession {
    fn open(&mut self, records: &[u8]) -> Result<Vec<u8>, TunnelError> {
        ingest(&mut self.conn, records).map_err(|e| TunnelError::Record(e.to_string()))?;

        let mut plaintext = Vec::new();
        match self.conn.reader().read_to_end(&mut plaintext) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(TunnelError::Record(e.to_string())),
        }
        Ok(plaintext)
    }

    fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, TunnelError> {
        self.conn.writer().write_all(plaintext)?;
        let mut records = Vec::new();
        flush(&mut self.conn, &mut records)?;
        Ok(records)
    }

    fn export_keying_material(&self, label: &[u8], length: usize) -> Result<Vec<u8>, TunnelError> {
        self.conn
            .export_keying_material(vec![0u8; length], label, None)
            .map_err(|e| TunnelError::KeyExport(e.to_string()))
    }
}
