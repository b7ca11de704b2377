//! Test harness: a NAS that wraps EAP packets in signed Access-Requests, and
//! a rustls client that speaks EAP-TLS framing.

#![allow(dead_code)]

use eap_proto::eap::tls::{EapTlsPacket, TlsFragmentAssembler, fragment_tls_message};
use eap_proto::eap::{add_eap_to_radius_packet, eap_from_radius_packet};
use eap_proto::message_auth::{sign_response, verify_request};
use eap_proto::mppe::{MS_MPPE_RECV_KEY, MS_MPPE_SEND_KEY, VENDOR_MICROSOFT, decrypt_key};
use eap_proto::{
    Attribute, AttributeType, Code, EapPacket, Packet, generate_request_authenticator,
    verify_response_authenticator,
};
use eap_server::{
    EapRadiusHandler, EapSettings, MemorySessionStore, MethodRegistry, Negotiator,
    SimpleCredentialStore,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore, ServerConfig};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

pub const SECRET: &[u8] = b"testing123";
pub const SERVER_NAME: &str = "eap.example.com";
pub const KEY_LABEL: &[u8] = b"client EAP encryption";

pub struct TestPki {
    pub cert: CertificateDer<'static>,
    pub key: Vec<u8>,
}

impl TestPki {
    pub fn generate() -> Self {
        let certified = rcgen::generate_simple_self_signed(vec![SERVER_NAME.to_string()]).unwrap();
        TestPki {
            cert: certified.cert.der().clone(),
            key: certified.key_pair.serialize_der(),
        }
    }

    pub fn server_config(&self) -> Arc<ServerConfig> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(
                vec![self.cert.clone()],
                PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key.clone())),
            )
            .unwrap();
        Arc::new(config)
    }

    pub fn client_config(&self, versions: &[&'static rustls::SupportedProtocolVersion]) -> Arc<ClientConfig> {
        let mut roots = RootCertStore::empty();
        roots.add(self.cert.clone()).unwrap();
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(versions)
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Arc::new(config)
    }
}

pub fn users() -> SimpleCredentialStore {
    let mut users = SimpleCredentialStore::new();
    users.add_user("alice", "wonderland");
    users.add_user("bob", "builder");
    users
}

pub fn negotiator(settings: EapSettings, tls: Option<Arc<ServerConfig>>) -> Negotiator {
    let negotiator = Negotiator::new(settings, MethodRegistry::with_defaults(), Arc::new(users()));
    match tls {
        Some(config) => negotiator.with_tls_config(config),
        None => negotiator,
    }
}

pub fn handler(negotiator: Negotiator) -> (EapRadiusHandler, Arc<MemorySessionStore>) {
    let store = Arc::new(MemorySessionStore::new(Duration::from_secs(60)));
    let handler = EapRadiusHandler::new(Arc::new(negotiator), store.clone());
    (handler, store)
}

/// One RADIUS round trip as seen by the NAS
pub struct Exchange {
    pub request: Packet,
    pub response: Packet,
    pub eap: EapPacket,
}

/// Plays the NAS: carries State between rounds and checks every reply
pub struct Nas<'a> {
    handler: &'a EapRadiusHandler,
    state: Option<Vec<u8>>,
    next_id: u8,
}

impl<'a> Nas<'a> {
    pub fn new(handler: &'a EapRadiusHandler) -> Self {
        Nas {
            handler,
            state: None,
            next_id: 0,
        }
    }

    pub fn state(&self) -> Option<&[u8]> {
        self.state.as_deref()
    }

    pub async fn send(&mut self, eap: Option<&EapPacket>) -> Exchange {
        let authenticator = generate_request_authenticator();
        let mut request = Packet::new(Code::AccessRequest, self.next_id, authenticator);
        self.next_id = self.next_id.wrapping_add(1);

        request.add_attribute(Attribute::string(AttributeType::UserName as u8, "alice").unwrap());
        if let Some(state) = &self.state {
            request.add_attribute(Attribute::new(AttributeType::State as u8, state.clone()).unwrap());
        }
        if let Some(eap) = eap {
            add_eap_to_radius_packet(&mut request, eap).unwrap();
        }
        sign_response(&mut request, &authenticator, SECRET).unwrap();
        let request = Packet::decode(&request.encode().unwrap()).unwrap();
        assert_eq!(verify_request(&request, SECRET), Some(true));

        self.deliver(request).await
    }

    /// Send an earlier request again, unchanged, as a NAS does on timeout
    pub async fn resend(&mut self, exchange: &Exchange) -> Exchange {
        self.deliver(exchange.request.clone()).await
    }

    async fn deliver(&mut self, request: Packet) -> Exchange {
        let response = self
            .handler
            .handle_access_request(&request, SECRET)
            .await
            .unwrap();
        let response = Packet::decode(&response.encode().unwrap()).unwrap();
        assert_eq!(response.identifier, request.identifier);
        assert!(verify_response_authenticator(&response, &request.authenticator, SECRET));

        let mut signed = response.clone();
        signed.authenticator = request.authenticator;
        assert_eq!(verify_request(&signed, SECRET), Some(true));

        self.state = response.state().map(<[u8]>::to_vec);
        let eap = eap_from_radius_packet(&response).unwrap().unwrap();
        Exchange {
            request,
            response,
            eap,
        }
    }
}

/// MS-MPPE keys of an Access-Accept, decrypted: (recv, send)
pub fn mppe_keys(exchange: &Exchange) -> (Vec<u8>, Vec<u8>) {
    let mut recv = None;
    let mut send = None;
    for attr in exchange
        .response
        .find_all_attributes(AttributeType::VendorSpecific as u8)
    {
        let (vendor, vendor_type, data) = attr.as_vendor_specific().unwrap();
        assert_eq!(vendor, VENDOR_MICROSOFT);
        let key = decrypt_key(data, SECRET, &exchange.request.authenticator).unwrap();
        match vendor_type {
            MS_MPPE_RECV_KEY => recv = Some(key),
            MS_MPPE_SEND_KEY => send = Some(key),
            other => panic!("unexpected vendor type {}", other),
        }
    }
    (recv.unwrap(), send.unwrap())
}

pub enum PeerEvent {
    /// Type-Data to send back
    Reply(Vec<u8>),
    /// Decrypted application data, answer with [`TlsPeer::send_plain`]
    Plaintext(Vec<u8>),
}

/// rustls client speaking EAP-TLS/PEAP framing
pub struct TlsPeer {
    conn: ClientConnection,
    assembler: TlsFragmentAssembler,
    outgoing: VecDeque<EapTlsPacket>,
    fragment_size: usize,
}

impl TlsPeer {
    pub fn new(config: Arc<ClientConfig>, fragment_size: usize) -> Self {
        let name = ServerName::try_from(SERVER_NAME.to_string()).unwrap();
        TlsPeer {
            conn: ClientConnection::new(config, name).unwrap(),
            assembler: TlsFragmentAssembler::new(65536),
            outgoing: VecDeque::new(),
            fragment_size,
        }
    }

    /// Raw client, for tests that tamper with the records
    pub fn connection(&mut self) -> &mut ClientConnection {
        &mut self.conn
    }

    pub fn is_handshaking(&self) -> bool {
        self.conn.is_handshaking()
    }

    pub fn msk(&self) -> Vec<u8> {
        let exported = self
            .conn
            .export_keying_material(vec![0u8; 128], KEY_LABEL, None)
            .unwrap();
        exported[..64].to_vec()
    }

    pub fn receive(&mut self, data: &[u8]) -> PeerEvent {
        let packet = EapTlsPacket::from_eap_data(data).unwrap();
        if packet.flags.start() {
            return PeerEvent::Reply(self.flush());
        }
        if !self.outgoing.is_empty() {
            assert!(packet.is_ack(), "server sent data while we owed fragments");
            return PeerEvent::Reply(self.next_fragment());
        }

        let Some(message) = self.assembler.add_fragment(&packet).unwrap() else {
            return PeerEvent::Reply(EapTlsPacket::ack(0).to_eap_data());
        };

        let mut records = message.as_slice();
        while !records.is_empty() {
            self.conn.read_tls(&mut records).unwrap();
            self.conn.process_new_packets().unwrap();
        }

        let mut plaintext = Vec::new();
        match self.conn.reader().read_to_end(&mut plaintext) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => panic!("read failed: {}", e),
        }
        if plaintext.is_empty() {
            PeerEvent::Reply(self.flush())
        } else {
            PeerEvent::Plaintext(plaintext)
        }
    }

    pub fn send_plain(&mut self, plaintext: &[u8]) -> Vec<u8> {
        self.conn.writer().write_all(plaintext).unwrap();
        self.flush()
    }

    fn flush(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while self.conn.wants_write() {
            self.conn.write_tls(&mut out).unwrap();
        }
        self.outgoing
            .extend(fragment_tls_message(&out, self.fragment_size, 0));
        self.next_fragment()
    }

    fn next_fragment(&mut self) -> Vec<u8> {
        self.outgoing
            .pop_front()
            .unwrap_or_else(|| EapTlsPacket::ack(0))
            .to_eap_data()
    }
}
