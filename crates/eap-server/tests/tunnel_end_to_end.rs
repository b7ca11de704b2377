//! EAP-TLS and PEAP conversations against a real rustls client

mod common;

use common::{Exchange, Nas, PeerEvent, TestPki, TlsPeer, handler, mppe_keys, negotiator};
use eap_proto::eap::extension::{ExtensionPayload, ExtensionResult};
use eap_proto::eap::eap_from_radius_packet;
use eap_proto::eap::md5::{Md5Value, compute_response_hash};
use eap_proto::eap::tls::EapTlsPacket;
use eap_proto::{Code, EapCode, EapPacket, EapType};
use eap_server::EapSettings;
use eap_server::method::peap::{decode_inner, encode_inner};
use rustls::version::{TLS12, TLS13};

const MAX_ROUNDS: usize = 64;

fn settings(methods: Vec<EapType>, fragment_size: usize) -> EapSettings {
    EapSettings {
        methods,
        fragment_size,
        ..EapSettings::default()
    }
}

/// Drive an EAP-TLS conversation until the server stops challenging
async fn run_eap_tls(nas: &mut Nas<'_>, peer: &mut TlsPeer) -> Exchange {
    let mut exchange = nas.send(Some(&EapPacket::identity_response(0, "alice"))).await;
    for _ in 0..MAX_ROUNDS {
        if exchange.response.code != Code::AccessChallenge {
            return exchange;
        }
        assert_eq!(exchange.eap.eap_type, Some(EapType::Tls));
        let data = match peer.receive(&exchange.eap.data) {
            PeerEvent::Reply(data) => data,
            PeerEvent::Plaintext(_) => panic!("EAP-TLS carries no application data"),
        };
        let reply = EapPacket::response(exchange.eap.identifier, EapType::Tls, data);
        exchange = nas.send(Some(&reply)).await;
    }
    panic!("conversation did not finish");
}

/// Peer side of PEAP phase 2
trait Phase2 {
    fn answer(&mut self, plaintext: &[u8], outer_id: u8) -> Vec<u8>;
}

struct InnerPeer {
    username: &'static str,
    password: &'static str,
    result: ExtensionResult,
    seen: Vec<EapType>,
}

impl InnerPeer {
    fn new(username: &'static str, password: &'static str) -> Self {
        InnerPeer {
            username,
            password,
            result: ExtensionResult::Success,
            seen: Vec::new(),
        }
    }
}

impl Phase2 for InnerPeer {
    fn answer(&mut self, plaintext: &[u8], outer_id: u8) -> Vec<u8> {
        // decode_inner rebuilds a Response header, the peer is reading a Request
        let request = match decode_inner(plaintext, outer_id) {
            Ok(packet) if packet.is_type(EapType::PeapExtension) => packet,
            Ok(packet) => EapPacket::new(EapCode::Request, packet.identifier, packet.eap_type, packet.data),
            Err(e) => panic!("undecodable inner request: {}", e),
        };
        let inner_type = request.eap_type.unwrap();
        self.seen.push(inner_type);

        let response = match inner_type {
            EapType::Identity => EapPacket::identity_response(outer_id, self.username),
            EapType::Md5Challenge => {
                let value = Md5Value::decode(&request.data).unwrap();
                let hash = compute_response_hash(outer_id, self.password.as_bytes(), &value.value);
                eap_proto::eap::md5::create_response(outer_id, &hash, "")
            }
            EapType::PeapExtension => {
                assert_eq!(request.code, EapCode::Request);
                let received = ExtensionPayload::decode(&request.data)
                    .unwrap()
                    .result_value()
                    .unwrap();
                assert_eq!(received, self.result);
                EapPacket::response(
                    request.identifier,
                    EapType::PeapExtension,
                    ExtensionPayload::result(self.result).encode(),
                )
            }
            other => panic!("unexpected inner method {:?}", other),
        };
        encode_inner(&response)
    }
}

async fn run_peap(nas: &mut Nas<'_>, peer: &mut TlsPeer, inner: &mut impl Phase2) -> Exchange {
    let mut exchange = nas.send(Some(&EapPacket::identity_response(0, "anonymous"))).await;
    for _ in 0..MAX_ROUNDS {
        if exchange.response.code != Code::AccessChallenge {
            return exchange;
        }
        assert_eq!(exchange.eap.eap_type, Some(EapType::Peap));
        let outer_id = exchange.eap.identifier;
        let data = match peer.receive(&exchange.eap.data) {
            PeerEvent::Reply(data) => data,
            PeerEvent::Plaintext(plaintext) => {
                let answer = inner.answer(&plaintext, outer_id);
                peer.send_plain(&answer)
            }
        };
        let reply = EapPacket::response(outer_id, EapType::Peap, data);
        exchange = nas.send(Some(&reply)).await;
    }
    panic!("conversation did not finish");
}

#[tokio::test]
async fn test_eap_tls_tls13_derives_mppe_keys() {
    let pki = TestPki::generate();
    let (handler, _store) = handler(negotiator(
        settings(vec![EapType::Identity, EapType::Tls], 300),
        Some(pki.server_config()),
    ));
    let mut nas = Nas::new(&handler);
    let mut peer = TlsPeer::new(pki.client_config(&[&TLS13]), 300);

    let done = run_eap_tls(&mut nas, &mut peer).await;
    assert_eq!(done.response.code, Code::AccessAccept);
    assert_eq!(done.eap.code, EapCode::Success);
    let last = eap_from_radius_packet(&done.request).unwrap().unwrap();
    assert_eq!(done.eap.identifier, last.identifier);
    assert!(!peer.is_handshaking());

    let msk = peer.msk();
    let (recv, send) = mppe_keys(&done);
    assert_eq!(recv.as_slice(), &msk[..32]);
    assert_eq!(send.as_slice(), &msk[32..]);
}

#[tokio::test]
async fn test_eap_tls_tls12_with_small_fragments() {
    let pki = TestPki::generate();
    let (handler, _store) = handler(negotiator(
        settings(vec![EapType::Identity, EapType::Tls], 128),
        Some(pki.server_config()),
    ));
    let mut nas = Nas::new(&handler);
    let mut peer = TlsPeer::new(pki.client_config(&[&TLS12]), 128);

    let done = run_eap_tls(&mut nas, &mut peer).await;
    assert_eq!(done.response.code, Code::AccessAccept);

    let msk = peer.msk();
    let (recv, _send) = mppe_keys(&done);
    assert_eq!(recv.as_slice(), &msk[..32]);
}

#[tokio::test]
async fn test_eap_tls_start_packet() {
    let pki = TestPki::generate();
    let (handler, _store) = handler(negotiator(
        settings(vec![EapType::Identity, EapType::Tls], 1020),
        Some(pki.server_config()),
    ));
    let mut nas = Nas::new(&handler);

    let start = nas.send(Some(&EapPacket::identity_response(4, "alice"))).await;
    assert_eq!(start.response.code, Code::AccessChallenge);
    assert_eq!(start.eap.identifier, 5);
    let packet = EapTlsPacket::from_eap_data(&start.eap.data).unwrap();
    assert!(packet.flags.start());
    assert!(packet.tls_data.is_empty());
}

#[tokio::test]
async fn test_eap_tls_garbage_handshake_is_rejected() {
    let pki = TestPki::generate();
    let (handler, _store) = handler(negotiator(
        settings(vec![EapType::Identity, EapType::Tls], 1020),
        Some(pki.server_config()),
    ));
    let mut nas = Nas::new(&handler);

    let start = nas.send(Some(&EapPacket::identity_response(0, "alice"))).await;
    let garbage = EapTlsPacket::new(
        eap_proto::eap::tls::TlsFlags::new(true, false, false),
        Some(16),
        vec![0x16, 0x03, 0x01, 0x00, 0x0b, 0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 0, 0, 0, 0],
    );
    let reply = garbage.to_eap_response(start.eap.identifier, EapType::Tls);

    let mut exchange = nas.send(Some(&reply)).await;
    // The server may still owe an alert before it gives up
    for _ in 0..4 {
        if exchange.response.code != Code::AccessChallenge {
            break;
        }
        let ack = EapTlsPacket::ack(0).to_eap_response(exchange.eap.identifier, EapType::Tls);
        exchange = nas.send(Some(&ack)).await;
    }
    assert_eq!(exchange.response.code, Code::AccessReject);
    assert_eq!(exchange.eap.code, EapCode::Failure);
}

#[tokio::test]
async fn test_eap_tls_retransmitted_ack_gets_same_fragment() {
    let pki = TestPki::generate();
    let (handler, _store) = handler(negotiator(
        settings(vec![EapType::Identity, EapType::Tls], 128),
        Some(pki.server_config()),
    ));
    let mut nas = Nas::new(&handler);
    let mut peer = TlsPeer::new(pki.client_config(&[&TLS13]), 128);

    let mut exchange = nas.send(Some(&EapPacket::identity_response(0, "alice"))).await;
    let mut retransmitted = false;
    for _ in 0..MAX_ROUNDS {
        if exchange.response.code != Code::AccessChallenge {
            break;
        }
        let data = match peer.receive(&exchange.eap.data) {
            PeerEvent::Reply(data) => data,
            PeerEvent::Plaintext(_) => panic!("EAP-TLS carries no application data"),
        };
        let reply = EapPacket::response(exchange.eap.identifier, EapType::Tls, data);
        let next = nas.send(Some(&reply)).await;

        // Resend the first acknowledgement that pulled a further server fragment
        let is_ack = EapTlsPacket::from_eap_data(&reply.data).unwrap().is_ack();
        if is_ack && !retransmitted && next.response.code == Code::AccessChallenge {
            let again = nas.resend(&next).await;
            assert_eq!(
                again.response.encode().unwrap(),
                next.response.encode().unwrap()
            );
            retransmitted = true;
        }
        exchange = next;
    }

    assert!(retransmitted);
    assert_eq!(exchange.response.code, Code::AccessAccept);
    let msk = peer.msk();
    let (recv, _send) = mppe_keys(&exchange);
    assert_eq!(recv.as_slice(), &msk[..32]);
}

#[tokio::test]
async fn test_peap_md5_inner_success() {
    let pki = TestPki::generate();
    let (handler, _store) = handler(negotiator(
        settings(vec![EapType::Identity, EapType::Peap], 1020),
        Some(pki.server_config()),
    ));
    let mut nas = Nas::new(&handler);
    let mut peer = TlsPeer::new(pki.client_config(&[&TLS13, &TLS12]), 1020);
    let mut inner = InnerPeer::new("alice", "wonderland");

    let done = run_peap(&mut nas, &mut peer, &mut inner).await;
    assert_eq!(done.response.code, Code::AccessAccept);
    assert_eq!(done.eap.code, EapCode::Success);
    assert_eq!(
        inner.seen,
        vec![EapType::Identity, EapType::Md5Challenge, EapType::PeapExtension]
    );

    let msk = peer.msk();
    let (recv, send) = mppe_keys(&done);
    assert_eq!(recv.as_slice(), &msk[..32]);
    assert_eq!(send.as_slice(), &msk[32..]);
}

#[tokio::test]
async fn test_peap_tls12_inner_success() {
    let pki = TestPki::generate();
    let (handler, _store) = handler(negotiator(
        settings(vec![EapType::Identity, EapType::Peap], 400),
        Some(pki.server_config()),
    ));
    let mut nas = Nas::new(&handler);
    let mut peer = TlsPeer::new(pki.client_config(&[&TLS12]), 400);
    let mut inner = InnerPeer::new("bob", "builder");

    let done = run_peap(&mut nas, &mut peer, &mut inner).await;
    assert_eq!(done.response.code, Code::AccessAccept);
}

#[tokio::test]
async fn test_peap_wrong_inner_password_sends_failure_result() {
    let pki = TestPki::generate();
    let (handler, _store) = handler(negotiator(
        settings(vec![EapType::Identity, EapType::Peap], 1020),
        Some(pki.server_config()),
    ));
    let mut nas = Nas::new(&handler);
    let mut peer = TlsPeer::new(pki.client_config(&[&TLS13]), 1020);
    let mut inner = InnerPeer::new("alice", "cheshire");
    inner.result = ExtensionResult::Failure;

    let done = run_peap(&mut nas, &mut peer, &mut inner).await;
    assert_eq!(done.response.code, Code::AccessReject);
    assert_eq!(done.eap.code, EapCode::Failure);
    assert_eq!(inner.seen.last(), Some(&EapType::PeapExtension));
    assert!(
        done.response
            .find_all_attributes(eap_proto::AttributeType::VendorSpecific as u8)
            .is_empty()
    );
}

#[tokio::test]
async fn test_peap_peer_refusing_result_is_rejected() {
    let pki = TestPki::generate();
    let (handler, _store) = handler(negotiator(
        settings(vec![EapType::Identity, EapType::Peap], 1020),
        Some(pki.server_config()),
    ));
    let mut nas = Nas::new(&handler);
    let mut peer = TlsPeer::new(pki.client_config(&[&TLS13]), 1020);

    // Correct password, but the peer answers the Success result with Failure
    let mut inner = RefusingPeer(InnerPeer::new("alice", "wonderland"));
    let done = run_peap(&mut nas, &mut peer, &mut inner).await;
    assert_eq!(done.response.code, Code::AccessReject);
}

struct RefusingPeer(InnerPeer);

impl Phase2 for RefusingPeer {
    fn answer(&mut self, plaintext: &[u8], outer_id: u8) -> Vec<u8> {
        let mut reply = self.0.answer(plaintext, outer_id);
        if self.0.seen.last() == Some(&EapType::PeapExtension) {
            let packet = decode_inner(&reply, outer_id).unwrap();
            reply = encode_inner(&EapPacket::response(
                packet.identifier,
                EapType::PeapExtension,
                ExtensionPayload::result(ExtensionResult::Failure).encode(),
            ));
        }
        reply
    }
}
