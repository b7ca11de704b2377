//! End-to-end wire checks across the codec modules: a signed Access-Challenge
//! carrying a fragmented EAP-TLS flight, and an Access-Accept carrying MPPE keys.

use eap_proto::attributes::{Attribute, AttributeType};
use eap_proto::eap::tls::{EapTlsPacket, TlsFragmentAssembler, fragment_tls_message};
use eap_proto::eap::{add_eap_to_radius_packet, eap_from_radius_packet};
use eap_proto::message_auth::{sign_response, verify_message_authenticator, verify_request};
use eap_proto::mppe::{MS_MPPE_RECV_KEY, MS_MPPE_SEND_KEY, VENDOR_MICROSOFT, decrypt_key, mppe_key_attributes};
use eap_proto::{
    Code, EapCode, EapPacket, EapType, Packet, calculate_response_authenticator,
    verify_response_authenticator,
};

const SECRET: &[u8] = b"testing123";

fn finish_reply(reply: &mut Packet, request: &Packet) {
    sign_response(reply, &request.authenticator, SECRET).unwrap();
    reply.authenticator =
        calculate_response_authenticator(reply, &request.authenticator, SECRET).unwrap();
}

#[test]
fn signed_request_survives_the_wire() {
    let mut request = Packet::new(Code::AccessRequest, 17, [0x11; 16]);
    request.add_attribute(Attribute::string(AttributeType::UserName as u8, "alice").unwrap());
    add_eap_to_radius_packet(&mut request, &EapPacket::identity_response(0, "alice")).unwrap();
    sign_response(&mut request, &[0x11; 16], SECRET).unwrap();

    let decoded = Packet::decode(&request.encode().unwrap()).unwrap();
    assert_eq!(verify_request(&decoded, SECRET), Some(true));
    assert_eq!(verify_request(&decoded, b"wrong"), Some(false));

    let eap = eap_from_radius_packet(&decoded).unwrap().unwrap();
    assert_eq!(eap.code, EapCode::Response);
    assert_eq!(eap.data, b"alice");
}

#[test]
fn fragmented_flight_in_challenges() {
    let request = Packet::new(Code::AccessRequest, 5, [0x22; 16]);
    let flight: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
    let fragments = fragment_tls_message(&flight, 1020, 0);
    assert!(fragments.len() > 1);

    let mut assembler = TlsFragmentAssembler::new(65536);
    let mut reassembled = None;

    for (i, fragment) in fragments.iter().enumerate() {
        let mut reply = Packet::reply_to(&request, Code::AccessChallenge);
        add_eap_to_radius_packet(&mut reply, &fragment.to_eap_request(i as u8 + 1, EapType::Tls))
            .unwrap();
        finish_reply(&mut reply, &request);

        let bytes = reply.encode().unwrap();
        assert!(bytes.len() <= Packet::MAX_PACKET_SIZE);
        let received = Packet::decode(&bytes).unwrap();
        assert!(verify_response_authenticator(&received, &request.authenticator, SECRET));

        let mut check = received.clone();
        check.authenticator = request.authenticator;
        let offset = check
            .attribute_value_offset(AttributeType::MessageAuthenticator as u8)
            .unwrap();
        assert!(verify_message_authenticator(&check.encode().unwrap(), SECRET, offset));

        let eap = eap_from_radius_packet(&received).unwrap().unwrap();
        assert!(eap.is_type(EapType::Tls));
        let tls = EapTlsPacket::from_eap_data(&eap.data).unwrap();
        reassembled = assembler.add_fragment(&tls).unwrap();
    }

    assert_eq!(reassembled, Some(flight));
}

#[test]
fn accept_with_mppe_keys() {
    let request = Packet::new(Code::AccessRequest, 9, [0x33; 16]);
    let msk: Vec<u8> = (100..164).collect();

    let mut reply = Packet::reply_to(&request, Code::AccessAccept);
    add_eap_to_radius_packet(&mut reply, &EapPacket::success(9)).unwrap();
    for attr in mppe_key_attributes(&msk, SECRET, &request.authenticator).unwrap() {
        reply.add_attribute(attr);
    }
    finish_reply(&mut reply, &request);

    let received = Packet::decode(&reply.encode().unwrap()).unwrap();
    assert!(verify_response_authenticator(&received, &request.authenticator, SECRET));

    let mut keys = Vec::new();
    for attr in received.find_all_attributes(AttributeType::VendorSpecific as u8) {
        let (vendor, vendor_type, data) = attr.as_vendor_specific().unwrap();
        assert_eq!(vendor, VENDOR_MICROSOFT);
        keys.push((vendor_type, decrypt_key(data, SECRET, &request.authenticator).unwrap()));
    }
    assert_eq!(
        keys,
        vec![
            (MS_MPPE_RECV_KEY, msk[..32].to_vec()),
            (MS_MPPE_SEND_KEY, msk[32..].to_vec()),
        ]
    );
}
