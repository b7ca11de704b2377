//! UDP front end

mod common;

use common::{SECRET, handler, negotiator};
use eap_proto::eap::{add_eap_to_radius_packet, eap_from_radius_packet};
use eap_proto::message_auth::sign_response;
use eap_proto::{
    Code, EapPacket, EapType, Packet, generate_request_authenticator,
    verify_response_authenticator,
};
use eap_server::{Client, Config, EapServer, EapSettings};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

fn config(clients: Vec<Client>) -> Config {
    Config {
        listen_address: "127.0.0.1".to_string(),
        listen_port: 0,
        secret: String::from_utf8(SECRET.to_vec()).unwrap(),
        clients,
        ..Config::default()
    }
}

async fn start(config: Config) -> SocketAddr {
    let settings = EapSettings {
        methods: vec![EapType::Identity, EapType::Md5Challenge],
        ..EapSettings::default()
    };
    let (handler, _store) = handler(negotiator(settings, None));
    let server = EapServer::bind("127.0.0.1:0".parse().unwrap(), config, handler)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move { server.run().await });
    addr
}

fn access_request(identifier: u8) -> Packet {
    let authenticator = generate_request_authenticator();
    let mut request = Packet::new(Code::AccessRequest, identifier, authenticator);
    add_eap_to_radius_packet(&mut request, &EapPacket::identity_response(0, "alice")).unwrap();
    sign_response(&mut request, &authenticator, SECRET).unwrap();
    request
}

#[tokio::test]
async fn test_access_request_gets_challenge() {
    let addr = start(config(Vec::new())).await;
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let request = access_request(42);
    socket.send_to(&request.encode().unwrap(), addr).await.unwrap();

    let mut buf = vec![0u8; Packet::MAX_PACKET_SIZE];
    let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let response = Packet::decode(&buf[..len]).unwrap();

    assert_eq!(response.code, Code::AccessChallenge);
    assert_eq!(response.identifier, 42);
    assert!(verify_response_authenticator(&response, &request.authenticator, SECRET));
    assert!(response.state().is_some());
    let eap = eap_from_radius_packet(&response).unwrap().unwrap();
    assert_eq!(eap.eap_type, Some(EapType::Md5Challenge));
}

#[tokio::test]
async fn test_unknown_client_gets_no_reply() {
    let allowed = Client {
        address: "10.0.0.0/8".to_string(),
        secret: "elsewhere".to_string(),
        name: None,
        enabled: true,
    };
    let addr = start(config(vec![allowed])).await;
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    socket
        .send_to(&access_request(1).encode().unwrap(), addr)
        .await
        .unwrap();

    let mut buf = vec![0u8; Packet::MAX_PACKET_SIZE];
    let reply = timeout(Duration::from_millis(300), socket.recv_from(&mut buf)).await;
    assert!(reply.is_err());
}

#[tokio::test]
async fn test_bad_message_authenticator_is_dropped() {
    let addr = start(config(Vec::new())).await;
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let authenticator = generate_request_authenticator();
    let mut request = Packet::new(Code::AccessRequest, 9, authenticator);
    add_eap_to_radius_packet(&mut request, &EapPacket::identity_response(0, "alice")).unwrap();
    sign_response(&mut request, &authenticator, b"not-the-secret").unwrap();
    socket.send_to(&request.encode().unwrap(), addr).await.unwrap();

    let mut buf = vec![0u8; Packet::MAX_PACKET_SIZE];
    let reply = timeout(Duration::from_millis(300), socket.recv_from(&mut buf)).await;
    assert!(reply.is_err());
}

#[tokio::test]
async fn test_concurrent_clients() {
    let addr = start(config(Vec::new())).await;

    let tasks: Vec<_> = (0..4u8)
        .map(|i| {
            tokio::spawn(async move {
                let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
                socket
                    .send_to(&access_request(i).encode().unwrap(), addr)
                    .await
                    .unwrap();
                let mut buf = vec![0u8; Packet::MAX_PACKET_SIZE];
                let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
                    .await
                    .unwrap()
                    .unwrap();
                Packet::decode(&buf[..len]).unwrap().identifier
            })
        })
        .collect();

    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), i as u8);
    }
}
