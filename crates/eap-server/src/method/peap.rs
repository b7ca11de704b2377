//! PEAPv0 (type 25)
//!
//! Phase 1 is a TLS handshake exactly as in EAP-TLS. Phase 2 runs the inner
//! negotiation over the tunnel's application data. Inner packets travel
//! without their EAP header (the peer rebuilds it from the outer packet),
//! except PEAP-Extension packets, which keep it.
//!
//! Once the inner negotiation ends, the server sends a Result AVP and the
//! outer method ends when the peer answers with its own.

use super::EapMethod;
use crate::context::MethodContext;
use crate::negotiate::Negotiator;
use crate::response::{MppeKeyModifier, ResponseModifier};
use crate::session::EndStatus;
use crate::tunnel::{KeyMaterial, RustlsEngine, TunnelState, TunnelStep};
use async_trait::async_trait;
use eap_proto::eap::extension::{ExtensionPayload, ExtensionResult};
use eap_proto::eap::tls::EapTlsPacket;
use eap_proto::{EapCode, EapError, EapPacket, EapType};
use std::sync::Arc;
use tracing::{debug, info, warn};

const PEAP_VERSION: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase2 {
    NotStarted,
    Inner,
    /// Result AVP sent, waiting for the peer's
    AwaitingResult(ExtensionResult),
}

struct PeapState {
    tunnel: TunnelState,
    phase2: Phase2,
}

enum Outcome {
    Send(EapTlsPacket),
    End(EndStatus),
}

impl From<TunnelStep> for Outcome {
    fn from(step: TunnelStep) -> Self {
        match step {
            TunnelStep::Send(packet) => Outcome::Send(packet),
            _ => Outcome::End(EndStatus::Error),
        }
    }
}

/// True when `plaintext` is a whole EAP-Extension packet rather than the
/// compressed Type + Type-Data form
fn has_full_header(plaintext: &[u8]) -> bool {
    plaintext.len() > EapPacket::HEADER_LENGTH
        && matches!(EapCode::from_u8(plaintext[0]), Some(EapCode::Request | EapCode::Response))
        && u16::from_be_bytes([plaintext[2], plaintext[3]]) as usize == plaintext.len()
        && plaintext[4] == EapType::PeapExtension.as_u8()
}

/// Rebuild the inner Response carried in tunnel plaintext
pub fn decode_inner(plaintext: &[u8], identifier: u8) -> Result<EapPacket, EapError> {
    if has_full_header(plaintext) {
        return EapPacket::from_bytes(plaintext);
    }

    let length = plaintext.len() + EapPacket::HEADER_LENGTH;
    let length = u16::try_from(length).map_err(|_| EapError::InvalidLength(length))?;
    let mut bytes = Vec::with_capacity(length as usize);
    bytes.push(EapCode::Response.as_u8());
    bytes.push(identifier);
    bytes.extend_from_slice(&length.to_be_bytes());
    bytes.extend_from_slice(plaintext);
    EapPacket::from_bytes(&bytes)
}

/// Tunnel plaintext for an inner packet
pub fn encode_inner(packet: &EapPacket) -> Vec<u8> {
    let bytes = packet.to_bytes();
    if packet.is_type(EapType::PeapExtension) {
        bytes
    } else {
        bytes[EapPacket::HEADER_LENGTH..].to_vec()
    }
}

fn result_request(identifier: u8, result: ExtensionResult) -> EapPacket {
    EapPacket::request(
        identifier,
        EapType::PeapExtension,
        ExtensionPayload::result(result).encode(),
    )
}

pub struct PeapMethod {
    enabled: bool,
    config: Option<Arc<rustls::ServerConfig>>,
    packet: Option<EapTlsPacket>,
    keys: Option<KeyMaterial>,
}

impl PeapMethod {
    pub fn new(negotiator: &Negotiator) -> Self {
        PeapMethod {
            enabled: !negotiator.settings().is_disabled(EapType::Peap),
            config: negotiator.tls_config().cloned(),
            packet: None,
            keys: None,
        }
    }

    /// One round of the inner negotiation, sealed into the tunnel
    async fn run_inner(
        ctx: &mut MethodContext<'_>,
        state: &mut PeapState,
        inbound: Option<&EapPacket>,
    ) -> Outcome {
        let request_id = ctx.request().request_id;
        let outcome = ctx.inner(inbound).await;
        let reply = match outcome {
            Ok(packet) if !ctx.inner_status().is_terminal() => packet,
            Ok(_) => {
                let result = if ctx.inner_status() == EndStatus::Success {
                    ExtensionResult::Success
                } else {
                    ExtensionResult::Failure
                };
                info!(result = ?result, "Inner authentication finished");
                state.phase2 = Phase2::AwaitingResult(result);
                result_request(request_id.wrapping_add(1), result)
            }
            Err(e) => {
                warn!(error = %e, "Inner negotiation failed");
                state.phase2 = Phase2::AwaitingResult(ExtensionResult::Failure);
                result_request(request_id.wrapping_add(1), ExtensionResult::Failure)
            }
        };
        state.tunnel.seal(&encode_inner(&reply)).into()
    }

    /// Outer status once the peer has answered our Result AVP
    fn conclude(plaintext: &[u8], request_id: u8, sent: ExtensionResult) -> EndStatus {
        let received = decode_inner(plaintext, request_id)
            .ok()
            .filter(|packet| packet.is_type(EapType::PeapExtension))
            .and_then(|packet| ExtensionPayload::decode(&packet.data).ok())
            .and_then(|payload| payload.result_value());

        debug!(sent = ?sent, received = ?received, "Result exchange");
        match (sent, received) {
            (ExtensionResult::Success, Some(ExtensionResult::Success)) => EndStatus::Success,
            _ => EndStatus::Error,
        }
    }
}

#[async_trait]
impl EapMethod for PeapMethod {
    fn method_type(&self) -> EapType {
        EapType::Peap
    }

    fn offerable(&self) -> bool {
        self.enabled && self.config.is_some()
    }

    fn decode(&mut self, data: &[u8]) -> Result<(), EapError> {
        self.packet = Some(EapTlsPacket::from_eap_data(data)?);
        Ok(())
    }

    fn encode(&self) -> Vec<u8> {
        self.packet
            .as_ref()
            .map(EapTlsPacket::to_eap_data)
            .unwrap_or_default()
    }

    async fn handle(&mut self, ctx: &mut MethodContext<'_>) -> Option<Vec<u8>> {
        let mut state = match ctx.take_state::<PeapState>() {
            Some(state) => state,
            None => {
                let Some(config) = self.config.clone() else {
                    warn!("PEAP has no server certificate");
                    ctx.end(EndStatus::Error);
                    return None;
                };
                PeapState {
                    tunnel: TunnelState::new(
                        EapType::Peap,
                        PEAP_VERSION,
                        Box::new(RustlsEngine::new(config)),
                        ctx.settings(),
                    ),
                    phase2: Phase2::NotStarted,
                }
            }
        };

        let outcome = match state.tunnel.step(self.packet.as_ref()).await {
            TunnelStep::Send(packet) => Outcome::Send(packet),
            TunnelStep::Failed(_) => Outcome::End(EndStatus::Error),
            TunnelStep::Ready if state.phase2 == Phase2::NotStarted => {
                info!(peer = ?state.tunnel.peer(), "PEAP tunnel established");
                state.phase2 = Phase2::Inner;
                Self::run_inner(ctx, &mut state, None).await
            }
            TunnelStep::Ready => {
                warn!(phase2 = ?state.phase2, "Unexpected acknowledgement inside the tunnel");
                Outcome::End(EndStatus::Error)
            }
            TunnelStep::Data(plaintext) => match state.phase2 {
                Phase2::Inner => {
                    match decode_inner(&plaintext, ctx.request().request_id) {
                        Ok(inner) => Self::run_inner(ctx, &mut state, Some(&inner)).await,
                        Err(e) => {
                            warn!(error = %e, "Undecodable inner packet");
                            Self::run_inner(ctx, &mut state, None).await
                        }
                    }
                }
                Phase2::AwaitingResult(sent) => Outcome::End(Self::conclude(
                    &plaintext,
                    ctx.request().request_id,
                    sent,
                )),
                Phase2::NotStarted => Outcome::End(EndStatus::Error),
            },
        };

        match outcome {
            Outcome::Send(packet) => {
                ctx.set_state(state);
                Some(packet.to_eap_data())
            }
            Outcome::End(status) => {
                if status == EndStatus::Success {
                    self.keys = state.tunnel.keys().cloned();
                }
                ctx.end(status);
                None
            }
        }
    }

    fn response_modifier(&self) -> Option<Arc<dyn ResponseModifier>> {
        self.keys
            .as_ref()
            .map(|keys| Arc::new(MppeKeyModifier::new(keys.msk.clone())) as Arc<dyn ResponseModifier>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_compressed_inner_round_trip() {
        let request = EapPacket::identity_request(9, "");
        assert_eq!(encode_inner(&request), vec![EapType::Identity.as_u8()]);

        let response = decode_inner(b"\x01alice", 9).unwrap();
        assert_eq!(response, EapPacket::identity_response(9, "alice"));
    }

    #[test]
    fn test_extension_keeps_full_header() {
        let request = result_request(4, ExtensionResult::Success);
        let plaintext = encode_inner(&request);
        assert_eq!(plaintext, request.to_bytes());
        assert!(has_full_header(&plaintext));

        let response = EapPacket::response(
            4,
            EapType::PeapExtension,
            ExtensionPayload::result(ExtensionResult::Success).encode(),
        );
        assert_eq!(decode_inner(&response.to_bytes(), 77).unwrap(), response);
    }

    #[test]
    fn test_compressed_extension_type_is_not_full_header() {
        // Type 33 followed by an AVP, no header: length field does not match
        let mut plaintext = vec![EapType::PeapExtension.as_u8()];
        plaintext.extend(ExtensionPayload::result(ExtensionResult::Success).encode());
        assert!(!has_full_header(&plaintext));
        let decoded = decode_inner(&plaintext, 3).unwrap();
        assert_eq!(decoded.identifier, 3);
        assert!(decoded.is_type(EapType::PeapExtension));
    }

    #[test]
    fn test_decode_inner_rejects_unknown_type() {
        assert!(matches!(decode_inner(&[200, 1, 2], 1), Err(EapError::UnknownType(200))));
        assert!(decode_inner(&vec![1u8; 70000], 1).is_err());
    }

    #[test]
    fn test_conclude() {
        let success = EapPacket::response(
            2,
            EapType::PeapExtension,
            ExtensionPayload::result(ExtensionResult::Success).encode(),
        )
        .to_bytes();
        let failure = EapPacket::response(
            2,
            EapType::PeapExtension,
            ExtensionPayload::result(ExtensionResult::Failure).encode(),
        )
        .to_bytes();

        assert_eq!(
            PeapMethod::conclude(&success, 2, ExtensionResult::Success),
            EndStatus::Success
        );
        assert_eq!(
            PeapMethod::conclude(&failure, 2, ExtensionResult::Success),
            EndStatus::Error
        );
        assert_eq!(
            PeapMethod::conclude(&success, 2, ExtensionResult::Failure),
            EndStatus::Error
        );
        assert_eq!(PeapMethod::conclude(b"", 2, ExtensionResult::Success), EndStatus::Error);
    }

    proptest! {
        #[test]
        fn prop_decode_inner_never_panics(
            plaintext in proptest::collection::vec(any::<u8>(), 0..600),
            id: u8,
        ) {
            if let Ok(packet) = decode_inner(&plaintext, id) {
                if has_full_header(&plaintext) {
                    prop_assert_eq!(packet.code.as_u8(), plaintext[0]);
                } else {
                    prop_assert_eq!(packet.code, EapCode::Response);
                    prop_assert_eq!(packet.identifier, id);
                }
            }
        }
    }
}
