//! Response Assembly
//!
//! Turns one Access-Request into its reply: resolve the session token, run
//! the negotiation, map the outbound EAP code to a RADIUS code, let the
//! methods' post-processors amend the reply, then add State, EAP-Message and
//! Message-Authenticator and compute the Response Authenticator. The finished
//! reply stays with the conversation until the next request, so a NAS
//! retransmission is answered without running the negotiation again.
//!
//! | EAP code | RADIUS code      |
//! |----------|------------------|
//! | Request  | Access-Challenge |
//! | Success  | Access-Accept    |
//! | Failure  | Access-Reject    |

use crate::negotiate::{Negotiator, RequestInfo};
use crate::session::{EndStatus, RequestFingerprint, SessionStore, SessionToken};
use eap_proto::eap::{
    EapError, add_eap_to_radius_packet, eap_from_radius_packet, eap_identifier_from_radius_packet,
};
use eap_proto::message_auth::{sign_response, verify_request};
use eap_proto::mppe::mppe_key_attributes;
use eap_proto::{
    Attribute, AttributeType, Code, EapCode, EapPacket, EapType, Packet, PacketError,
    calculate_response_authenticator,
};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),
    #[error("EAP error: {0}")]
    Eap(#[from] EapError),
    #[error("Invalid Message-Authenticator")]
    InvalidMessageAuthenticator,
    #[error("Not an Access-Request: {0:?}")]
    UnexpectedCode(Code),
    #[error("Post-processor for {method:?} failed: {reason}")]
    Modifier { method: EapType, reason: String },
}

/// Hook a method registers to amend the outer reply
pub trait ResponseModifier: Send + Sync {
    fn modify(
        &self,
        request: &Packet,
        response: &mut Packet,
        secret: &[u8],
    ) -> Result<(), ResponseError>;
}

/// Post-processors collected during one request, at most one per method
/// type, applied in registration order
#[derive(Default)]
pub struct ModifierChain {
    entries: Vec<(EapType, Arc<dyn ResponseModifier>)>,
}

impl ModifierChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `modifier` unless `method` already registered one
    pub fn register(&mut self, method: EapType, modifier: Arc<dyn ResponseModifier>) {
        if self.entries.iter().any(|(registered, _)| *registered == method) {
            return;
        }
        self.entries.push((method, modifier));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply every post-processor, stopping at the first failure
    pub fn apply(
        &self,
        request: &Packet,
        response: &mut Packet,
        secret: &[u8],
    ) -> Result<(), ResponseError> {
        for (method, modifier) in &self.entries {
            modifier.modify(request, response, secret).map_err(|e| {
                warn!(method = ?method, error = %e, "Response post-processor failed");
                e
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for ModifierChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(method, _)| method))
            .finish()
    }
}

/// Attaches MS-MPPE-Recv-Key and MS-MPPE-Send-Key to an Access-Accept
pub struct MppeKeyModifier {
    msk: Vec<u8>,
}

impl MppeKeyModifier {
    pub fn new(msk: Vec<u8>) -> Self {
        MppeKeyModifier { msk }
    }
}

impl ResponseModifier for MppeKeyModifier {
    fn modify(
        &self,
        request: &Packet,
        response: &mut Packet,
        secret: &[u8],
    ) -> Result<(), ResponseError> {
        if response.code != Code::AccessAccept {
            return Ok(());
        }
        for attr in mppe_key_attributes(&self.msk, secret, &request.authenticator)? {
            response.add_attribute(attr);
        }
        Ok(())
    }
}

fn radius_code(eap: &EapPacket) -> Code {
    match eap.code {
        EapCode::Request => Code::AccessChallenge,
        EapCode::Success => Code::AccessAccept,
        EapCode::Failure | EapCode::Response => Code::AccessReject,
    }
}

/// Answers EAP-carrying Access-Requests
pub struct EapRadiusHandler {
    negotiator: Arc<Negotiator>,
    store: Arc<dyn SessionStore>,
}

impl EapRadiusHandler {
    pub fn new(negotiator: Arc<Negotiator>, store: Arc<dyn SessionStore>) -> Self {
        EapRadiusHandler { negotiator, store }
    }

    pub fn negotiator(&self) -> &Negotiator {
        &self.negotiator
    }

    /// Build the reply to `request`.
    ///
    /// Requests with an invalid Message-Authenticator are refused with
    /// [`ResponseError::InvalidMessageAuthenticator`] and must be dropped
    /// silently by the caller. A retransmission of the latest request of a
    /// conversation gets the reply already sent, byte for byte. Any failure
    /// after negotiation falls back to a bare Access-Reject.
    pub async fn handle_access_request(
        &self,
        request: &Packet,
        secret: &[u8],
    ) -> Result<Packet, ResponseError> {
        if request.code != Code::AccessRequest {
            return Err(ResponseError::UnexpectedCode(request.code));
        }
        if verify_request(request, secret) == Some(false) {
            warn!(request_id = request.identifier, "Invalid Message-Authenticator");
            return Err(ResponseError::InvalidMessageAuthenticator);
        }

        let token = match request.state().and_then(SessionToken::from_state) {
            Some(token) => token,
            None => {
                let token = SessionToken::generate();
                debug!(token = %token, "Starting new conversation");
                token
            }
        };

        let info = match eap_from_radius_packet(request) {
            Ok(inbound) => RequestInfo::new(token.clone(), inbound),
            Err(e) => {
                let eap_id = eap_identifier_from_radius_packet(request);
                warn!(
                    request_id = request.identifier,
                    eap_id = ?eap_id,
                    error = %e,
                    "Undecodable EAP-Message, continuing without it"
                );
                RequestInfo::undecodable(token.clone(), eap_id.unwrap_or(0))
            }
        };

        let fingerprint = RequestFingerprint::of(request);
        let session = self.store.load_or_blank(&token).await;
        let mut state = session.lock().await;
        if let Some(reply) = state.replay(&fingerprint) {
            info!(
                request_id = request.identifier,
                token = %token,
                "Retransmitted request, resending previous reply"
            );
            return Ok(reply.clone());
        }

        let mut modifiers = ModifierChain::new();
        let outcome = self
            .negotiator
            .negotiate(&info, &mut state, &mut modifiers)
            .await;
        let (eap, status) = match outcome {
            Ok(eap) => (eap, state.end_status()),
            Err(e) => {
                warn!(token = %token, error = %e, "Negotiation ended the conversation");
                (EapPacket::failure(info.request_id), EndStatus::Error)
            }
        };
        self.store.persist(&token, status).await;

        let response = match assemble(request, secret, &token, &eap, &modifiers) {
            Ok(response) => {
                info!(
                    request_id = request.identifier,
                    eap_id = eap.identifier,
                    code = ?response.code,
                    "Reply assembled"
                );
                response
            }
            Err(e) => {
                error!(request_id = request.identifier, error = %e, "Failed to assemble reply");
                reject(request, secret, info.request_id)?
            }
        };
        state.remember_reply(fingerprint, response.clone());
        Ok(response)
    }
}

fn finish(response: &mut Packet, request: &Packet, secret: &[u8]) -> Result<(), ResponseError> {
    sign_response(response, &request.authenticator, secret)?;
    response.authenticator =
        calculate_response_authenticator(response, &request.authenticator, secret)?;
    Ok(())
}

fn assemble(
    request: &Packet,
    secret: &[u8],
    token: &SessionToken,
    eap: &EapPacket,
    modifiers: &ModifierChain,
) -> Result<Packet, ResponseError> {
    let mut response = Packet::reply_to(request, radius_code(eap));
    modifiers.apply(request, &mut response, secret)?;
    response.set_attribute(Attribute::new(
        AttributeType::State as u8,
        token.as_bytes().to_vec(),
    )?);
    add_eap_to_radius_packet(&mut response, eap)?;
    for proxy_state in request.find_all_attributes(AttributeType::ProxyState as u8) {
        response.add_attribute(proxy_state.clone());
    }
    finish(&mut response, request, secret)?;
    Ok(response)
}

/// Bare Access-Reject with an EAP Failure
fn reject(request: &Packet, secret: &[u8], eap_id: u8) -> Result<Packet, ResponseError> {
    let mut response = Packet::reply_to(request, Code::AccessReject);
    add_eap_to_radius_packet(&mut response, &EapPacket::failure(eap_id))?;
    finish(&mut response, request, secret)?;
    Ok(response)
}
