use super::EapMethod;
use super::credentials::CredentialSource;
use super::identity::PeerIdentity;
use crate::context::MethodContext;
use crate::negotiate::Negotiator;
use crate::session::EndStatus;
use async_trait::async_trait;
use eap_proto::eap::md5::{MD5_CHALLENGE_SIZE, Md5Value, verify_response};
use eap_proto::{EapError, EapType};
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};

/// Challenge issued to the peer, kept until its Response arrives
#[derive(Debug, Clone)]
pub struct Md5State {
    pub challenge: [u8; MD5_CHALLENGE_SIZE],
    /// Identifier of the Request that carried the challenge
    pub identifier: u8,
}

/// MD5-Challenge (type 4)
pub struct Md5Method {
    enabled: bool,
    credentials: Arc<dyn CredentialSource>,
    response: Option<Md5Value>,
}

impl Md5Method {
    pub fn new(negotiator: &Negotiator) -> Self {
        Md5Method {
            enabled: !negotiator.settings().is_disabled(EapType::Md5Challenge),
            credentials: Arc::clone(negotiator.credentials()),
            response: None,
        }
    }

    fn challenge(&self, ctx: &mut MethodContext<'_>) -> Option<Vec<u8>> {
        let mut challenge = [0u8; MD5_CHALLENGE_SIZE];
        rand::rng().fill(&mut challenge);

        let data = Md5Value {
            value: challenge.to_vec(),
            name: String::new(),
        }
        .encode();
        match data {
            Ok(data) => {
                let identifier = ctx.request().request_id.wrapping_add(1);
                ctx.set_state(Md5State {
                    challenge,
                    identifier,
                });
                Some(data)
            }
            Err(e) => {
                warn!(error = %e, "Failed to encode MD5 challenge");
                ctx.end(EndStatus::Error);
                None
            }
        }
    }

    fn verify(&self, ctx: &MethodContext<'_>, state: &Md5State, response: &Md5Value) -> bool {
        let username = match ctx.state_of::<PeerIdentity>(EapType::Identity) {
            Some(identity) => identity.0.clone(),
            None => response.name.clone(),
        };
        let hash = match response.response_hash() {
            Ok(hash) => hash,
            Err(e) => {
                warn!(username = %username, error = %e, "Malformed MD5 response");
                return false;
            }
        };
        let Some(password) = self.credentials.get_user_password(&username) else {
            info!(username = %username, "Unknown user");
            return false;
        };

        let ok = verify_response(state.identifier, password.as_bytes(), &state.challenge, &hash);
        info!(username = %username, success = ok, "MD5 response checked");
        ok
    }
}

#[async_trait]
impl EapMethod for Md5Method {
    fn method_type(&self) -> EapType {
        EapType::Md5Challenge
    }

    fn offerable(&self) -> bool {
        self.enabled
    }

    fn decode(&mut self, data: &[u8]) -> Result<(), EapError> {
        self.response = Some(Md5Value::decode(data)?);
        Ok(())
    }

    fn encode(&self) -> Vec<u8> {
        self.response
            .as_ref()
            .and_then(|response| response.encode().ok())
            .unwrap_or_default()
    }

    async fn handle(&mut self, ctx: &mut MethodContext<'_>) -> Option<Vec<u8>> {
        let state = ctx.state::<Md5State>().cloned();
        match (state, self.response.take()) {
            (Some(state), Some(response)) => {
                let status = if self.verify(ctx, &state, &response) {
                    EndStatus::Success
                } else {
                    EndStatus::Error
                };
                ctx.end(status);
                None
            }
            // first round, or a response that did not decode
            _ => self.challenge(ctx),
        }
    }
}
