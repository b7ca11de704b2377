use super::EapMethod;
use crate::context::MethodContext;
use crate::negotiate::Negotiator;
use crate::session::EndStatus;
use async_trait::async_trait;
use eap_proto::{EapError, EapType};
use tracing::info;

/// Identity a peer announced, stored under the Identity method of its scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity(pub String);

/// Identity (type 1)
///
/// Sends an empty Request/Identity until the peer answers, then stores the
/// answer and hands over to the next method in the same round.
#[derive(Debug)]
pub struct IdentityMethod {
    enabled: bool,
    identity: Option<String>,
}

impl IdentityMethod {
    pub fn new(negotiator: &Negotiator) -> Self {
        IdentityMethod {
            enabled: !negotiator.settings().is_disabled(EapType::Identity),
            identity: None,
        }
    }
}

#[async_trait]
impl EapMethod for IdentityMethod {
    fn method_type(&self) -> EapType {
        EapType::Identity
    }

    fn offerable(&self) -> bool {
        self.enabled
    }

    fn decode(&mut self, data: &[u8]) -> Result<(), EapError> {
        self.identity = Some(String::from_utf8_lossy(data).into_owned());
        Ok(())
    }

    fn encode(&self) -> Vec<u8> {
        self.identity
            .as_deref()
            .map(|identity| identity.as_bytes().to_vec())
            .unwrap_or_default()
    }

    async fn handle(&mut self, ctx: &mut MethodContext<'_>) -> Option<Vec<u8>> {
        match self.identity.take() {
            Some(identity) => {
                info!(identity = %identity, depth = ctx.depth(), "Peer identity received");
                ctx.set_state(PeerIdentity(identity));
                ctx.end(EndStatus::AdvanceToNextMethod);
                None
            }
            None => Some(Vec::new()),
        }
    }
}
