use super::EapMethod;
use crate::context::MethodContext;
use async_trait::async_trait;
use eap_proto::eap::LegacyNak;
use eap_proto::{EapError, EapType};

/// Legacy-Nak (type 3). Only ever sent by peers, never offered. The engine
/// acts on a Nak before any method runs, so handling is a no-op.
#[derive(Debug, Default)]
pub struct NakMethod {
    nak: LegacyNak,
}

impl NakMethod {
    pub fn desired_types(&self) -> Vec<EapType> {
        self.nak.desired_types()
    }
}

#[async_trait]
impl EapMethod for NakMethod {
    fn method_type(&self) -> EapType {
        EapType::Nak
    }

    fn offerable(&self) -> bool {
        false
    }

    fn decode(&mut self, data: &[u8]) -> Result<(), EapError> {
        self.nak = LegacyNak::decode(data);
        Ok(())
    }

    fn encode(&self) -> Vec<u8> {
        self.nak.encode()
    }

    async fn handle(&mut self, _ctx: &mut MethodContext<'_>) -> Option<Vec<u8>> {
        None
    }
}
