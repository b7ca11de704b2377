use super::EapMethod;
use crate::context::MethodContext;
use async_trait::async_trait;
use eap_proto::eap::extension::{ExtensionPayload, ExtensionResult};
use eap_proto::{EapError, EapType};

/// PEAP-Extension (type 33). Carries the Result AVP inside a PEAP tunnel;
/// the PEAP method reads it directly, so this is never offered and handling
/// does nothing.
#[derive(Debug, Default)]
pub struct PeapExtensionMethod {
    payload: ExtensionPayload,
}

impl PeapExtensionMethod {
    pub fn result(&self) -> Option<ExtensionResult> {
        self.payload.result_value()
    }
}

#[async_trait]
impl EapMethod for PeapExtensionMethod {
    fn method_type(&self) -> EapType {
        EapType::PeapExtension
    }

    fn offerable(&self) -> bool {
        false
    }

    fn decode(&mut self, data: &[u8]) -> Result<(), EapError> {
        self.payload = ExtensionPayload::decode(data)?;
        Ok(())
    }

    fn encode(&self) -> Vec<u8> {
        self.payload.encode()
    }

    async fn handle(&mut self, _ctx: &mut MethodContext<'_>) -> Option<Vec<u8>> {
        None
    }
}
