use super::EapMethod;
use crate::context::MethodContext;
use crate::negotiate::Negotiator;
use crate::response::{MppeKeyModifier, ResponseModifier};
use crate::session::EndStatus;
use crate::tunnel::{KeyMaterial, RustlsEngine, TunnelState, TunnelStep};
use async_trait::async_trait;
use eap_proto::eap::tls::EapTlsPacket;
use eap_proto::{EapError, EapType};
use std::sync::Arc;
use tracing::{info, warn};

/// EAP-TLS (type 13, RFC 5216)
///
/// Succeeds once the handshake is complete and the peer has acknowledged the
/// server's last flight. Not offerable without a server certificate.
pub struct TlsMethod {
    enabled: bool,
    config: Option<Arc<rustls::ServerConfig>>,
    packet: Option<EapTlsPacket>,
    keys: Option<KeyMaterial>,
}

impl TlsMethod {
    pub fn new(negotiator: &Negotiator) -> Self {
        TlsMethod {
            enabled: !negotiator.settings().is_disabled(EapType::Tls),
            config: negotiator.tls_config().cloned(),
            packet: None,
            keys: None,
        }
    }
}

#[async_trait]
impl EapMethod for TlsMethod {
    fn method_type(&self) -> EapType {
        EapType::Tls
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
        let mut tunnel = match ctx.take_state::<TunnelState>() {
            Some(tunnel) => tunnel,
            None => {
                let Some(config) = self.config.clone() else {
                    warn!("EAP-TLS has no server certificate");
                    ctx.end(EndStatus::Error);
                    return None;
                };
                TunnelState::new(
                    EapType::Tls,
                    0,
                    Box::new(RustlsEngine::new(config)),
                    ctx.settings(),
                )
            }
        };

        match tunnel.step(self.packet.as_ref()).await {
            TunnelStep::Send(packet) => {
                ctx.set_state(tunnel);
                Some(packet.to_eap_data())
            }
            TunnelStep::Ready => {
                info!(peer = ?tunnel.peer(), "EAP-TLS authentication succeeded");
                self.keys = tunnel.keys().cloned();
                ctx.end(EndStatus::Success);
                None
            }
            TunnelStep::Data(_) => {
                warn!("Unexpected application data in EAP-TLS");
                ctx.end(EndStatus::Error);
                None
            }
            TunnelStep::Failed(_) => {
                ctx.end(EndStatus::Error);
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
