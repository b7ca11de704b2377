//! Negotiation Engine
//!
//! Each call resolves the current method of a scope from its offer list and
//! cursor, lets it handle the inbound payload, and turns the end status it
//! records into the outbound EAP packet:
//!
//! | End status            | Outbound                                  |
//! |-----------------------|-------------------------------------------|
//! | `Unknown`             | Request, identifier = request id + 1      |
//! | `Success`             | Success, identifier = request id          |
//! | `Error`               | Failure, identifier = request id          |
//! | `AdvanceToNextMethod` | next method, same round, no inbound       |
//!
//! A Legacy-Nak advances to the next method the same way. A method that is
//! not offerable is skipped without spending a round. Identifiers always
//! derive from the identifier of the inbound root packet, so no number of
//! skips or advances in one pass moves them.

use crate::config::{Config, ConfigError, EapSettings};
use crate::context::{Frame, MethodContext};
use crate::method::credentials::{CredentialSource, SimpleCredentialStore};
use crate::method::MethodRegistry;
use crate::response::ModifierChain;
use crate::session::{EndStatus, Scope, SessionState, SessionToken};
use eap_proto::eap::LegacyNak;
use eap_proto::eap::tls::build_server_config;
use eap_proto::{EapCode, EapPacket, EapType};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{Instrument, debug, info, info_span, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("No method left to offer at depth {depth} (index {index})")]
    MethodsExhausted { depth: usize, index: usize },
    #[error("No implementation registered for {0:?}")]
    MethodNotRegistered(EapType),
}

/// What the engine knows about the RADIUS request it is answering
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub token: SessionToken,
    /// Identifier of the inbound EAP packet, 0 when the request carried none
    pub request_id: u8,
    /// EAP packet carried by the RADIUS request
    pub root_payload: Option<EapPacket>,
}

impl RequestInfo {
    pub fn new(token: SessionToken, root_payload: Option<EapPacket>) -> Self {
        RequestInfo {
            token,
            request_id: root_payload.as_ref().map(|p| p.identifier).unwrap_or(0),
            root_payload,
        }
    }

    /// Request whose EAP-Message did not decode but still named its
    /// identifier
    pub fn undecodable(token: SessionToken, request_id: u8) -> Self {
        RequestInfo {
            token,
            request_id,
            root_payload: None,
        }
    }
}

pub struct Negotiator {
    settings: EapSettings,
    registry: MethodRegistry,
    credentials: Arc<dyn CredentialSource>,
    tls: Option<Arc<rustls::ServerConfig>>,
}

impl Negotiator {
    pub fn new(
        settings: EapSettings,
        registry: MethodRegistry,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Negotiator {
            settings,
            registry,
            credentials,
            tls: None,
        }
    }

    /// Negotiator with the default methods, the configured users and, when
    /// a certificate is configured, the TLS-based methods
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let credentials = Arc::new(SimpleCredentialStore::from_users(&config.users));
        let negotiator = Self::new(config.eap.clone(), MethodRegistry::with_defaults(), credentials);

        match &config.eap.tls {
            Some(tls) => {
                let server_config = build_server_config(tls)
                    .map_err(|e| ConfigError::Invalid(format!("TLS configuration: {}", e)))?;
                Ok(negotiator.with_tls_config(Arc::new(server_config)))
            }
            None => Ok(negotiator),
        }
    }

    pub fn with_tls_config(mut self, config: Arc<rustls::ServerConfig>) -> Self {
        self.tls = Some(config);
        self
    }

    pub fn settings(&self) -> &EapSettings {
        &self.settings
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialSource> {
        &self.credentials
    }

    pub fn tls_config(&self) -> Option<&Arc<rustls::ServerConfig>> {
        self.tls.as_ref()
    }

    /// Ordered methods offered in `scope`
    pub fn offer_list(&self, scope: &Scope) -> &[EapType] {
        match scope.tunnel() {
            None => &self.settings.methods,
            Some(EapType::Peap) => &self.settings.peap_inner_methods,
            Some(_) => &[],
        }
    }

    /// Run one round of the outer negotiation on the root payload of
    /// `request`.
    ///
    /// `session` is updated in place. Post-processors registered by the
    /// methods that ran are added to `modifiers`.
    pub async fn negotiate(
        &self,
        request: &RequestInfo,
        session: &mut SessionState,
        modifiers: &mut ModifierChain,
    ) -> Result<EapPacket, NegotiationError> {
        run_scope(Round {
            negotiator: self,
            request,
            session,
            modifiers,
            scope: Scope::root(),
            parent: None,
            inbound: request.root_payload.as_ref(),
        })
        .await
    }
}

impl fmt::Debug for Negotiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiator")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

/// Everything one pass over a scope needs
pub(crate) struct Round<'a> {
    pub negotiator: &'a Negotiator,
    pub request: &'a RequestInfo,
    pub session: &'a mut SessionState,
    pub modifiers: &'a mut ModifierChain,
    pub scope: Scope,
    pub parent: Option<&'a Frame>,
    pub inbound: Option<&'a EapPacket>,
}

fn is_nak(packet: &EapPacket) -> bool {
    packet.code == EapCode::Response && packet.is_type(EapType::Nak)
}

pub(crate) async fn run_scope(round: Round<'_>) -> Result<EapPacket, NegotiationError> {
    let Round {
        negotiator,
        request,
        session,
        modifiers,
        scope,
        parent,
        mut inbound,
    } = round;
    let offers = negotiator.offer_list(&scope);
    let depth = scope.depth();

    loop {
        let index = session.cursor(&scope).method_index;
        let Some(&method_type) = offers.get(index) else {
            warn!(
                request_id = request.request_id,
                depth = depth,
                index = index,
                "No method left to offer"
            );
            return Err(NegotiationError::MethodsExhausted { depth, index });
        };

        if let Some(packet) = inbound.filter(|p| is_nak(p)) {
            let nak = LegacyNak::decode(&packet.data);
            info!(
                request_id = request.request_id,
                depth = depth,
                offered = ?method_type,
                desired = ?nak.desired_types(),
                "Peer refused method"
            );
            session.cursor_mut(&scope).advance();
            inbound = None;
            continue;
        }

        let mut method = negotiator
            .registry()
            .create(method_type, negotiator)
            .ok_or(NegotiationError::MethodNotRegistered(method_type))?;

        if !method.offerable() {
            debug!(
                depth = depth,
                method = ?method_type,
                "Skipping method that is not offerable"
            );
            session.cursor_mut(&scope).advance();
            continue;
        }

        if let Some(packet) = inbound
            && packet.code == EapCode::Response
            && packet.is_type(method_type)
            && let Err(e) = method.decode(&packet.data)
        {
            warn!(
                request_id = request.request_id,
                depth = depth,
                method = ?method_type,
                error = %e,
                "Failed to decode inbound payload, handling without it"
            );
        }

        let span = info_span!("eap_method", method = ?method_type, depth = depth);
        let frame = Frame {
            scope: scope.clone(),
            method: method_type,
            span: span.clone(),
        };
        let (payload, status) = {
            let mut ctx = MethodContext::new(
                negotiator,
                request,
                &mut *session,
                &mut *modifiers,
                frame,
                parent,
            );
            let payload = method.handle(&mut ctx).instrument(span).await;
            (payload, ctx.end_status())
        };

        session.cursor_mut(&scope).end_status = status;
        if let Some(modifier) = method.response_modifier() {
            modifiers.register(method_type, modifier);
        }

        match status {
            EndStatus::Success => {
                info!(depth = depth, method = ?method_type, "Method succeeded");
                return Ok(EapPacket::success(request.request_id));
            }
            EndStatus::Error => {
                info!(depth = depth, method = ?method_type, "Method failed");
                return Ok(EapPacket::failure(request.request_id));
            }
            EndStatus::AdvanceToNextMethod => {
                debug!(depth = depth, method = ?method_type, "Advancing to next method");
                session.cursor_mut(&scope).advance();
                inbound = None;
            }
            EndStatus::Unknown => {
                return Ok(EapPacket::request(
                    request.request_id.wrapping_add(1),
                    method_type,
                    payload.unwrap_or_default(),
                ));
            }
        }
    }
}
