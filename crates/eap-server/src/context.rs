//! Execution Context
//!
//! A [`MethodContext`] is what a method sees while it handles one round: its
//! own typed state and settings, the root payload of the RADIUS request, the
//! end-status slot of its scope, the per-request modifier chain and the
//! [`MethodContext::inner`] entry point that tunnel methods use to run a
//! nested negotiation. Contexts form a stack of [`Frame`]s, each
//! pointing at its parent, all sharing one [`SessionState`].

use crate::config::MethodSettings;
use crate::negotiate::{NegotiationError, Negotiator, RequestInfo, Round, run_scope};
use crate::response::ModifierChain;
use crate::session::{EndStatus, Scope, SessionState, StateKey};
use eap_proto::{EapPacket, EapType};
use futures::future::BoxFuture;
use std::any::Any;
use tracing::{Span, warn};

/// One level of the context stack
#[derive(Debug, Clone)]
pub struct Frame {
    pub scope: Scope,
    pub method: EapType,
    pub span: Span,
}

impl Frame {
    pub fn state_key(&self) -> StateKey {
        StateKey::new(self.scope.clone(), self.method)
    }
}

pub struct MethodContext<'a> {
    negotiator: &'a Negotiator,
    request: &'a RequestInfo,
    session: &'a mut SessionState,
    modifiers: &'a mut ModifierChain,
    frame: Frame,
    parent: Option<&'a Frame>,
    settings: MethodSettings,
    end_status: Option<EndStatus>,
}

impl<'a> MethodContext<'a> {
    pub(crate) fn new(
        negotiator: &'a Negotiator,
        request: &'a RequestInfo,
        session: &'a mut SessionState,
        modifiers: &'a mut ModifierChain,
        frame: Frame,
        parent: Option<&'a Frame>,
    ) -> Self {
        let settings = negotiator.settings().for_method(frame.method);
        MethodContext {
            negotiator,
            request,
            session,
            modifiers,
            frame,
            parent,
            settings,
            end_status: None,
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn parent(&self) -> Option<&Frame> {
        self.parent
    }

    pub fn scope(&self) -> &Scope {
        &self.frame.scope
    }

    pub fn depth(&self) -> usize {
        self.frame.scope.depth()
    }

    pub fn request(&self) -> &RequestInfo {
        self.request
    }

    pub fn negotiator(&self) -> &Negotiator {
        self.negotiator
    }

    pub fn settings(&self) -> &MethodSettings {
        &self.settings
    }

    /// EAP packet of the RADIUS request, whatever the depth of this method
    pub fn root_payload(&self) -> Option<&EapPacket> {
        self.request.root_payload.as_ref()
    }

    pub fn state<T: Any>(&self) -> Option<&T> {
        self.session.get(&self.frame.state_key())
    }

    pub fn state_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.session.get_mut(&self.frame.state_key())
    }

    pub fn set_state<T: Any + Send>(&mut self, value: T) {
        self.session.insert(self.frame.state_key(), value);
    }

    pub fn take_state<T: Any>(&mut self) -> Option<T> {
        self.session.take(&self.frame.state_key())
    }

    /// State another method left in the same scope
    pub fn state_of<T: Any>(&self, method: EapType) -> Option<&T> {
        self.session
            .get(&StateKey::new(self.frame.scope.clone(), method))
    }

    /// Record how this round ended. Only the first call counts.
    pub fn end(&mut self, status: EndStatus) {
        match self.end_status {
            None => self.end_status = Some(status),
            Some(existing) => warn!(
                method = ?self.frame.method,
                existing = ?existing,
                ignored = ?status,
                "End status already set"
            ),
        }
    }

    pub fn end_status(&self) -> EndStatus {
        self.end_status.unwrap_or_default()
    }

    /// End status the nested negotiation of this method last recorded
    pub fn inner_status(&self) -> EndStatus {
        self.session
            .cursor(&self.frame.scope.child(self.frame.method))
            .end_status
    }

    /// Run one round of the nested negotiation opened by this method.
    ///
    /// The child scope keeps its own offer list, cursor and end status; ending
    /// it does not end this method.
    pub fn inner<'b>(
        &'b mut self,
        inbound: Option<&'b EapPacket>,
    ) -> BoxFuture<'b, Result<EapPacket, NegotiationError>> {
        let round = Round {
            negotiator: self.negotiator,
            request: self.request,
            session: &mut *self.session,
            modifiers: &mut *self.modifiers,
            scope: self.frame.scope.child(self.frame.method),
            parent: Some(&self.frame),
            inbound,
        };
        Box::pin(run_scope(round))
    }
}
