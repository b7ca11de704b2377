//! Conversation state that survives between stateless RADIUS requests
//!
//! A [`SessionState`] holds, per scope, the index into that scope's offer list
//! and the last end status, plus every method's private state keyed by
//! `(scope, method)`, and the last reply sent so a retransmitted request can
//! be answered with it. The root scope is the outer negotiation; a tunnel method
//! opens a child scope for its inner negotiation.

pub mod replay;
pub mod store;
pub mod token;

pub use replay::RequestFingerprint;
pub use store::{MemorySessionStore, SessionStore, SharedSession};
pub use token::SessionToken;

use eap_proto::{EapType, Packet};
use replay::LastReply;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Outcome recorded by a method for the current round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndStatus {
    /// Still talking, send another Request
    #[default]
    Unknown,
    Success,
    Error,
    /// Move on to the next method without spending a round
    AdvanceToNextMethod,
}

impl EndStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, EndStatus::Success | EndStatus::Error)
    }
}

/// Path of enclosing tunnel methods, empty at the root
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Scope(Vec<EapType>);

impl Scope {
    pub fn root() -> Self {
        Scope(Vec::new())
    }

    pub fn child(&self, tunnel: EapType) -> Self {
        let mut path = self.0.clone();
        path.push(tunnel);
        Scope(path)
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Innermost enclosing tunnel
    pub fn tunnel(&self) -> Option<EapType> {
        self.0.last().copied()
    }
}

/// Negotiation position within one scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub method_index: usize,
    pub end_status: EndStatus,
}

impl Cursor {
    pub fn advance(&mut self) {
        self.method_index += 1;
        self.end_status = EndStatus::Unknown;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub scope: Scope,
    pub method: EapType,
}

impl StateKey {
    pub fn new(scope: Scope, method: EapType) -> Self {
        StateKey { scope, method }
    }
}

/// Everything remembered about one conversation
#[derive(Default)]
pub struct SessionState {
    cursors: HashMap<Scope, Cursor>,
    method_state: HashMap<StateKey, Box<dyn Any + Send>>,
    last_reply: Option<LastReply>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor of `scope`, blank when the scope has never run
    pub fn cursor(&self, scope: &Scope) -> Cursor {
        self.cursors.get(scope).copied().unwrap_or_default()
    }

    pub fn cursor_mut(&mut self, scope: &Scope) -> &mut Cursor {
        self.cursors.entry(scope.clone()).or_default()
    }

    pub fn method_index(&self) -> usize {
        self.cursor(&Scope::root()).method_index
    }

    pub fn end_status(&self) -> EndStatus {
        self.cursor(&Scope::root()).end_status
    }

    pub fn get<T: Any>(&self, key: &StateKey) -> Option<&T> {
        self.method_state.get(key)?.downcast_ref()
    }

    pub fn get_mut<T: Any>(&mut self, key: &StateKey) -> Option<&mut T> {
        self.method_state.get_mut(key)?.downcast_mut()
    }

    pub fn insert<T: Any + Send>(&mut self, key: StateKey, value: T) {
        self.method_state.insert(key, Box::new(value));
    }

    /// Remove and return the state under `key`. A value of another type is
    /// left in place.
    pub fn take<T: Any>(&mut self, key: &StateKey) -> Option<T> {
        let boxed = self.method_state.remove(key)?;
        match boxed.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                self.method_state.insert(key.clone(), other);
                None
            }
        }
    }

    pub fn contains(&self, key: &StateKey) -> bool {
        self.method_state.contains_key(key)
    }

    /// Reply already sent for `fingerprint`, if it was the latest request
    pub fn replay(&self, fingerprint: &RequestFingerprint) -> Option<&Packet> {
        self.last_reply
            .as_ref()
            .filter(|last| last.fingerprint == *fingerprint)
            .map(|last| &last.reply)
    }

    /// Keep `reply` so a retransmission of the request gets it back
    pub fn remember_reply(&mut self, fingerprint: RequestFingerprint, reply: Packet) {
        self.last_reply = Some(LastReply { fingerprint, reply });
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("cursors", &self.cursors)
            .field("method_state", &self.method_state.keys().collect::<Vec<_>>())
            .field(
                "last_reply",
                &self.last_reply.as_ref().map(|last| last.fingerprint),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eap_proto::Code;

    #[test]
    fn test_blank_state() {
        let state = SessionState::new();
        assert_eq!(state.method_index(), 0);
        assert_eq!(state.end_status(), EndStatus::Unknown);
        assert_eq!(state.cursor(&Scope::root().child(EapType::Peap)), Cursor::default());
    }

    #[test]
    fn test_cursor_advance_resets_status() {
        let mut state = SessionState::new();
        let root = Scope::root();
        state.cursor_mut(&root).end_status = EndStatus::AdvanceToNextMethod;
        state.cursor_mut(&root).advance();
        assert_eq!(state.method_index(), 1);
        assert_eq!(state.end_status(), EndStatus::Unknown);
    }

    #[test]
    fn test_scopes_are_independent() {
        let mut state = SessionState::new();
        let root = Scope::root();
        let inner = root.child(EapType::Peap);
        assert_eq!(inner.depth(), 1);
        assert_eq!(inner.tunnel(), Some(EapType::Peap));

        state.insert(StateKey::new(root.clone(), EapType::Identity), "outer".to_string());
        state.insert(StateKey::new(inner.clone(), EapType::Identity), "inner".to_string());
        state.cursor_mut(&inner).advance();

        assert_eq!(
            state.get::<String>(&StateKey::new(root.clone(), EapType::Identity)),
            Some(&"outer".to_string())
        );
        assert_eq!(
            state.get::<String>(&StateKey::new(inner.clone(), EapType::Identity)),
            Some(&"inner".to_string())
        );
        assert_eq!(state.method_index(), 0);
        assert_eq!(state.cursor(&inner).method_index, 1);
    }

    #[test]
    fn test_take_with_wrong_type_keeps_value() {
        let mut state = SessionState::new();
        let key = StateKey::new(Scope::root(), EapType::Md5Challenge);
        state.insert(key.clone(), 42u32);

        assert_eq!(state.take::<String>(&key), None);
        assert!(state.contains(&key));
        if let Some(value) = state.get_mut::<u32>(&key) {
            *value += 1;
        }
        assert_eq!(state.take::<u32>(&key), Some(43));
        assert!(!state.contains(&key));
    }

    #[test]
    fn test_only_latest_reply_is_replayed() {
        let mut state = SessionState::new();
        let first = RequestFingerprint::new(1, &[1; 16]);
        let second = RequestFingerprint::new(2, &[2; 16]);
        assert!(state.replay(&first).is_none());

        state.remember_reply(first, Packet::new(Code::AccessChallenge, 1, [0; 16]));
        assert_eq!(state.replay(&first).map(|p| p.identifier), Some(1));

        state.remember_reply(second, Packet::new(Code::AccessAccept, 2, [0; 16]));
        assert!(state.replay(&first).is_none());
        assert_eq!(state.replay(&second).map(|p| p.code), Some(Code::AccessAccept));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(EndStatus::Success.is_terminal());
        assert!(EndStatus::Error.is_terminal());
        assert!(!EndStatus::AdvanceToNextMethod.is_terminal());
        assert!(!EndStatus::Unknown.is_terminal());
    }
}
