//! EAP methods
//!
//! Every method implements [`EapMethod`] and is created per round by a
//! factory in the [`MethodRegistry`]. A fresh instance carries nothing over
//! between rounds; anything that must survive goes through the context's
//! typed state.

pub mod credentials;
pub mod extension;
pub mod identity;
pub mod md5;
pub mod nak;
pub mod peap;
pub mod registry;
pub mod tls;

pub use registry::{MethodFactory, MethodRegistry};

use crate::context::MethodContext;
use crate::response::ResponseModifier;
use async_trait::async_trait;
use eap_proto::{EapError, EapType};
use std::sync::Arc;

#[async_trait]
pub trait EapMethod: Send + Sync {
    fn method_type(&self) -> EapType;

    /// Whether the engine may offer this method. The engine skips methods
    /// that say no without spending a round.
    fn offerable(&self) -> bool {
        true
    }

    /// Load the Type-Data of an inbound Response of this type
    fn decode(&mut self, data: &[u8]) -> Result<(), EapError>;

    fn encode(&self) -> Vec<u8>;

    /// Handle one round. The returned bytes become the Type-Data of the next
    /// Request when no end status is recorded.
    async fn handle(&mut self, ctx: &mut MethodContext<'_>) -> Option<Vec<u8>>;

    /// Hook that amends the outer response, e.g. to attach derived keys
    fn response_modifier(&self) -> Option<Arc<dyn ResponseModifier>> {
        None
    }
}
