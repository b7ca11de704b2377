//! EAP method negotiation and TLS tunnel bridging for RADIUS
//!
//! Access-Requests are stateless; an EAP conversation is not. This crate
//! stitches the two together:
//!
//! - [`session`]: the correlation token carried in the State attribute and
//!   the per-conversation state it points to
//! - [`negotiate`]: which method runs, with which identifier, and when the
//!   conversation ends
//! - [`context`]: what a method sees while it handles a round, including
//!   nested negotiations inside tunnels
//! - [`method`]: Identity, Legacy-Nak, MD5-Challenge, EAP-TLS, PEAPv0 and
//!   PEAP-Extension
//! - [`tunnel`]: TLS handshakes driven one EAP fragment per round trip
//! - [`response`]: the RADIUS reply, signed and with keys attached
//! - [`listener`]: a small UDP front end
//!
//! # Example
//!
//! ```rust,no_run
//! use eap_server::{Config, EapServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config.json")?;
//!     let server = EapServer::from_config(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod listener;
pub mod method;
pub mod negotiate;
pub mod response;
pub mod session;
pub mod tunnel;

pub use config::{Client, Config, ConfigError, EapSettings, MethodOverrides, MethodSettings, User};
pub use context::MethodContext;
pub use listener::{EapServer, ServerError};
pub use method::credentials::{CredentialSource, SimpleCredentialStore};
pub use method::{EapMethod, MethodRegistry};
pub use negotiate::{NegotiationError, Negotiator, RequestInfo};
pub use response::{EapRadiusHandler, ModifierChain, ResponseError, ResponseModifier};
pub use session::{
    EndStatus, MemorySessionStore, RequestFingerprint, SessionState, SessionStore, SessionToken,
};
