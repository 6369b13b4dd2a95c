//! OAuth 2.0 / OIDC single sign-on broker.
//!
//! Two services share this crate:
//!
//! - the auth backend ([`backend`]) runs the authorization-code flow against
//!   an identity provider and keeps the resulting ID token in an http-only
//!   session cookie;
//! - the relay ([`relay`]) forwards login, callback, me and logout to the
//!   backend for callers that cannot hold cookies (LLM agents, MCP clients),
//!   replaying the backend's session cookie from a per-caller jar.

pub mod backend;
mod client;
pub mod config;
mod error;
mod nonce;
mod provider;
mod providers;
pub mod relay;
pub mod server;
mod store;
mod token;
mod types;

pub use client::{DEFAULT_TIMEOUT, OidcClient, OidcClientConfig};
pub use error::{BrokerError, ConfigError, ProviderError};
pub use nonce::StateNonce;
pub use provider::IdentityProvider;
pub use providers::{DEFAULT_AUTHORITY_HOST, EntraProvider, GenericOidcProvider, ProviderEndpoints};
pub use store::{DEFAULT_STATE_TTL, MemoryStateStore, StateStore};
pub use token::{JwksVerifier, SessionVerifier, TokenMode, decode_unverified};
pub use types::{AuthorizationRequest, CallbackParams, TokenResponse, UserIdentity};
