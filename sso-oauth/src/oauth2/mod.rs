//! OAuth2 authorization code flow
//!
//! - [`SsoProvider`]: authorization URL, code exchange and profile fetch
//! - [`PendingAuthorizations`]: single-use CSRF state tokens with their PKCE
//!   verifiers

pub mod pending;
pub mod provider;

pub use pending::PendingAuthorizations;
pub use provider::{AuthorizationRequest, ConfiguredClient, SsoProvider};
