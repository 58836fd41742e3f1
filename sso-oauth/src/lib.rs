//! sso-oauth: OAuth2 single-sign-on login for an existing user store
//!
//! Authenticates users against a third-party OAuth2 provider, normalizes the
//! provider's profile endpoints into a canonical identity, and links that
//! identity to a local account:
//!
//! - **Profile Normalizer** ([`profile`]): provider responses in, one
//!   [`CanonicalIdentity`](identity::CanonicalIdentity) out
//! - **Identity Index** ([`index`]): `(provider, external id)` to local user,
//!   bound at most once
//! - **Account Linker** ([`linker`]): lookup, merge by email or create, then
//!   bind and apply role grants
//!
//! The host supplies an [`AccountStore`](accounts::AccountStore) for its user
//! table and a [`LoginHook`](registration::LoginHook) to start a session.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use sso_oauth::prelude::*;
//! use std::sync::Arc;
//!
//! struct StartSession;
//!
//! #[async_trait::async_trait]
//! impl LoginHook for StartSession {
//!     async fn on_successful_login(&self, user_id: LocalUserId) -> SsoResult<()> {
//!         tracing::info!(user_id, "session started");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     sso_oauth::observability::init()?;
//!     let config = SsoConfig::load()?;
//!
//!     let pool = sqlx::PgPool::connect("postgres://localhost/forum").await?;
//!     let index = PgIdentityIndex::new(pool);
//!     index.migrate().await?;
//!
//!     let linker = AccountLinker::new(
//!         config.provider.name.clone(),
//!         Arc::new(index),
//!         Arc::new(MemoryAccountStore::new()),
//!     );
//!     let normalizer =
//!         GuildProfileNormalizer::new(config.profile.clone(), config.grants.clone());
//!
//!     let state = SsoState::new(
//!         &config,
//!         Arc::new(normalizer),
//!         Arc::new(linker),
//!         Arc::new(StartSession),
//!     )?;
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:4567").await?;
//!     axum::serve(listener, router(state)).await?;
//!     Ok(())
//! }
//! ```

pub mod accounts;
pub mod config;
pub mod error;
pub mod identity;
pub mod index;
pub mod linker;
pub mod oauth2;
pub mod observability;
pub mod profile;
pub mod registration;

pub mod prelude {
    //! Convenience re-exports for wiring the provider into a host

    pub use crate::accounts::{AccountStore, MemoryAccountStore};
    pub use crate::config::SsoConfig;
    pub use crate::error::{SsoError, SsoResult};
    pub use crate::identity::{CanonicalIdentity, IdentityKey, LocalUserId, RoleTag};
    pub use crate::index::{IdentityIndex, MemoryIdentityIndex, PgIdentityIndex};
    pub use crate::linker::AccountLinker;
    pub use crate::oauth2::SsoProvider;
    pub use crate::profile::{GuildProfileNormalizer, ProfileNormalizer, RawResponses};
    pub use crate::registration::{router, LoginHook, SsoState, StrategyDescriptor};
}
