//! Identity index
//!
//! Durable mapping from `(provider, external id)` to a local user id. The
//! linker consults it before any write, and account erasure severs a link
//! through it without touching the local account record.
//!
//! # Bind policy
//!
//! [`IdentityIndex::bind`] is an idempotent insert. Re-binding a pair to the
//! user it is already bound to succeeds; binding it to a *different* user
//! fails with [`SsoError::Conflict`](crate::error::SsoError::Conflict) and
//! never overwrites. The linker relies on that conflict to resolve racing
//! logins.

use async_trait::async_trait;

use crate::error::SsoResult;
use crate::identity::LocalUserId;

pub mod memory;
pub mod postgres;

pub use memory::MemoryIdentityIndex;
pub use postgres::PgIdentityIndex;

/// Storage backend for identity links
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityIndex: Send + Sync {
    /// Find the local user bound to an external identity
    ///
    /// A miss is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the backend cannot be reached
    async fn lookup(&self, provider: &str, external_id: &str) -> SsoResult<Option<LocalUserId>>;

    /// Bind an external identity to a local user
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the identity is bound to a different user, or
    /// `StoreUnavailable` if the backend cannot be reached
    async fn bind(&self, provider: &str, external_id: &str, user_id: LocalUserId)
        -> SsoResult<()>;

    /// Remove a binding; removing an absent binding succeeds
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the backend cannot be reached
    async fn unbind(&self, provider: &str, external_id: &str) -> SsoResult<()>;
}
