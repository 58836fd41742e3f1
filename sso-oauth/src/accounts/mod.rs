//! Host account store interface
//!
//! The local account belongs to the host application. The linker only
//! references it through this trait: find by email, create, per-account
//! fields, and role grants.

use async_trait::async_trait;

use crate::error::SsoResult;
use crate::identity::{LocalUserId, RoleTag};

pub mod memory;

pub use memory::{MemoryAccount, MemoryAccountStore};

/// Access to the host's user store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Find an existing account by email address
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the store cannot be reached
    async fn find_account_by_email(&self, email: &str) -> SsoResult<Option<LocalUserId>>;

    /// Create a new account
    ///
    /// # Errors
    ///
    /// Returns `AccountCreation` if the host rejects the account, or
    /// `StoreUnavailable` if the store cannot be reached
    async fn create_account(&self, username: &str, email: &str) -> SsoResult<LocalUserId>;

    /// Set a named field on an account
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the store cannot be reached
    async fn set_account_field(&self, user_id: LocalUserId, field: &str, value: &str)
        -> SsoResult<()>;

    /// Read a named field from an account
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the store cannot be reached
    async fn get_account_field(&self, user_id: LocalUserId, field: &str)
        -> SsoResult<Option<String>>;

    /// Apply a role or group membership to an account
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot apply the grant
    async fn apply_role_grant(&self, user_id: LocalUserId, role: &RoleTag) -> SsoResult<()>;
}
