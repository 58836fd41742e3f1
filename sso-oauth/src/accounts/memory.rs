//! In-memory account store
//!
//! Stands in for the host's user database in development and tests.
//! Usernames are unique; email matching is case-insensitive and an empty
//! email never matches.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::AccountStore;
use crate::error::{SsoError, SsoResult};
use crate::identity::{LocalUserId, RoleTag};

/// Account record held by [`MemoryAccountStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryAccount {
    /// Account id
    pub id: LocalUserId,
    /// Unique username
    pub username: String,
    /// Email address, possibly empty
    pub email: String,
    /// Free-form account fields
    pub fields: HashMap<String, String>,
    /// Applied role grants
    pub roles: BTreeSet<RoleTag>,
}

#[derive(Debug, Default)]
struct AccountTable {
    next_id: LocalUserId,
    accounts: HashMap<LocalUserId, MemoryAccount>,
}

impl AccountTable {
    fn get_mut(&mut self, user_id: LocalUserId) -> SsoResult<&mut MemoryAccount> {
        self.accounts
            .get_mut(&user_id)
            .ok_or_else(|| SsoError::StoreUnavailable(format!("no account with id {user_id}")))
    }
}

/// Account store backed by a shared `HashMap`
#[derive(Debug, Clone, Default)]
pub struct MemoryAccountStore {
    table: Arc<RwLock<AccountTable>>,
}

impl MemoryAccountStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of an account
    pub async fn account(&self, user_id: LocalUserId) -> Option<MemoryAccount> {
        self.table.read().await.accounts.get(&user_id).cloned()
    }

    /// Number of accounts in the store
    pub async fn account_count(&self) -> usize {
        self.table.read().await.accounts.len()
    }

    /// Remove an account and all of its fields
    pub async fn delete_account(&self, user_id: LocalUserId) -> Option<MemoryAccount> {
        self.table.write().await.accounts.remove(&user_id)
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_account_by_email(&self, email: &str) -> SsoResult<Option<LocalUserId>> {
        if email.is_empty() {
            return Ok(None);
        }

        let table = self.table.read().await;
        Ok(table
            .accounts
            .values()
            .find(|account| account.email.eq_ignore_ascii_case(email))
            .map(|account| account.id))
    }

    async fn create_account(&self, username: &str, email: &str) -> SsoResult<LocalUserId> {
        if username.trim().is_empty() {
            return Err(SsoError::AccountCreation("username is required".to_string()));
        }

        let mut table = self.table.write().await;
        if table
            .accounts
            .values()
            .any(|account| account.username.eq_ignore_ascii_case(username))
        {
            return Err(SsoError::AccountCreation(format!(
                "username {username} is taken"
            )));
        }

        table.next_id += 1;
        let id = table.next_id;
        table.accounts.insert(
            id,
            MemoryAccount {
                id,
                username: username.to_string(),
                email: email.to_string(),
                fields: HashMap::new(),
                roles: BTreeSet::new(),
            },
        );

        Ok(id)
    }

    async fn set_account_field(
        &self,
        user_id: LocalUserId,
        field: &str,
        value: &str,
    ) -> SsoResult<()> {
        let mut table = self.table.write().await;
        table
            .get_mut(user_id)?
            .fields
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn get_account_field(
        &self,
        user_id: LocalUserId,
        field: &str,
    ) -> SsoResult<Option<String>> {
        let table = self.table.read().await;
        Ok(table
            .accounts
            .get(&user_id)
            .and_then(|account| account.fields.get(field).cloned()))
    }

    async fn apply_role_grant(&self, user_id: LocalUserId, role: &RoleTag) -> SsoResult<()> {
        let mut table = self.table.write().await;
        table.get_mut(user_id)?.roles.insert(role.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_find_by_email() {
        let store = MemoryAccountStore::new();
        let id = store.create_account("alice", "Alice@Example.com").await.unwrap();

        assert_eq!(
            store.find_account_by_email("alice@example.com").await.unwrap(),
            Some(id)
        );
        assert_eq!(store.find_account_by_email("").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_email_never_matches() {
        let store = MemoryAccountStore::new();
        store.create_account("nomail", "").await.unwrap();
        assert_eq!(store.find_account_by_email("").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let store = MemoryAccountStore::new();
        store.create_account("bob", "").await.unwrap();

        let err = store.create_account("BOB", "").await.unwrap_err();
        assert!(matches!(err, SsoError::AccountCreation(_)));
        assert_eq!(store.account_count().await, 1);
    }

    #[tokio::test]
    async fn test_fields_and_roles() {
        let store = MemoryAccountStore::new();
        let id = store.create_account("carol", "").await.unwrap();

        store.set_account_field(id, "bnetId", "42").await.unwrap();
        store
            .apply_role_grant(id, &RoleTag::new("members"))
            .await
            .unwrap();

        assert_eq!(
            store.get_account_field(id, "bnetId").await.unwrap(),
            Some("42".to_string())
        );
        let account = store.account(id).await.unwrap();
        assert!(account.roles.contains(&RoleTag::new("members")));
    }

    #[tokio::test]
    async fn test_missing_account_field_is_none() {
        let store = MemoryAccountStore::new();
        assert_eq!(store.get_account_field(99, "bnetId").await.unwrap(), None);
        assert!(store.set_account_field(99, "bnetId", "42").await.is_err());
    }
}
