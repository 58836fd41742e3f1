//! In-memory identity index
//!
//! Single-instance backend for development and tests. Data is lost when the
//! last clone is dropped.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::IdentityIndex;
use crate::error::{SsoError, SsoResult};
use crate::identity::{IdentityKey, LocalUserId};

type LinkTable = Arc<RwLock<HashMap<IdentityKey, LocalUserId>>>;

/// Identity index backed by a shared `HashMap`
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentityIndex {
    links: LinkTable,
}

impl MemoryIdentityIndex {
    /// Create an empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored links
    pub async fn len(&self) -> usize {
        self.links.read().await.len()
    }

    /// Whether the index holds no links
    pub async fn is_empty(&self) -> bool {
        self.links.read().await.is_empty()
    }
}

#[async_trait]
impl IdentityIndex for MemoryIdentityIndex {
    async fn lookup(&self, provider: &str, external_id: &str) -> SsoResult<Option<LocalUserId>> {
        let key = IdentityKey::new(provider, external_id);
        Ok(self.links.read().await.get(&key).copied())
    }

    async fn bind(
        &self,
        provider: &str,
        external_id: &str,
        user_id: LocalUserId,
    ) -> SsoResult<()> {
        let key = IdentityKey::new(provider, external_id);
        let mut links = self.links.write().await;

        match links.get(&key) {
            Some(&existing) if existing == user_id => Ok(()),
            Some(&existing) => Err(SsoError::Conflict {
                provider: key.provider,
                external_id: key.external_id,
                existing,
            }),
            None => {
                links.insert(key, user_id);
                Ok(())
            }
        }
    }

    async fn unbind(&self, provider: &str, external_id: &str) -> SsoResult<()> {
        let key = IdentityKey::new(provider, external_id);
        self.links.write().await.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_miss_is_none() {
        let index = MemoryIdentityIndex::new();
        assert_eq!(index.lookup("bnet", "42").await.unwrap(), None);
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn test_bind_is_idempotent() {
        let index = MemoryIdentityIndex::new();
        index.bind("bnet", "42", 7).await.unwrap();
        index.bind("bnet", "42", 7).await.unwrap();

        assert_eq!(index.lookup("bnet", "42").await.unwrap(), Some(7));
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn test_bind_to_different_user_conflicts() {
        let index = MemoryIdentityIndex::new();
        index.bind("bnet", "42", 7).await.unwrap();

        let err = index.bind("bnet", "42", 8).await.unwrap_err();
        assert!(matches!(err, SsoError::Conflict { existing: 7, .. }));
        assert_eq!(index.lookup("bnet", "42").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_unbind_absent_is_noop() {
        let index = MemoryIdentityIndex::new();
        index.unbind("bnet", "missing").await.unwrap();

        index.bind("bnet", "42", 7).await.unwrap();
        index.unbind("bnet", "42").await.unwrap();
        assert_eq!(index.lookup("bnet", "42").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_providers_are_namespaced() {
        let index = MemoryIdentityIndex::new();
        index.bind("providerA", "1", 10).await.unwrap();
        index.bind("providerB", "1", 20).await.unwrap();

        assert_eq!(index.lookup("providerA", "1").await.unwrap(), Some(10));
        assert_eq!(index.lookup("providerB", "1").await.unwrap(), Some(20));

        index.unbind("providerA", "1").await.unwrap();
        assert_eq!(index.lookup("providerB", "1").await.unwrap(), Some(20));
    }
}
