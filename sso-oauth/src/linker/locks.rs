//! Per-identity mutual exclusion
//!
//! Concurrent logins for the same `(provider, external id)` within one
//! process are serialized so only one of them can reach account creation.
//! Entries are weak; a key's lock disappears once nobody holds or awaits it.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::identity::IdentityKey;

#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    locks: Mutex<HashMap<IdentityKey, Weak<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub(crate) async fn acquire(&self, key: &IdentityKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            locks.retain(|_, lock| lock.strong_count() > 0);

            if let Some(lock) = locks.get(key).and_then(Weak::upgrade) {
                lock
            } else {
                let lock = Arc::new(AsyncMutex::new(()));
                locks.insert(key.clone(), Arc::downgrade(&lock));
                lock
            }
        }; // Drop the table lock before awaiting

        lock.lock_owned().await
    }

    #[cfg(test)]
    pub(crate) fn live_keys(&self) -> usize {
        self.locks
            .lock()
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::default());
        let key = IdentityKey::new("bnet", "42");

        let guard = locks.acquire(&key).await;
        let contender = {
            let locks = Arc::clone(&locks);
            let key = key.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&key).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let locks = KeyedLocks::default();
        let _a = locks.acquire(&IdentityKey::new("bnet", "1")).await;
        let _b = locks.acquire(&IdentityKey::new("github", "1")).await;
        assert_eq!(locks.live_keys(), 2);
    }

    #[tokio::test]
    async fn test_released_keys_are_dropped() {
        let locks = KeyedLocks::default();
        {
            let _guard = locks.acquire(&IdentityKey::new("bnet", "1")).await;
        }
        assert_eq!(locks.live_keys(), 0);
    }
}
