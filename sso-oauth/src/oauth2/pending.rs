//! Pending authorizations
//!
//! Holds the PKCE verifier for every authorization the browser has been sent
//! to, keyed by its CSRF state token. Each entry is single-use and expires
//! after the configured TTL. The store holds at most `capacity` entries;
//! inserting beyond that evicts the entry closest to expiry.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
struct PendingAuthorization {
    pkce_verifier: String,
    expires_at: SystemTime,
}

impl PendingAuthorization {
    fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at <= now
    }
}

/// State-token store for in-flight authorization code flows
#[derive(Debug)]
pub struct PendingAuthorizations {
    ttl: Duration,
    capacity: usize,
    states: Mutex<HashMap<String, PendingAuthorization>>,
}

impl PendingAuthorizations {
    /// Create an empty store whose entries live for `ttl`, holding at most
    /// `capacity` of them
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Remember the PKCE verifier for a freshly issued state token
    pub fn insert(&self, state: impl Into<String>, pkce_verifier: impl Into<String>) {
        let now = SystemTime::now();
        let mut states = self.states.lock();
        states.retain(|_, pending| !pending.is_expired(now));

        while states.len() >= self.capacity {
            let Some(oldest) = states
                .iter()
                .min_by_key(|(_, pending)| pending.expires_at)
                .map(|(token, _)| token.clone())
            else {
                break;
            };
            states.remove(&oldest);
            tracing::debug!(capacity = self.capacity, "Pending authorizations full, evicted oldest");
        }

        states.insert(
            state.into(),
            PendingAuthorization {
                pkce_verifier: pkce_verifier.into(),
                expires_at: now + self.ttl,
            },
        );
    }

    /// Consume a state token, returning its PKCE verifier
    ///
    /// Returns `None` for unknown, expired or already-used tokens.
    #[must_use]
    pub fn take(&self, state: &str) -> Option<String> {
        let pending = self.states.lock().remove(state)?;
        if pending.is_expired(SystemTime::now()) {
            tracing::warn!("OAuth2 state token expired");
            return None;
        }
        Some(pending.pkce_verifier)
    }

    /// Drop every expired entry, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let now = SystemTime::now();
        let mut states = self.states.lock();
        let before = states.len();
        states.retain(|_, pending| !pending.is_expired(now));
        let removed = before - states.len();

        if removed > 0 {
            tracing::debug!(
                removed = removed,
                remaining = states.len(),
                "Cleaned up expired OAuth2 state tokens"
            );
        }
        removed
    }

    /// Number of entries currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    /// Whether no authorizations are pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_is_single_use() {
        let pending = PendingAuthorizations::new(Duration::from_secs(600), 16);
        pending.insert("state", "verifier");

        assert_eq!(pending.take("state").as_deref(), Some("verifier"));
        assert_eq!(pending.take("state"), None);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_unknown_state() {
        let pending = PendingAuthorizations::new(Duration::from_secs(600), 16);
        assert_eq!(pending.take("forged"), None);
    }

    #[test]
    fn test_expired_state_is_rejected() {
        let pending = PendingAuthorizations::new(Duration::ZERO, 16);
        pending.insert("state", "verifier");
        assert_eq!(pending.take("state"), None);
    }

    #[test]
    fn test_cleanup_expired() {
        let expired = PendingAuthorizations::new(Duration::ZERO, 16);
        expired.insert("a", "1");
        assert_eq!(expired.cleanup_expired(), 1);
        assert!(expired.is_empty());

        let live = PendingAuthorizations::new(Duration::from_secs(600), 16);
        live.insert("a", "1");
        live.insert("b", "2");
        assert_eq!(live.cleanup_expired(), 0);
        assert_eq!(live.len(), 2);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let pending = PendingAuthorizations::new(Duration::from_secs(600), 2);
        pending.insert("first", "1");
        std::thread::sleep(Duration::from_millis(2));
        pending.insert("second", "2");
        std::thread::sleep(Duration::from_millis(2));
        pending.insert("third", "3");

        assert_eq!(pending.len(), 2);
        assert_eq!(pending.take("first"), None);
        assert_eq!(pending.take("second").as_deref(), Some("2"));
        assert_eq!(pending.take("third").as_deref(), Some("3"));
    }

    #[test]
    fn test_repeated_logins_stay_bounded() {
        let pending = PendingAuthorizations::new(Duration::from_secs(600), 8);
        for i in 0..100 {
            pending.insert(format!("state-{i}"), "verifier");
        }
        assert_eq!(pending.len(), 8);
        assert_eq!(pending.take("state-99").as_deref(), Some("verifier"));
    }
}
