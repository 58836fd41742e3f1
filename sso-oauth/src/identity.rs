//! Canonical identity types
//!
//! These are the provider-independent shapes that flow between the profile
//! normalizer, the identity index and the account linker.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{SsoError, SsoResult};

/// Local account identifier as issued by the host's account store
pub type LocalUserId = i64;

/// Role or group membership applied to a local account on first login
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleTag(String);

impl RoleTag {
    /// Create a role tag from its name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the role name
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provider-independent identity produced by a
/// [`ProfileNormalizer`](crate::profile::ProfileNormalizer)
///
/// The external id is validated once, at construction, so every
/// `CanonicalIdentity` in circulation carries a non-empty id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalIdentity {
    external_id: String,
    display_name: String,
    email: String,
    grants: BTreeSet<RoleTag>,
}

impl CanonicalIdentity {
    /// Create an identity with no email and no grants
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::MalformedResponse`] if `external_id` is empty
    pub fn new(external_id: impl Into<String>, display_name: impl Into<String>) -> SsoResult<Self> {
        let external_id = external_id.into();
        if external_id.trim().is_empty() {
            return Err(SsoError::MalformedResponse(
                "external id must not be empty".to_string(),
            ));
        }

        Ok(Self {
            external_id,
            display_name: display_name.into(),
            email: String::new(),
            grants: BTreeSet::new(),
        })
    }

    /// Set the email used for merge matching (empty disables merging)
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Add a role grant
    #[must_use]
    pub fn with_grant(mut self, role: RoleTag) -> Self {
        self.grants.insert(role);
        self
    }

    /// Stable provider-side identifier
    #[must_use]
    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    /// Human-readable handle, used as the username on account creation
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Email address, possibly empty
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Role grants to apply when the account is first linked
    #[must_use]
    pub const fn grants(&self) -> &BTreeSet<RoleTag> {
        &self.grants
    }
}

/// Identity index key, namespaced by provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    /// Provider name (e.g. `bnet`)
    pub provider: String,
    /// Provider-side identifier
    pub external_id: String,
}

impl IdentityKey {
    /// Build a key from its parts
    pub fn new(provider: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            external_id: external_id.into(),
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.external_id)
    }
}
