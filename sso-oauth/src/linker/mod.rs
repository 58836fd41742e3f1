//! Account linking
//!
//! [`AccountLinker`] maps a [`CanonicalIdentity`] to a local account:
//!
//! 1. Look up `(provider, external id)` in the [`IdentityIndex`]. A hit returns
//!    the bound user immediately, with no writes and no grants.
//! 2. On a miss, find an existing account by email (skipped when the email is
//!    empty) and merge into it, or create a new account named after the
//!    display name.
//! 3. Bind the identity to that account, record `{provider}Id` on the account,
//!    then apply the identity's grants.
//!
//! Grants are applied only on the create/merge path. A user who later
//! qualifies for a grant does not receive it on subsequent logins, and a
//! grant that failed is not retried.
//!
//! An account carries at most one identity per provider: an email match on
//! an account whose `{provider}Id` names a different external id is a
//! `Conflict`, never a silent re-link. If the `{provider}Id` write fails after
//! binding, the binding is released so that erasure can always find it.
//!
//! Logins racing on the same identity are serialized per identity within a
//! process. Across processes, the index rejects the losing `bind` with
//! `Conflict` and the loser re-resolves once through a fresh lookup.

use std::fmt;
use std::sync::Arc;

use crate::accounts::AccountStore;
use crate::error::{SsoError, SsoResult};
use crate::identity::{CanonicalIdentity, IdentityKey, LocalUserId};
use crate::index::IdentityIndex;

mod locks;

use locks::KeyedLocks;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkPath {
    Merged,
    Created,
}

/// Finds or creates the local account for an external identity
pub struct AccountLinker {
    provider: String,
    index: Arc<dyn IdentityIndex>,
    accounts: Arc<dyn AccountStore>,
    locks: KeyedLocks,
}

impl fmt::Debug for AccountLinker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountLinker")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl AccountLinker {
    /// Create a linker for one provider namespace
    pub fn new(
        provider: impl Into<String>,
        index: Arc<dyn IdentityIndex>,
        accounts: Arc<dyn AccountStore>,
    ) -> Self {
        Self {
            provider: provider.into(),
            index,
            accounts,
            locks: KeyedLocks::default(),
        }
    }

    /// Provider namespace used for every index key
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Account field holding the linked external id (e.g. `bnetId`)
    #[must_use]
    pub fn id_field(&self) -> String {
        format!("{}Id", self.provider)
    }

    /// Find the local user bound to an external id, if any
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the index cannot be reached
    pub async fn lookup(&self, external_id: &str) -> SsoResult<Option<LocalUserId>> {
        self.index.lookup(&self.provider, external_id).await
    }

    /// Resolve an identity to a local user, creating or merging on first login
    ///
    /// A `Conflict` from a concurrent login elsewhere is retried once, which
    /// resolves through the winner's binding.
    ///
    /// # Errors
    ///
    /// - `StoreUnavailable` / `AccountCreation`: nothing was bound
    /// - `GrantApplication`: the binding is committed and the error carries
    ///   the user id; the missing grant is not retried on later logins
    /// - `Conflict`: the identity kept changing hands across both attempts,
    ///   or the email matched an account linked to another external id
    pub async fn link(&self, identity: &CanonicalIdentity) -> SsoResult<LocalUserId> {
        match self.link_once(identity).await {
            Err(SsoError::Conflict {
                external_id,
                existing,
                ..
            }) if external_id == identity.external_id() => {
                tracing::warn!(
                    provider = %self.provider,
                    external_id = %identity.external_id(),
                    existing = existing,
                    "Identity bound concurrently, re-resolving"
                );
                self.link_once(identity).await
            }
            result => result,
        }
    }

    async fn link_once(&self, identity: &CanonicalIdentity) -> SsoResult<LocalUserId> {
        let key = IdentityKey::new(&self.provider, identity.external_id());
        let _guard = self.locks.acquire(&key).await;

        if let Some(user_id) = self.lookup(identity.external_id()).await? {
            tracing::debug!(identity = %key, user_id = user_id, "Existing identity link");
            return Ok(user_id);
        }

        let (user_id, path) = self.resolve_account(identity).await?;

        if let Err(err) = self
            .index
            .bind(&self.provider, identity.external_id(), user_id)
            .await
        {
            if path == LinkPath::Created {
                tracing::warn!(
                    identity = %key,
                    orphaned_user_id = user_id,
                    error = %err,
                    "Created account could not be bound"
                );
            }
            return Err(err);
        }

        if let Err(err) = self
            .accounts
            .set_account_field(user_id, &self.id_field(), identity.external_id())
            .await
        {
            self.release_binding(&key, user_id).await;
            return Err(err);
        }

        tracing::info!(
            identity = %key,
            user_id = user_id,
            merged = path == LinkPath::Merged,
            "Linked external identity"
        );

        self.apply_grants(user_id, identity).await?;
        Ok(user_id)
    }

    /// Undo a bind whose account field could not be written
    ///
    /// Every binding must be reachable from its account's `{provider}Id`.
    async fn release_binding(&self, key: &IdentityKey, user_id: LocalUserId) {
        match self.index.unbind(&key.provider, &key.external_id).await {
            Ok(()) => tracing::warn!(
                identity = %key,
                user_id = user_id,
                "Account field write failed, binding released"
            ),
            Err(err) => tracing::warn!(
                identity = %key,
                user_id = user_id,
                error = %err,
                "Account field write failed and binding could not be released"
            ),
        }
    }

    async fn resolve_account(
        &self,
        identity: &CanonicalIdentity,
    ) -> SsoResult<(LocalUserId, LinkPath)> {
        if !identity.email().is_empty() {
            if let Some(user_id) = self.accounts.find_account_by_email(identity.email()).await? {
                self.ensure_unlinked(user_id, identity).await?;
                return Ok((user_id, LinkPath::Merged));
            }
        }

        let user_id = self
            .accounts
            .create_account(identity.display_name(), identity.email())
            .await
            .map_err(|err| match err {
                err @ (SsoError::StoreUnavailable(_) | SsoError::AccountCreation(_)) => err,
                other => SsoError::AccountCreation(other.to_string()),
            })?;

        Ok((user_id, LinkPath::Created))
    }

    /// Refuse to merge into an account already linked to another identity of
    /// this provider
    async fn ensure_unlinked(
        &self,
        user_id: LocalUserId,
        identity: &CanonicalIdentity,
    ) -> SsoResult<()> {
        match self.accounts.get_account_field(user_id, &self.id_field()).await? {
            Some(linked) if linked != identity.external_id() => {
                tracing::warn!(
                    provider = %self.provider,
                    external_id = %identity.external_id(),
                    linked_external_id = %linked,
                    user_id = user_id,
                    "Email matches an account linked to another identity"
                );
                Err(SsoError::Conflict {
                    provider: self.provider.clone(),
                    external_id: linked,
                    existing: user_id,
                })
            }
            _ => Ok(()),
        }
    }

    /// Apply every grant, reporting the first failure
    async fn apply_grants(&self, user_id: LocalUserId, identity: &CanonicalIdentity) -> SsoResult<()> {
        let mut first_failure = None;

        for role in identity.grants() {
            match self.accounts.apply_role_grant(user_id, role).await {
                Ok(()) => {
                    tracing::debug!(user_id = user_id, role = %role, "Applied role grant");
                }
                Err(err) => {
                    tracing::warn!(
                        user_id = user_id,
                        role = %role,
                        error = %err,
                        "Role grant failed"
                    );
                    first_failure.get_or_insert(SsoError::GrantApplication {
                        user_id,
                        role: role.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        first_failure.map_or(Ok(()), Err)
    }

    /// Sever the link for a local user being erased
    ///
    /// Reads the external id recorded on the account and removes its binding.
    /// Succeeds when the user was never linked.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the account store or index cannot be reached
    pub async fn delete_user_data(&self, user_id: LocalUserId) -> SsoResult<()> {
        let result = async {
            let Some(external_id) = self
                .accounts
                .get_account_field(user_id, &self.id_field())
                .await?
            else {
                tracing::debug!(user_id = user_id, "No linked identity to remove");
                return Ok(());
            };

            self.index.unbind(&self.provider, &external_id).await?;
            tracing::info!(
                provider = %self.provider,
                external_id = %external_id,
                user_id = user_id,
                "Removed identity link"
            );
            Ok(())
        }
        .await;

        if let Err(err) = &result {
            tracing::error!(
                provider = %self.provider,
                user_id = user_id,
                error = %err,
                "Could not remove identity link"
            );
        }
        result
    }
}
