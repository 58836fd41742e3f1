//! Host integration
//!
//! What the host needs to offer this provider as a login option: the
//! [`StrategyDescriptor`] shown on its login page, the [`LoginHook`] it
//! implements to start a session, and the axum [`router`] serving the
//! authorization and callback routes.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SsoConfig;
use crate::error::{SsoError, SsoResult};
use crate::identity::LocalUserId;
use crate::linker::AccountLinker;
use crate::oauth2::{PendingAuthorizations, SsoProvider};
use crate::profile::ProfileNormalizer;

mod handlers;

pub use handlers::router;

/// Login strategy entry pushed to the host's strategy list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyDescriptor {
    /// Provider name
    pub name: String,
    /// Route that starts the login
    pub url: String,
    /// Route the provider redirects back to
    pub callback_url: String,
    /// Icon for the login button
    pub icon: String,
    /// Requested scopes
    pub scope: Vec<String>,
}

impl StrategyDescriptor {
    /// Describe the configured provider
    #[must_use]
    pub fn new(config: &SsoConfig) -> Self {
        let name = &config.provider.name;
        Self {
            name: name.clone(),
            url: format!("/auth/{name}"),
            callback_url: format!("/auth/{name}/callback"),
            icon: config.login.icon.clone(),
            scope: config.provider.scopes(),
        }
    }
}

/// Called once a login has resolved to a local user
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoginHook: Send + Sync {
    /// Establish the host session for `user_id`
    ///
    /// # Errors
    ///
    /// Any error aborts the login with the generic failure response
    async fn on_successful_login(&self, user_id: LocalUserId) -> SsoResult<()>;
}

struct SsoStateInner {
    provider: SsoProvider,
    normalizer: Arc<dyn ProfileNormalizer>,
    linker: Arc<AccountLinker>,
    pending: PendingAuthorizations,
    hook: Arc<dyn LoginHook>,
    success_redirect: String,
}

/// Shared state behind the login routes
#[derive(Clone)]
pub struct SsoState {
    inner: Arc<SsoStateInner>,
}

impl std::fmt::Debug for SsoState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsoState")
            .field("provider", &self.inner.provider.name())
            .field("pending", &self.inner.pending.len())
            .finish_non_exhaustive()
    }
}

impl SsoState {
    /// Assemble the login state from validated configuration
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid or names a provider
    /// other than the linker's
    pub fn new(
        config: &SsoConfig,
        normalizer: Arc<dyn ProfileNormalizer>,
        linker: Arc<AccountLinker>,
        hook: Arc<dyn LoginHook>,
    ) -> SsoResult<Self> {
        config.validate()?;
        if linker.provider() != config.provider.name {
            return Err(SsoError::Config(format!(
                "linker namespace {:?} does not match provider {:?}",
                linker.provider(),
                config.provider.name
            )));
        }

        let provider = SsoProvider::new(config)?;
        tracing::info!(
            provider = %provider.name(),
            callback_url = %config.login.callback_url(provider.name()),
            "SSO provider configured"
        );

        Ok(Self {
            inner: Arc::new(SsoStateInner {
                provider,
                normalizer,
                linker,
                pending: PendingAuthorizations::new(
                    Duration::from_secs(config.login.state_ttl_secs),
                    config.login.max_pending,
                ),
                hook,
                success_redirect: config.login.success_redirect.clone(),
            }),
        })
    }

    /// Configured provider
    #[must_use]
    pub fn provider(&self) -> &SsoProvider {
        &self.inner.provider
    }

    /// Strategy entry for the host's login page
    #[must_use]
    pub fn descriptor(&self) -> &StrategyDescriptor {
        self.inner.provider.descriptor()
    }

    /// Account linker, also used by the host's user-erasure path
    #[must_use]
    pub fn linker(&self) -> &Arc<AccountLinker> {
        &self.inner.linker
    }

    /// Pending authorizations awaiting their callback
    #[must_use]
    pub fn pending(&self) -> &PendingAuthorizations {
        &self.inner.pending
    }
}
