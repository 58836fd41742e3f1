//! Error types and error handling
//!
//! Every failure path in the login flow returns a typed [`SsoError`]. When an
//! error reaches the HTTP layer it is logged in full and rendered as a generic
//! "Authentication failed" response, so the detailed kind never reaches the
//! end user's browser.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::identity::{LocalUserId, RoleTag};

/// Result alias used throughout the crate
pub type SsoResult<T> = Result<T, SsoError>;

/// Body returned to the browser for every failed login
pub const GENERIC_FAILURE_BODY: &str = "Authentication failed";

/// SSO error type
#[derive(Debug, Error)]
pub enum SsoError {
    /// Provider response missing required fields or unparsable
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    /// Identity index or account store unreachable (transient)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// External identity already bound to a different local account
    #[error("Identity {provider}:{external_id} is already bound to user {existing}")]
    Conflict {
        /// Provider namespace
        provider: String,
        /// Provider-side identifier
        external_id: String,
        /// Local user the identity is currently bound to
        existing: LocalUserId,
    },

    /// Host refused to create the local account
    #[error("Account creation failed: {0}")]
    AccountCreation(String),

    /// A role grant could not be applied; the binding itself is committed
    #[error("Failed to grant {role} to user {user_id}: {reason}")]
    GrantApplication {
        /// Local user whose binding was committed
        user_id: LocalUserId,
        /// Role that could not be applied
        role: RoleTag,
        /// Underlying failure
        reason: String,
    },

    /// Invalid plugin configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token exchange or profile endpoint request failed
    #[error("OAuth2 error: {0}")]
    OAuth(String),

    /// Unknown, expired or already-used CSRF state token
    #[error("Invalid or expired OAuth2 state token")]
    InvalidState,

    /// Provider reported an error on the callback
    #[error("Provider denied authorization: {0}")]
    ProviderDenied(String),
}

impl SsoError {
    /// Short machine-readable name of the error kind, used in log fields
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MalformedResponse(_) => "malformed_response",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Conflict { .. } => "conflict",
            Self::AccountCreation(_) => "account_creation",
            Self::GrantApplication { .. } => "grant_application",
            Self::Config(_) => "config",
            Self::OAuth(_) => "oauth",
            Self::InvalidState => "invalid_state",
            Self::ProviderDenied(_) => "provider_denied",
        }
    }

    /// Whether the caller may retry the whole operation
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Conflict { .. })
    }

    const fn status_code(&self) -> StatusCode {
        match self {
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<sqlx::Error> for SsoError {
    fn from(err: sqlx::Error) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

impl IntoResponse for SsoError {
    fn into_response(self) -> Response {
        tracing::error!(kind = self.kind(), error = %self, "SSO login failed");
        (self.status_code(), GENERIC_FAILURE_BODY).into_response()
    }
}
