//! Login routes
//!
//! - `GET /auth/{name}`: store a pending authorization and redirect to the
//!   provider
//! - `GET /auth/{name}/callback`: validate the state, exchange the code,
//!   fetch and normalize the profile, link the account, then hand the user to
//!   the host's [`LoginHook`](super::LoginHook)

use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::get,
    Router,
};
use serde::Deserialize;

use super::SsoState;
use crate::error::{SsoError, SsoResult};

/// OAuth2 callback query parameters
#[derive(Debug, Deserialize)]
pub(crate) struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Routes for the configured provider
#[must_use]
pub fn router(state: SsoState) -> Router {
    let descriptor = state.descriptor().clone();
    Router::new()
        .route(&descriptor.url, get(initiate_login))
        .route(&descriptor.callback_url, get(handle_callback))
        .with_state(state)
}

async fn initiate_login(State(state): State<SsoState>) -> Redirect {
    let request = state.provider().authorization_url();
    state
        .pending()
        .insert(request.csrf_state, request.pkce_verifier);

    tracing::debug!(provider = %state.provider().name(), "Redirecting to provider");
    Redirect::to(&request.url)
}

async fn handle_callback(
    State(state): State<SsoState>,
    Query(params): Query<OAuthCallback>,
) -> SsoResult<Redirect> {
    if let Some(error) = params.error {
        let detail = params
            .error_description
            .map_or_else(|| error.clone(), |description| format!("{error}: {description}"));
        return Err(SsoError::ProviderDenied(detail));
    }

    let pkce_verifier = params
        .state
        .as_deref()
        .and_then(|token| state.pending().take(token))
        .ok_or(SsoError::InvalidState)?;

    let code = params
        .code
        .ok_or_else(|| SsoError::OAuth("callback is missing the authorization code".to_string()))?;

    let provider = state.provider();
    let access_token = provider.exchange_code(&code, &pkce_verifier).await?;
    let raw = provider.fetch_profile(&access_token).await?;
    let identity = state.inner.normalizer.normalize(&raw)?;

    let user_id = match state.linker().link(&identity).await {
        Ok(user_id) => user_id,
        Err(SsoError::GrantApplication {
            user_id,
            role,
            reason,
        }) => {
            tracing::warn!(
                user_id = user_id,
                role = %role,
                reason = %reason,
                "Login completed without all role grants"
            );
            user_id
        }
        Err(err) => return Err(err),
    };

    state.inner.hook.on_successful_login(user_id).await?;

    tracing::info!(
        provider = %provider.name(),
        external_id = %identity.external_id(),
        user_id = user_id,
        "SSO login succeeded"
    );
    Ok(Redirect::to(&state.inner.success_redirect))
}
