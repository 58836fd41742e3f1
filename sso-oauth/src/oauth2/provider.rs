//! Configured OAuth2 provider
//!
//! Wraps the `oauth2` client for the configured authorization and token
//! endpoints, and fetches the profile endpoints with the resulting access
//! token. One `reqwest` client serves both the token exchange and the
//! profile fetches; it never follows redirects.

use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};

use crate::config::{ProfileEndpoint, SsoConfig};
use crate::error::{SsoError, SsoResult};
use crate::profile::RawResponses;
use crate::registration::StrategyDescriptor;

/// `BasicClient` with the authorization and token endpoints set
pub type ConfiguredClient = BasicClient<
    EndpointSet,    // HasAuthUrl
    EndpointNotSet, // HasDeviceAuthUrl
    EndpointNotSet, // HasIntrospectionUrl
    EndpointNotSet, // HasRevocationUrl
    EndpointSet,    // HasTokenUrl
>;

/// Authorization redirect issued to the browser
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// Provider URL the browser is redirected to
    pub url: String,
    /// CSRF state token embedded in `url`
    pub csrf_state: String,
    /// PKCE verifier to present on code exchange
    pub pkce_verifier: String,
}

/// OAuth2 provider built from [`SsoConfig`]
#[derive(Debug, Clone)]
pub struct SsoProvider {
    name: String,
    client: ConfiguredClient,
    http_client: reqwest::Client,
    scopes: Vec<String>,
    endpoints: Vec<ProfileEndpoint>,
    descriptor: StrategyDescriptor,
}

impl SsoProvider {
    /// Build the provider from configuration
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Config`] if any configured URL is invalid or the
    /// HTTP client cannot be built
    pub fn new(config: &SsoConfig) -> SsoResult<Self> {
        let provider = &config.provider;
        let callback_url = config.login.callback_url(&provider.name);

        let client = BasicClient::new(ClientId::new(provider.client_id.clone()))
            .set_client_secret(ClientSecret::new(provider.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(provider.authorization_url.clone())
                    .map_err(|e| SsoError::Config(format!("Invalid authorization URL: {e}")))?,
            )
            .set_token_uri(
                TokenUrl::new(provider.token_url.clone())
                    .map_err(|e| SsoError::Config(format!("Invalid token URL: {e}")))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(callback_url)
                    .map_err(|e| SsoError::Config(format!("Invalid callback URL: {e}")))?,
            );

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| SsoError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: provider.name.clone(),
            client,
            http_client,
            scopes: provider.scopes(),
            endpoints: provider.endpoints.clone(),
            descriptor: StrategyDescriptor::new(config),
        })
    }

    /// Provider name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Login strategy advertised to the host
    #[must_use]
    pub const fn descriptor(&self) -> &StrategyDescriptor {
        &self.descriptor
    }

    /// Generate the authorization URL with a fresh CSRF state and PKCE pair
    #[must_use]
    pub fn authorization_url(&self) -> AuthorizationRequest {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut builder = self.client.authorize_url(CsrfToken::new_random);
        for scope in &self.scopes {
            builder = builder.add_scope(Scope::new(scope.clone()));
        }
        let (url, csrf_state) = builder.set_pkce_challenge(pkce_challenge).url();

        AuthorizationRequest {
            url: url.to_string(),
            csrf_state: csrf_state.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        }
    }

    /// Exchange an authorization code for an access token
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::OAuth`] if the token endpoint rejects the code or
    /// cannot be reached
    pub async fn exchange_code(&self, code: &str, pkce_verifier: &str) -> SsoResult<String> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| SsoError::OAuth(format!("token exchange failed: {e}")))?;

        Ok(token.access_token().secret().clone())
    }

    /// Fetch every configured profile endpoint, in order
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::OAuth`] naming the first endpoint that fails or
    /// answers with a non-success status
    pub async fn fetch_profile(&self, access_token: &str) -> SsoResult<RawResponses> {
        let mut raw = RawResponses::new();

        for endpoint in &self.endpoints {
            let body = self.fetch_endpoint(endpoint, access_token).await?;
            tracing::debug!(
                provider = %self.name,
                endpoint = %endpoint.name,
                bytes = body.len(),
                "Fetched profile endpoint"
            );
            raw.insert(endpoint.name.clone(), body);
        }

        Ok(raw)
    }

    async fn fetch_endpoint(
        &self,
        endpoint: &ProfileEndpoint,
        access_token: &str,
    ) -> SsoResult<String> {
        let failed = |detail: String| {
            SsoError::OAuth(format!("failed to fetch user {}: {detail}", endpoint.name))
        };

        let response = self
            .http_client
            .get(&endpoint.url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("HTTP {status}")));
        }

        response.text().await.map_err(|e| failed(e.to_string()))
    }
}
