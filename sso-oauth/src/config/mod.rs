//! Configuration management for the SSO provider
//!
//! Configuration is an explicit [`SsoConfig`] value handed to the components
//! at construction time. It is loaded from multiple sources with clear
//! precedence:
//!
//! 1. Environment variables (highest priority, `SSO_` prefix, `__` for nesting)
//! 2. The TOML file passed to [`SsoConfig::load_from`] (or `./sso.toml`)
//! 3. Hardcoded defaults (fallback)
//!
//! # Example Configuration
//!
//! ```toml
//! [provider]
//! name = "bnet"
//! client_id = "my-client-id"
//! scope = "wow.profile"
//!
//! [profile.membership]
//! target = "Knights:Argent Dawn"
//!
//! [login]
//! base_url = "https://forum.example.com"
//! ```
//!
//! Secrets are best supplied through the environment:
//! `SSO_PROVIDER__CLIENT_SECRET=...`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{SsoError, SsoResult};

/// Profile endpoint fetched after the token exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileEndpoint {
    /// Name under which the response is handed to the normalizer
    pub name: String,
    /// Absolute URL of the endpoint
    pub url: String,
}

impl ProfileEndpoint {
    fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

/// OAuth2 provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Unique lowercase provider name, used in routes and as the index namespace
    pub name: String,
    /// Authorization endpoint
    pub authorization_url: String,
    /// Token endpoint
    pub token_url: String,
    /// OAuth2 client ID
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: String,
    /// Comma-separated scopes
    pub scope: String,
    /// Profile endpoints, fetched in this order
    pub endpoints: Vec<ProfileEndpoint>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: "bnet".to_string(),
            authorization_url: "https://us.battle.net/oauth/authorize".to_string(),
            token_url: "https://us.battle.net/oauth/token".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            scope: "wow.profile".to_string(),
            endpoints: vec![
                ProfileEndpoint::new("id", "https://us.api.battle.net/account/user/id"),
                ProfileEndpoint::new(
                    "battletag",
                    "https://us.api.battle.net/account/user/battletag",
                ),
                ProfileEndpoint::new(
                    "characters",
                    "https://us.api.battle.net/wow/user/characters",
                ),
            ],
        }
    }
}

impl ProviderSettings {
    /// Scopes split out of the comma-separated `scope` string
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect()
    }
}

/// Location of a single JSON field in one of the endpoint responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    /// Endpoint name
    pub endpoint: String,
    /// Top-level JSON field
    pub field: String,
}

impl FieldRef {
    /// Build a field reference
    pub fn new(endpoint: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            field: field.into(),
        }
    }
}

/// Supplementary membership list scanned for the member grant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MembershipSettings {
    /// Endpoint holding the list
    pub endpoint: String,
    /// Top-level field containing the list
    pub list_field: String,
    /// Fields of each entry joined to form the membership key
    pub key_fields: Vec<String>,
    /// Separator placed between key fields
    pub separator: String,
    /// Key that qualifies for the member grant; `None` disables the grant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl Default for MembershipSettings {
    fn default() -> Self {
        Self {
            endpoint: "characters".to_string(),
            list_field: "characters".to_string(),
            key_fields: vec!["guild".to_string(), "guildRealm".to_string()],
            separator: ":".to_string(),
            target: None,
        }
    }
}

/// Field mapping used by the profile normalizer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSettings {
    /// External ids that receive the administrator grant
    pub admin_external_ids: Vec<String>,
    /// Stable external id
    pub external_id: FieldRef,
    /// Display name, used as the username on creation
    pub display_name: FieldRef,
    /// Optional email field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<FieldRef>,
    /// Membership scan for the member grant
    pub membership: MembershipSettings,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            admin_external_ids: Vec::new(),
            external_id: FieldRef::new("id", "id"),
            display_name: FieldRef::new("battletag", "battletag"),
            email: None,
            membership: MembershipSettings::default(),
        }
    }
}

/// Role names applied by grants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrantSettings {
    /// Role for configured administrators
    pub admin_role: String,
    /// Role for members matching the membership target
    pub member_role: String,
}

impl Default for GrantSettings {
    fn default() -> Self {
        Self {
            admin_role: "administrators".to_string(),
            member_role: "members".to_string(),
        }
    }
}

/// Host integration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginSettings {
    /// Public base URL of the host application
    pub base_url: String,
    /// Where to send the browser after a successful login
    pub success_redirect: String,
    /// Icon shown on the login button
    pub icon: String,
    /// Lifetime of a pending authorization in seconds
    pub state_ttl_secs: u64,
    /// Most authorizations awaiting their callback at once; the oldest is
    /// evicted beyond this
    pub max_pending: usize,
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4567".to_string(),
            success_redirect: "/".to_string(),
            icon: "fa-lock".to_string(),
            state_ttl_secs: 600, // 10 minutes
            max_pending: 10_000,
        }
    }
}

impl LoginSettings {
    /// Absolute callback URL registered with the provider
    #[must_use]
    pub fn callback_url(&self, provider_name: &str) -> String {
        format!(
            "{}/auth/{provider_name}/callback",
            self.base_url.trim_end_matches('/')
        )
    }
}

/// Complete SSO configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SsoConfig {
    /// OAuth2 provider settings
    #[serde(default)]
    pub provider: ProviderSettings,

    /// Profile field mapping
    #[serde(default)]
    pub profile: ProfileSettings,

    /// Role names
    #[serde(default)]
    pub grants: GrantSettings,

    /// Host integration
    #[serde(default)]
    pub login: LoginSettings,
}

impl SsoConfig {
    /// Load configuration from `./sso.toml` (if present) and the environment
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the merged
    /// configuration fails validation
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from("sso.toml")
    }

    /// Load configuration from a specific file
    ///
    /// A missing file is not an error; defaults and environment variables
    /// still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if the file contains invalid TOML, values fail type
    /// conversion, or the merged configuration fails validation
    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SSO_").split("__").lowercase(true))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the provider cannot work with
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Config`] describing the first problem found
    pub fn validate(&self) -> SsoResult<()> {
        let name = &self.provider.name;
        if name.is_empty() {
            return Err(SsoError::Config(
                "provider name must not be empty".to_string(),
            ));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(SsoError::Config(format!(
                "provider name {name:?} must be lowercase alphanumeric"
            )));
        }
        if self.provider.client_id.is_empty() {
            return Err(SsoError::Config("client_id must not be empty".to_string()));
        }
        if self.login.max_pending == 0 {
            return Err(SsoError::Config(
                "max_pending must be at least 1".to_string(),
            ));
        }
        if self.provider.endpoints.is_empty() {
            return Err(SsoError::Config(
                "at least one profile endpoint is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for endpoint in &self.provider.endpoints {
            if !seen.insert(endpoint.name.as_str()) {
                return Err(SsoError::Config(format!(
                    "duplicate profile endpoint {:?}",
                    endpoint.name
                )));
            }
        }
        if !seen.contains(self.profile.external_id.endpoint.as_str()) {
            return Err(SsoError::Config(format!(
                "external id endpoint {:?} is not configured",
                self.profile.external_id.endpoint
            )));
        }

        Ok(())
    }
}
