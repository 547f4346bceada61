//! Configuration for the identity-provider client
//!
//! [`AuthConfig`] carries every endpoint and client constant the login flow
//! needs. Its defaults are the production values of the myAudi Android app,
//! so most callers only override the base URLs (tests point them at a mock
//! server). [`AppConfig`] is what the binary loads: credentials, an optional
//! token file location and an optional `auth` override table.
//!
//! Loading lives in [`loader`].

pub mod loader;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use loader::{load, load_from_env, load_from_file, probe_config_paths, ConfigError};

/// Which token is sent as `Authorization: Bearer` on API requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BearerToken {
    /// The second-stage capability token (`mbb_token`)
    #[default]
    Capability,
    /// The OAuth access token from the identity provider
    Access,
}

impl_label_conversions!(BearerToken {
    Capability => "capability",
    Access => "access",
});

/// Endpoints, client identifiers and flow limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OpenID discovery document URL
    pub openid_config_url: String,

    /// Base of the sign-in service hosting the email/password pages
    pub identity_base_url: String,

    /// Base of the second-stage (capability token) OAuth service
    pub capability_base_url: String,

    /// Base of the vehicle API
    pub api_base_url: String,

    /// OAuth client id registered for the app
    pub client_id: String,

    /// Value of the `X-Client-ID` header on capability and API requests
    pub x_client_id: String,

    /// User agent sent on every request
    pub user_agent: String,

    /// Redirect URI registered for the app
    pub redirect_uri: String,

    /// Scheme prefix marking the end of the redirect chain
    pub app_scheme: String,

    /// Space-separated scopes requested on the authorization endpoint
    pub scope: String,

    /// Scope requested for the capability token
    pub capability_scope: String,

    /// `ui_locales` sent on the authorization request
    pub ui_locales: String,

    /// Upper bound on redirects followed within a single step
    pub max_redirect_hops: usize,

    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,

    /// Tokens expiring within this many seconds count as expired
    pub expiry_leeway_secs: i64,

    /// Token presented to the vehicle API
    pub bearer: BearerToken,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            openid_config_url: "https://emea.bff.cariad.digital/login/v1/idk/openid-configuration"
                .to_string(),
            identity_base_url: "https://identity.vwgroup.io".to_string(),
            capability_base_url: "https://mbboauth-1d.prd.ece.vwg-connect.com/mbbcoauth"
                .to_string(),
            api_base_url: "https://emea.bff.cariad.digital".to_string(),
            client_id: "09b6cbec-cd19-4589-82fd-363dfa8c24da@apps_vw-dilab_com".to_string(),
            x_client_id: "77869e21-e30a-4a92-b016-48ab7d3db1d8".to_string(),
            user_agent: "myAudi-Android/4.13.0 (Build 800238275.2210271555) Android/11"
                .to_string(),
            redirect_uri: "myaudi:///".to_string(),
            app_scheme: "myaudi:".to_string(),
            scope: "address profile badge birthdate birthplace nationalIdentifier nationality \
                    profession email vin phone nickname name picture mbb gallery openid"
                .to_string(),
            capability_scope: "sc2:fal".to_string(),
            ui_locales: "en-GB".to_string(),
            max_redirect_hops: 20,
            request_timeout_secs: 30,
            expiry_leeway_secs: 60,
            bearer: BearerToken::Capability,
        }
    }
}

impl AuthConfig {
    /// Point every endpoint at a single base URL
    ///
    /// Used against mock servers, where discovery, sign-in, capability and
    /// API routes are all served from one origin.
    #[must_use]
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            openid_config_url: format!("{base}/login/v1/idk/openid-configuration"),
            identity_base_url: base.to_string(),
            capability_base_url: format!("{base}/mbbcoauth"),
            api_base_url: base.to_string(),
            ..Self::default()
        }
    }

    /// HTTP client timeout
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Leeway applied to every expiry comparison
    ///
    /// Values beyond the representable range saturate.
    #[must_use]
    pub fn expiry_leeway(&self) -> chrono::Duration {
        match chrono::Duration::try_seconds(self.expiry_leeway_secs) {
            Some(leeway) => leeway,
            None if self.expiry_leeway_secs < 0 => chrono::Duration::MIN,
            None => chrono::Duration::MAX,
        }
    }

    /// Capability token endpoint
    #[must_use]
    pub fn capability_token_url(&self) -> String {
        format!("{}/mobile/oauth2/v1/token", self.capability_base_url.trim_end_matches('/'))
    }

    /// Sign-in service path for the password step
    #[must_use]
    pub fn authenticate_url(&self) -> String {
        format!(
            "{}/signin-service/v1/{}/login/authenticate",
            self.identity_base_url.trim_end_matches('/'),
            self.client_id
        )
    }

    /// Vehicle list endpoint
    #[must_use]
    pub fn vehicles_url(&self) -> String {
        format!("{}/vehicle/v1/vehicles", self.api_base_url.trim_end_matches('/'))
    }
}

/// Top-level settings for the `audilink` binary
///
/// Unknown keys are ignored so the display-integration config file (which
/// also carries device settings) can be reused as-is.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Account email
    pub username: String,

    /// Account password
    pub password: String,

    /// Session file override (defaults to `~/.audi_tokens.json`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,

    /// Endpoint and flow overrides
    #[serde(default)]
    pub auth: AuthConfig,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("token_file", &self.token_file)
            .field("auth", &self.auth)
            .finish()
    }
}
