//! Token, session and wire types
//!
//! [`TokenSet`] and [`CapabilityToken`] are what the token endpoints hand
//! out; [`SessionRecord`] is their durable union and [`StoredSession`] its
//! on-disk JSON shape. The remaining types are per-attempt login state and
//! provider responses.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::error::AuthError;
use crate::config::BearerToken;
use crate::utils::iso8601_opt;

/// Lifetime assumed when a token response omits `expires_in`, in seconds.
pub const DEFAULT_EXPIRES_IN: i64 = 3600;

fn expiry_from(
    now: DateTime<Utc>,
    expires_in: Option<i64>,
) -> Result<DateTime<Utc>, AuthError> {
    Duration::try_seconds(expires_in.unwrap_or(DEFAULT_EXPIRES_IN))
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or(AuthError::ProtocolShape { element: "expires_in" })
}

/// A leeway that overflows the calendar counts as already expired.
fn expires_within(expiry: DateTime<Utc>, leeway: Duration) -> bool {
    Utc::now().checked_add_signed(leeway).map_or(true, |deadline| deadline >= expiry)
}

/// Identity-provider tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    /// OAuth access token
    pub access_token: String,

    /// Refresh token, if the provider issued one
    pub refresh_token: Option<String>,

    /// OpenID id token; exchanged for the capability token
    pub id_token: Option<String>,

    /// Absolute expiry of the access token
    pub expiry: DateTime<Utc>,
}

impl TokenSet {
    /// Build from a token endpoint response received at `now`
    ///
    /// A response without `refresh_token` keeps `previous_refresh`, since
    /// the provider does not always rotate refresh tokens.
    ///
    /// # Errors
    /// Returns [`AuthError::ProtocolShape`] if `expires_in` does not yield a
    /// representable expiry.
    pub fn from_response(
        response: TokenResponse,
        previous_refresh: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            expiry: expiry_from(now, response.expires_in)?,
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh),
            id_token: response.id_token,
        })
    }

    /// True if the access token expires within `leeway`
    #[must_use]
    pub fn is_expired(&self, leeway: Duration) -> bool {
        expires_within(self.expiry, leeway)
    }
}

/// Second-stage token accepted by the vehicle API gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityToken {
    /// Token value
    pub token: String,

    /// Absolute expiry
    pub expiry: DateTime<Utc>,
}

impl CapabilityToken {
    /// Build from a capability endpoint response received at `now`
    ///
    /// # Errors
    /// Returns [`AuthError::ProtocolShape`] if `expires_in` is out of range.
    pub fn from_response(
        response: CapabilityResponse,
        now: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        Ok(Self { expiry: expiry_from(now, response.expires_in)?, token: response.access_token })
    }

    /// True if the token expires within `leeway`
    #[must_use]
    pub fn is_expired(&self, leeway: Duration) -> bool {
        expires_within(self.expiry, leeway)
    }
}

/// The persisted session: identity tokens plus the capability token
///
/// A capability token can only exist alongside a [`TokenSet`]. Records
/// read back without one (older files, interrupted logins) still allow a
/// refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Identity-provider tokens
    pub tokens: TokenSet,

    /// Capability token derived from `tokens.id_token`
    pub capability: Option<CapabilityToken>,
}

impl SessionRecord {
    /// Record produced by a successful login or refresh
    #[must_use]
    pub const fn new(tokens: TokenSet, capability: CapabilityToken) -> Self {
        Self { tokens, capability: Some(capability) }
    }

    /// Capability token, if present and not expiring within `leeway`
    #[must_use]
    pub fn valid_capability(&self, leeway: Duration) -> Option<&CapabilityToken> {
        self.capability.as_ref().filter(|capability| !capability.is_expired(leeway))
    }

    /// Refresh token, if any
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.tokens.refresh_token.as_deref()
    }

    /// Token to send as `Authorization: Bearer`
    #[must_use]
    pub fn bearer(&self, kind: BearerToken) -> Option<&str> {
        match kind {
            BearerToken::Capability => self.capability.as_ref().map(|c| c.token.as_str()),
            BearerToken::Access => Some(self.tokens.access_token.as_str()),
        }
    }
}

/// On-disk JSON shape of a [`SessionRecord`]
///
/// Field names are shared with other clients reading the same file; absent
/// values are written as `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    /// OAuth access token
    #[serde(default)]
    pub access_token: Option<String>,
    /// Refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// OpenID id token
    #[serde(default)]
    pub id_token: Option<String>,
    /// Capability token
    #[serde(default)]
    pub mbb_token: Option<String>,
    /// Access token expiry
    #[serde(default, with = "iso8601_opt")]
    pub token_expiry: Option<DateTime<Utc>>,
    /// Capability token expiry
    #[serde(default, with = "iso8601_opt")]
    pub mbb_token_expiry: Option<DateTime<Utc>>,
}

impl From<&SessionRecord> for StoredSession {
    fn from(record: &SessionRecord) -> Self {
        Self {
            access_token: Some(record.tokens.access_token.clone()),
            refresh_token: record.tokens.refresh_token.clone(),
            id_token: record.tokens.id_token.clone(),
            mbb_token: record.capability.as_ref().map(|c| c.token.clone()),
            token_expiry: Some(record.tokens.expiry),
            mbb_token_expiry: record.capability.as_ref().map(|c| c.expiry),
        }
    }
}

impl StoredSession {
    /// Convert to a [`SessionRecord`]
    ///
    /// Returns `None` when there is no access token, which also covers a
    /// capability token stored without one. A token without an expiry is
    /// treated as already expired.
    #[must_use]
    pub fn into_record(self) -> Option<SessionRecord> {
        let access_token = self.access_token.filter(|token| !token.is_empty())?;

        let capability =
            self.mbb_token.filter(|token| !token.is_empty()).map(|token| CapabilityToken {
                token,
                expiry: self.mbb_token_expiry.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            });

        Some(SessionRecord {
            tokens: TokenSet {
                access_token,
                refresh_token: self.refresh_token.filter(|token| !token.is_empty()),
                id_token: self.id_token,
                expiry: self.token_expiry.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            },
            capability,
        })
    }
}

/// Token endpoint response (authorization code and refresh grants)
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Access token
    pub access_token: String,
    /// Refresh token; omitted when not rotated
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// OpenID id token
    #[serde(default)]
    pub id_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Capability endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityResponse {
    /// Capability token
    pub access_token: String,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// The parts of the OpenID discovery document the flow uses
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OpenIdConfiguration {
    /// Authorization endpoint (start of the login wizard)
    pub authorization_endpoint: String,
    /// Token endpoint
    pub token_endpoint: String,
}

/// First form on a provider page with its hidden inputs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    /// Raw `action` attribute
    pub action: String,
    /// Hidden inputs, echoed back verbatim
    pub hidden_fields: BTreeMap<String, String>,
}

/// Values scraped during one login attempt
///
/// Each attempt starts from `FlowState::default()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowState {
    /// Resolved email form action URL
    pub form_action: Option<String>,
    /// Hidden inputs of the email form
    pub hidden_fields: BTreeMap<String, String>,
    /// Relay state threading the sign-in steps
    pub relay_state: Option<String>,
    /// CSRF token of the password page
    pub csrf_token: Option<String>,
    /// HMAC of the password page
    pub hmac: Option<String>,
}

/// Where the tokens returned by [`login`](super::Session::login) came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// Unexpired capability token from the store, no network calls
    Cached,
    /// Refresh-token grant
    Refreshed,
    /// Full interactive login
    FullLogin,
}

impl_label_conversions!(TokenSource {
    Cached => "cached",
    Refreshed => "refreshed",
    FullLogin => "full_login",
});

/// Result of a successful [`login`](super::Session::login)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginOutcome {
    /// How the session was obtained
    pub source: TokenSource,
    /// Whether the record is durably stored; false when the store write failed
    pub persisted: bool,
}
