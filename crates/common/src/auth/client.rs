//! Token exchange client
//!
//! Talks to the two OAuth services involved after the login wizard:
//! - the identity provider's token endpoint (found via OpenID discovery)
//!   for the authorization-code and refresh-token grants
//! - the second-stage service that trades an id token for the capability
//!   token the vehicle API expects
//!
//! Every call is a single attempt; retries are the caller's decision.

use std::sync::Arc;

use chrono::Utc;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::error::AuthError;
use super::types::{
    CapabilityResponse, CapabilityToken, OpenIdConfiguration, TokenResponse, TokenSet,
};
use crate::config::AuthConfig;
use crate::observability::response_excerpt;

/// Client for discovery, token and capability endpoints
#[derive(Debug, Clone)]
pub struct TokenClient {
    config: Arc<AuthConfig>,
    http: Client,
    discovery: Arc<OnceCell<OpenIdConfiguration>>,
}

impl TokenClient {
    /// Create a client sharing an existing HTTP client
    #[must_use]
    pub fn new(config: Arc<AuthConfig>, http: Client) -> Self {
        Self { config, http, discovery: Arc::new(OnceCell::new()) }
    }

    /// Client configuration
    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Fetch the OpenID discovery document
    ///
    /// Fetched once per client; later calls return the cached document. A
    /// failed fetch is not cached.
    ///
    /// # Errors
    /// - [`AuthError::HttpStatus`] on a non-2xx response
    /// - [`AuthError::ProtocolShape`] if a required endpoint is missing
    pub async fn discover(&self) -> Result<&OpenIdConfiguration, AuthError> {
        self.discovery.get_or_try_init(|| self.fetch_discovery()).await
    }

    async fn fetch_discovery(&self) -> Result<OpenIdConfiguration, AuthError> {
        let url = &self.config.openid_config_url;
        debug!(url = %url, "Fetching OpenID configuration");

        let response = self
            .http
            .get(url)
            .header(USER_AGENT, &self.config.user_agent)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::HttpStatus {
                step: "openid discovery".to_string(),
                status: status.as_u16(),
                excerpt: response_excerpt(response).await,
            });
        }
        let body = response.text().await?;

        serde_json::from_str(&body)
            .map_err(|_| AuthError::ProtocolShape { element: "openid configuration endpoints" })
    }

    /// Exchange an authorization code for identity tokens
    ///
    /// # Errors
    /// [`AuthError::TokenExchange`] if the endpoint rejects the code.
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenSet, AuthError> {
        let token_endpoint = self.discover().await?.token_endpoint.clone();
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", verifier),
        ];

        let response = self.post_form(&token_endpoint, &form, false).await?;
        let parsed: TokenResponse = Self::parse_success(&token_endpoint, response).await?;

        info!("Authorization code exchanged");
        TokenSet::from_response(parsed, None, Utc::now())
    }

    /// Exchange an id token for the capability token
    ///
    /// # Errors
    /// - [`AuthError::TokenExchange`] if the endpoint rejects the id token
    /// - [`AuthError::ProtocolShape`] if `expires_in` is out of range
    pub async fn exchange_id_token(&self, id_token: &str) -> Result<CapabilityToken, AuthError> {
        let endpoint = self.config.capability_token_url();
        let form = [
            ("grant_type", "id_token"),
            ("token", id_token),
            ("scope", self.config.capability_scope.as_str()),
        ];

        let response = self.post_form(&endpoint, &form, true).await?;
        let parsed: CapabilityResponse = Self::parse_success(&endpoint, response).await?;

        info!("Capability token obtained");
        CapabilityToken::from_response(parsed, Utc::now())
    }

    /// Refresh identity tokens and re-derive the capability token
    ///
    /// A response without a new refresh token keeps `refresh_token`.
    ///
    /// # Errors
    /// - [`AuthError::TokenExchange`] if either endpoint rejects the request
    /// - [`AuthError::ProtocolShape`] if the refresh response has no id token
    pub async fn refresh(
        &self,
        refresh_token: &str,
    ) -> Result<(TokenSet, CapabilityToken), AuthError> {
        let token_endpoint = self.discover().await?.token_endpoint.clone();
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];

        let response = self.post_form(&token_endpoint, &form, false).await?;
        let parsed: TokenResponse = Self::parse_success(&token_endpoint, response).await?;
        let tokens = TokenSet::from_response(parsed, Some(refresh_token.to_string()), Utc::now())?;

        let id_token =
            tokens.id_token.as_deref().ok_or(AuthError::ProtocolShape { element: "id_token" })?;
        let capability = self.exchange_id_token(id_token).await?;

        info!("Tokens refreshed");
        Ok((tokens, capability))
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        with_client_header: bool,
    ) -> Result<Response, AuthError> {
        let mut request = self
            .http
            .post(url)
            .header(USER_AGENT, &self.config.user_agent)
            .header(ACCEPT, "application/json")
            .form(form);
        if with_client_header {
            request = request.header("X-Client-ID", &self.config.x_client_id);
        }
        Ok(request.send().await?)
    }

    async fn parse_success<T: DeserializeOwned>(
        endpoint: &str,
        response: Response,
    ) -> Result<T, AuthError> {
        let status = response.status();
        if status != StatusCode::OK {
            return Err(AuthError::TokenExchange {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                excerpt: response_excerpt(response).await,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|_| AuthError::ProtocolShape { element: "token response" })
    }
}
