//! Login flow driver
//!
//! Drives the provider's HTML sign-in wizard up to the authorization code:
//!
//! ```text
//! FetchAuthPage ─► ParseEmailForm ─► SubmitEmail ─► ExtractRelayState
//!       ─► FetchAuthenticatePage ─► ExtractCsrfHmac ─► SubmitPassword
//!       ─► FollowRedirectChain ─► HaveAuthorizationCode
//! ```
//!
//! Steps run strictly in order and each one feeds the next through a
//! per-attempt [`FlowState`]. The HTTP client never follows redirects on its
//! own; every hop is inspected here and bounded by
//! [`AuthConfig::max_redirect_hops`].

use std::sync::Arc;

use reqwest::header::{ACCEPT, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, Response};
use tracing::{debug, info, warn};
use url::Url;

use super::error::AuthError;
use super::html::{
    authorization_code, extract_csrf_and_hmac, extract_csrf_token, extract_js_redirect,
    extract_login_form, query_param, redirect_param,
};
use super::pkce::PkcePair;
use super::types::FlowState;
use crate::config::AuthConfig;
use crate::observability::response_excerpt;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Path fragment identifying the marketing consent interstitial.
const CONSENT_PATH: &str = "consent/marketing";

/// Build the HTTP client shared by the flow, token exchange and API calls
///
/// Keeps cookies across steps and never follows redirects automatically.
///
/// # Errors
/// [`AuthError::Config`] if the TLS backend cannot be initialised.
pub fn http_client(config: &AuthConfig) -> Result<Client, AuthError> {
    Client::builder()
        .cookie_store(true)
        .redirect(Policy::none())
        .timeout(config.request_timeout())
        .user_agent(config.user_agent.as_str())
        .build()
        .map_err(|e| AuthError::Config(format!("failed to build HTTP client: {e}")))
}

/// Steps of the login wizard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStep {
    /// GET the authorization endpoint, following redirects to the email page
    FetchAuthPage,
    /// Scrape the email form action and hidden inputs
    ParseEmailForm,
    /// POST the email form
    SubmitEmail,
    /// Read `relayState` from the email step redirect
    ExtractRelayState,
    /// GET the password page
    FetchAuthenticatePage,
    /// Scrape CSRF token and HMAC from the password page
    ExtractCsrfHmac,
    /// POST the password
    SubmitPassword,
    /// Follow redirects, consent and script hops until a code appears
    FollowRedirectChain,
    /// Terminal step
    HaveAuthorizationCode,
}

impl_label_conversions!(FlowStep {
    FetchAuthPage => "fetch auth page",
    ParseEmailForm => "parse email form",
    SubmitEmail => "submit email",
    ExtractRelayState => "extract relay state",
    FetchAuthenticatePage => "fetch authenticate page",
    ExtractCsrfHmac => "extract csrf and hmac",
    SubmitPassword => "submit password",
    FollowRedirectChain => "follow redirect chain",
    HaveAuthorizationCode => "have authorization code",
});

/// A fetched HTML page and the URL it was served from
#[derive(Debug)]
struct Page {
    url: Url,
    body: String,
}

fn location_header(response: &Response) -> Option<&str> {
    response.headers().get(LOCATION).and_then(|value| value.to_str().ok())
}

fn required<T>(value: Option<T>, element: &'static str) -> Result<T, AuthError> {
    value.ok_or(AuthError::ProtocolShape { element })
}

async fn status_error(step: FlowStep, response: Response) -> AuthError {
    let status = response.status().as_u16();
    let excerpt = response_excerpt(response).await;
    AuthError::HttpStatus { step: step.to_string(), status, excerpt }
}

/// Executes one login attempt at a time against the sign-in service
#[derive(Debug, Clone)]
pub struct LoginFlow {
    config: Arc<AuthConfig>,
    http: Client,
}

impl LoginFlow {
    /// Create a driver on a client built by [`http_client`]
    #[must_use]
    pub const fn new(config: Arc<AuthConfig>, http: Client) -> Self {
        Self { config, http }
    }

    /// Authorization request URL for this attempt
    ///
    /// # Errors
    /// [`AuthError::InvalidUrl`] if the discovered endpoint is not a URL.
    pub fn authorization_url(
        &self,
        authorization_endpoint: &str,
        pkce: &PkcePair,
    ) -> Result<Url, AuthError> {
        let config = &self.config;
        Ok(Url::parse_with_params(
            authorization_endpoint,
            [
                ("client_id", config.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", config.redirect_uri.as_str()),
                ("scope", config.scope.as_str()),
                ("state", pkce.state.as_str()),
                ("nonce", pkce.nonce.as_str()),
                ("code_challenge", pkce.challenge.as_str()),
                ("code_challenge_method", pkce.challenge_method()),
                ("ui_locales", config.ui_locales.as_str()),
            ],
        )?)
    }

    /// Run the wizard and return the authorization code
    ///
    /// Every call starts from an empty [`FlowState`].
    ///
    /// # Errors
    /// Any step can fail; see [`AuthError`] for the taxonomy.
    pub async fn run(
        &self,
        authorization_endpoint: &str,
        username: &str,
        password: &str,
        pkce: &PkcePair,
    ) -> Result<String, AuthError> {
        let mut state = FlowState::default();
        let mut page: Option<Page> = None;
        let mut location: Option<Url> = None;
        let mut step = FlowStep::FetchAuthPage;

        loop {
            debug!(step = %step, "Login flow step");
            step = match step {
                FlowStep::FetchAuthPage => {
                    let start = self.authorization_url(authorization_endpoint, pkce)?;
                    page = Some(self.get_page(step, start).await?);
                    FlowStep::ParseEmailForm
                }
                FlowStep::ParseEmailForm => {
                    let email_page = required(page.take(), "login page")?;
                    let form = extract_login_form(&email_page.body)?;
                    debug!(fields = ?form.hidden_fields.keys().collect::<Vec<_>>(), "Email form");
                    state.form_action = Some(email_page.url.join(&form.action)?.to_string());
                    state.hidden_fields = form.hidden_fields;
                    FlowStep::SubmitEmail
                }
                FlowStep::SubmitEmail => {
                    location = Some(self.submit_email(&state, username).await?);
                    FlowStep::ExtractRelayState
                }
                FlowStep::ExtractRelayState => {
                    let redirect = required(location.as_ref(), "email step redirect")?;
                    state.relay_state =
                        Some(required(query_param(redirect, "relayState"), "relay state")?);
                    FlowStep::FetchAuthenticatePage
                }
                FlowStep::FetchAuthenticatePage => {
                    let relay_state = required(state.relay_state.as_deref(), "relay state")?;
                    let url = Url::parse_with_params(
                        &self.config.authenticate_url(),
                        [("relayState", relay_state), ("email", username)],
                    )?;
                    page = Some(self.get_page(step, url).await?);
                    FlowStep::ExtractCsrfHmac
                }
                FlowStep::ExtractCsrfHmac => {
                    let password_page = required(page.take(), "authenticate page")?;
                    let (csrf, hmac) = extract_csrf_and_hmac(&password_page.body)?;
                    state.csrf_token = Some(csrf);
                    state.hmac = Some(hmac);
                    FlowStep::SubmitPassword
                }
                FlowStep::SubmitPassword => {
                    location = Some(self.submit_password(&state, username, password).await?);
                    FlowStep::FollowRedirectChain
                }
                FlowStep::FollowRedirectChain => {
                    let start = required(location.take(), "password step redirect")?;
                    location = Some(self.follow_redirect_chain(start).await?);
                    FlowStep::HaveAuthorizationCode
                }
                FlowStep::HaveAuthorizationCode => {
                    let final_url = required(location.take(), "authorization code")?;
                    return Self::code_from(&final_url, pkce);
                }
            };
        }
    }

    fn code_from(final_url: &Url, pkce: &PkcePair) -> Result<String, AuthError> {
        let code = required(authorization_code(final_url), "authorization code")?;

        if let Some(returned) = redirect_param(final_url, "state") {
            if returned != pkce.state {
                warn!("Authorization redirect state does not match the request");
                return Err(AuthError::StateMismatch);
            }
        }

        info!("Authorization code received");
        Ok(code)
    }

    /// GET a page, following `3xx` hops, and require a final `2xx`
    ///
    /// At most `max_redirect_hops` requests are made.
    async fn get_page(&self, step: FlowStep, url: Url) -> Result<Page, AuthError> {
        let mut current = url;

        for _ in 0..self.config.max_redirect_hops {
            let response =
                self.http.get(current.clone()).header(ACCEPT, ACCEPT_HTML).send().await?;
            let status = response.status();

            if status.is_redirection() {
                let next = required(location_header(&response), "redirect location")?;
                current = current.join(next)?;
                continue;
            }
            if !status.is_success() {
                return Err(status_error(step, response).await);
            }

            let body = response.text().await?;
            return Ok(Page { url: current, body });
        }

        Err(AuthError::RedirectLoop { hops: self.config.max_redirect_hops })
    }

    async fn submit_email(&self, state: &FlowState, username: &str) -> Result<Url, AuthError> {
        let action = Url::parse(required(state.form_action.as_deref(), "form action")?)?;

        let mut form: Vec<(&str, &str)> = state
            .hidden_fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        form.push(("email", username));

        let response =
            self.http.post(action.clone()).header(ACCEPT, ACCEPT_HTML).form(&form).send().await?;

        if !matches!(response.status().as_u16(), 302 | 303) {
            return Err(status_error(FlowStep::SubmitEmail, response).await);
        }
        let next = required(location_header(&response), "email step redirect")?;
        Ok(action.join(next)?)
    }

    async fn submit_password(
        &self,
        state: &FlowState,
        username: &str,
        password: &str,
    ) -> Result<Url, AuthError> {
        let url = Url::parse(&self.config.authenticate_url())?;
        let form = [
            ("relayState", required(state.relay_state.as_deref(), "relay state")?),
            ("email", username),
            ("password", password),
            ("_csrf", required(state.csrf_token.as_deref(), "csrf token")?),
            ("hmac", required(state.hmac.as_deref(), "hmac")?),
        ];

        let response =
            self.http.post(url.clone()).header(ACCEPT, ACCEPT_HTML).form(&form).send().await?;
        let status = response.status();

        if let Some(next) = location_header(&response) {
            return Ok(url.join(next)?);
        }
        if !status.is_success() {
            return Err(status_error(FlowStep::SubmitPassword, response).await);
        }

        // Some provider versions answer with a scripted redirect instead.
        let body = response.text().await?;
        let target = extract_js_redirect(&body)
            .map_err(|_| AuthError::NoFurtherRedirect { location: url.to_string() })?;
        Ok(url.join(&target)?)
    }

    fn is_terminal(&self, location: &Url) -> bool {
        authorization_code(location).is_some()
            || location.as_str().starts_with(&self.config.app_scheme)
    }

    /// Follow the post-password redirect chain to the code-bearing location
    ///
    /// Stops at the first location carrying a `code` (query or fragment) or
    /// using the app scheme. Each hop is a GET without automatic redirects:
    /// - `3xx` continues at `Location`, resolved against the current URL
    /// - `200` on the marketing consent page submits one decline
    /// - any other `2xx` continues at the page's script redirect
    ///
    /// # Errors
    /// - [`AuthError::RedirectLoop`] after `max_redirect_hops` hops
    /// - [`AuthError::NoFurtherRedirect`] if a page leads nowhere
    /// - [`AuthError::HttpStatus`] on any other status
    pub async fn follow_redirect_chain(&self, start: Url) -> Result<Url, AuthError> {
        let max_hops = self.config.max_redirect_hops;
        let mut location = start;
        let mut hops = 0;

        loop {
            if self.is_terminal(&location) {
                debug!(hops, "Redirect chain complete");
                return Ok(location);
            }
            if hops >= max_hops {
                warn!(hops, "Redirect chain did not terminate");
                return Err(AuthError::RedirectLoop { hops });
            }
            hops += 1;
            location = self.next_hop(location).await?;
        }
    }

    async fn next_hop(&self, current: Url) -> Result<Url, AuthError> {
        debug!(host = current.host_str().unwrap_or_default(), path = current.path(), "Following");

        let response = self.http.get(current.clone()).header(ACCEPT, ACCEPT_HTML).send().await?;
        let status = response.status();

        if status.is_redirection() {
            let next = location_header(&response)
                .ok_or_else(|| AuthError::NoFurtherRedirect { location: current.to_string() })?;
            return Ok(current.join(next)?);
        }
        if !status.is_success() {
            return Err(status_error(FlowStep::FollowRedirectChain, response).await);
        }

        let body = response.text().await?;
        if status.as_u16() == 200 && current.path().contains(CONSENT_PATH) {
            return self.decline_marketing_consent(&current, &body).await;
        }

        let target = extract_js_redirect(&body)
            .map_err(|_| AuthError::NoFurtherRedirect { location: current.to_string() })?;
        Ok(current.join(&target)?)
    }

    /// Submit the marketing consent form with permission declined
    async fn decline_marketing_consent(&self, page: &Url, body: &str) -> Result<Url, AuthError> {
        info!("Declining marketing consent");

        let csrf = extract_csrf_token(body)?;
        let relay_state = query_param(page, "relayState").unwrap_or_default();
        let hmac = query_param(page, "hmac").unwrap_or_default();

        let mut post_url = page.clone();
        post_url.set_query(None);
        post_url.set_fragment(None);

        let form = [
            ("_csrf", csrf.as_str()),
            ("relayState", relay_state.as_str()),
            ("hmac", hmac.as_str()),
            ("marketingPermission", "NO"),
        ];
        let response =
            self.http.post(post_url.clone()).header(ACCEPT, ACCEPT_HTML).form(&form).send().await?;

        if let Some(next) = location_header(&response) {
            return Ok(post_url.join(next)?);
        }
        if !(response.status().is_success() || response.status().is_redirection()) {
            return Err(status_error(FlowStep::FollowRedirectChain, response).await);
        }
        Err(AuthError::ProtocolShape { element: "consent redirect" })
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::flow.
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn flow_for(base: &str) -> LoginFlow {
        flow_with(AuthConfig::with_base_url(base))
    }

    fn flow_with(config: AuthConfig) -> LoginFlow {
        let config = Arc::new(config);
        let http = http_client(&config).unwrap();
        LoginFlow::new(config, http)
    }

    /// Validates the authorization request parameters.
    ///
    /// Assertions:
    /// - Carries client id, PKCE challenge, S256, state, nonce and locale.
    /// - Keeps any query already present on the endpoint.
    #[test]
    fn test_authorization_url() {
        let flow = flow_for("https://idp.example");
        let pkce = PkcePair::generate();

        let url = flow
            .authorization_url("https://idp.example/oidc/v1/authorize?prompt=login", &pkce)
            .unwrap();

        assert_eq!(query_param(&url, "prompt").as_deref(), Some("login"));
        assert_eq!(query_param(&url, "response_type").as_deref(), Some("code"));
        assert_eq!(query_param(&url, "redirect_uri").as_deref(), Some("myaudi:///"));
        assert_eq!(query_param(&url, "code_challenge"), Some(pkce.challenge.clone()));
        assert_eq!(query_param(&url, "code_challenge_method").as_deref(), Some("S256"));
        assert_eq!(query_param(&url, "state"), Some(pkce.state.clone()));
        assert_eq!(query_param(&url, "nonce"), Some(pkce.nonce.clone()));
        assert_eq!(query_param(&url, "ui_locales").as_deref(), Some("en-GB"));
    }

    #[test]
    fn test_code_from_rejects_state_mismatch() {
        let pkce = PkcePair::generate();
        let wrong = Url::parse("myaudi:///?code=abc&state=forged").unwrap();
        assert!(matches!(LoginFlow::code_from(&wrong, &pkce), Err(AuthError::StateMismatch)));

        let right = Url::parse(&format!("myaudi:///?code=abc&state={}", pkce.state)).unwrap();
        assert_eq!(LoginFlow::code_from(&right, &pkce).unwrap(), "abc");

        let stateless = Url::parse("myaudi:///#code=xyz").unwrap();
        assert_eq!(LoginFlow::code_from(&stateless, &pkce).unwrap(), "xyz");
    }

    #[test]
    fn test_app_scheme_without_code_is_shape_error() {
        let pkce = PkcePair::generate();
        let url = Url::parse("myaudi:///?error=access_denied").unwrap();
        assert!(matches!(
            LoginFlow::code_from(&url, &pkce),
            Err(AuthError::ProtocolShape { element: "authorization code" })
        ));
    }

    /// Validates relative `Location` resolution and script redirects.
    #[tokio::test]
    async fn test_chain_resolves_relative_and_script_hops() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/b"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<script>window.location = 'myaudi:///?code=from-script';</script>",
            ))
            .mount(&server)
            .await;

        let flow = flow_for(&server.uri());
        let start = Url::parse(&format!("{}/a", server.uri())).unwrap();
        let end = flow.follow_redirect_chain(start).await.unwrap();

        assert_eq!(authorization_code(&end).as_deref(), Some("from-script"));
    }

    #[tokio::test]
    async fn test_chain_dead_end_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stuck"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>Please wait</p>"))
            .mount(&server)
            .await;

        let flow = flow_for(&server.uri());
        let start = Url::parse(&format!("{}/stuck", server.uri())).unwrap();
        let err = flow.follow_redirect_chain(start).await.unwrap_err();

        assert!(matches!(
            err,
            AuthError::NoFurtherRedirect { ref location } if location.ends_with("/stuck")
        ));
    }

    #[tokio::test]
    async fn test_chain_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let flow = flow_for(&server.uri());
        let start = Url::parse(&format!("{}/broken", server.uri())).unwrap();
        let err = flow.follow_redirect_chain(start).await.unwrap_err();

        match err {
            AuthError::HttpStatus { step, status, excerpt } => {
                assert_eq!(step, "follow redirect chain");
                assert_eq!(status, 500);
                assert_eq!(excerpt, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// Validates that page fetches and the redirect chain share one hop bound.
    ///
    /// Assertions:
    /// - A self-redirecting page is requested exactly `max_redirect_hops` times.
    /// - The redirect chain makes the same number of requests.
    #[tokio::test]
    async fn test_redirect_bound_is_request_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
            .expect(6)
            .mount(&server)
            .await;

        let flow = flow_with(AuthConfig {
            max_redirect_hops: 3,
            ..AuthConfig::with_base_url(&server.uri())
        });
        let start = Url::parse(&format!("{}/loop", server.uri())).unwrap();

        let err = flow.get_page(FlowStep::FetchAuthPage, start.clone()).await.unwrap_err();
        assert!(matches!(err, AuthError::RedirectLoop { hops: 3 }));

        let err = flow.follow_redirect_chain(start).await.unwrap_err();
        assert!(matches!(err, AuthError::RedirectLoop { hops: 3 }));
    }
}
