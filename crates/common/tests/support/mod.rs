//! Shared test helpers for `audilink-common` integration tests.
//!
//! [`MockProvider`] stands in for the identity provider, the capability token
//! service and the vehicle API on a single wiremock server, so tests can
//! mount only the endpoints their scenario touches.

#![allow(dead_code)]

use audilink_common::auth::{Credentials, Session};
use audilink_common::config::AuthConfig;
use audilink_common::testing::{consent_page, email_page, password_page};
use audilink_common::TokenStore;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const USERNAME: &str = "driver@example.com";
pub const PASSWORD: &str = "correct horse";
pub const AUTH_CODE: &str = "abc123";

pub const IDENTIFIER_PATH: &str = "/signin-service/v1/test-client/login/identifier";
pub const SSO_PATH: &str = "/oidc/v1/oauth/sso";
pub const CONSENT_PATH: &str = "/signin-service/v1/consent/marketing";
pub const CALLBACK_PATH: &str = "/oidc/v1/oauth/client/callback";
pub const TOKEN_PATH: &str = "/oidc/v1/token";
pub const CAPABILITY_PATH: &str = "/mbbcoauth/mobile/oauth2/v1/token";
pub const VEHICLES_PATH: &str = "/vehicle/v1/vehicles";

/// Wiremock server playing every remote party
pub struct MockProvider {
    pub server: MockServer,
}

impl MockProvider {
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn config(&self) -> AuthConfig {
        AuthConfig::with_base_url(&self.server.uri())
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server.uri())
    }

    pub fn session<S: TokenStore>(&self, store: S) -> Session<S> {
        Session::new(self.config(), Credentials::new(USERNAME, PASSWORD), store).unwrap()
    }

    pub async fn mount_discovery(&self) {
        Mock::given(method("GET"))
            .and(path("/login/v1/idk/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": self.uri(),
                "authorization_endpoint": self.url("/oidc/v1/authorize"),
                "token_endpoint": self.url(TOKEN_PATH),
            })))
            .mount(&self.server)
            .await;
    }

    /// Email page, identifier submit, password page and password submit
    ///
    /// The password submit redirects into the SSO hop that starts the
    /// post-login redirect chain.
    pub async fn mount_sign_in(&self) {
        Mock::given(method("GET"))
            .and(path("/oidc/v1/authorize"))
            .respond_with(ResponseTemplate::new(200).set_body_string(email_page(IDENTIFIER_PATH)))
            .expect(1)
            .mount(&self.server)
            .await;

        Mock::given(method("POST"))
            .and(path(IDENTIFIER_PATH))
            .and(body_string_contains("_csrf=csrf-email"))
            .and(body_string_contains("email=driver%40example.com"))
            .respond_with(ResponseTemplate::new(303).insert_header(
                "Location",
                "/signin-service/v1/test-client/login/authenticate?relayState=relay-1&email=x",
            ))
            .expect(1)
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path_regex(r"/login/authenticate$"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(password_page("csrf-pw", "hmac-pw")),
            )
            .expect(1)
            .mount(&self.server)
            .await;

        Mock::given(method("POST"))
            .and(path_regex(r"/login/authenticate$"))
            .and(body_string_contains("relayState=relay-1"))
            .and(body_string_contains("_csrf=csrf-pw"))
            .and(body_string_contains("hmac=hmac-pw"))
            .and(body_string_contains("password=correct+horse"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{SSO_PATH}?relayState=relay-2").as_str()),
            )
            .expect(1)
            .mount(&self.server)
            .await;
    }

    /// SSO hop → marketing consent page → callback → app-scheme code
    pub async fn mount_redirect_chain(&self) {
        Mock::given(method("GET"))
            .and(path(SSO_PATH))
            .respond_with(ResponseTemplate::new(302).insert_header(
                "Location",
                format!("{CONSENT_PATH}?relayState=relay-3&hmac=hmac-consent").as_str(),
            ))
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path(CONSENT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(consent_page("csrf-consent")))
            .mount(&self.server)
            .await;

        Mock::given(method("POST"))
            .and(path(CONSENT_PATH))
            .and(body_string_contains("_csrf=csrf-consent"))
            .and(body_string_contains("relayState=relay-3"))
            .and(body_string_contains("hmac=hmac-consent"))
            .and(body_string_contains("marketingPermission=NO"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", CALLBACK_PATH))
            .expect(1)
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path(CALLBACK_PATH))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("myaudi:///?code={AUTH_CODE}").as_str()),
            )
            .mount(&self.server)
            .await;
    }

    /// Code exchange and id_token exchange issuing `access` and `mbb`
    pub async fn mount_token_exchange(&self, access: &str, mbb: &str) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains(format!("code={AUTH_CODE}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access,
                "refresh_token": "refresh-1",
                "id_token": "id-1",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&self.server)
            .await;

        self.mount_capability("id-1", mbb).await;
    }

    /// Refresh grant answering with `id-2`, chained to capability token `mbb`
    pub async fn mount_refresh(&self, mbb: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "access_token": "access-2",
                        "id_token": "id-2",
                        "expires_in": 3600,
                    }))
                    .set_delay(std::time::Duration::from_millis(150)),
            )
            .expect(expected_calls)
            .mount(&self.server)
            .await;

        self.mount_capability("id-2", mbb).await;
    }

    pub async fn mount_capability(&self, id_token: &str, mbb: &str) {
        Mock::given(method("POST"))
            .and(path(CAPABILITY_PATH))
            .and(body_string_contains(format!("token={id_token}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": mbb, "expires_in": 3600})),
            )
            .mount(&self.server)
            .await;
    }

    /// Vehicle list that only accepts `Bearer {token}`; others get `401`
    pub async fn mount_vehicles(&self, token: &str) {
        Mock::given(method("GET"))
            .and(path(VEHICLES_PATH))
            .and(header("Authorization", format!("Bearer {token}").as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": [{"vin": "WAUZZZ4G7EN000001"}]})),
            )
            .with_priority(1)
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path(VEHICLES_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .with_priority(2)
            .mount(&self.server)
            .await;
    }

    pub async fn received(&self, method_name: &str, path_name: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == method_name && r.url.path() == path_name)
            .count()
    }
}
