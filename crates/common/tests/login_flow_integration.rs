//! Integration tests for the sign-in wizard
//!
//! Drives `LoginFlow` against a wiremock stand-in for the identity provider.

mod support;

use std::sync::Arc;

use audilink_common::auth::{http_client, AuthError, LoginFlow, PkcePair};
use audilink_common::config::AuthConfig;
use audilink_common::testing::{email_page, script_redirect_page};
use support::{MockProvider, AUTH_CODE, CONSENT_PATH, PASSWORD, SSO_PATH, USERNAME};
use url::Url;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, ResponseTemplate};

fn flow_for(config: AuthConfig) -> LoginFlow {
    let config = Arc::new(config);
    let http = http_client(&config).unwrap();
    LoginFlow::new(config, http)
}

/// Validates the complete wizard from the authorization page to the code.
///
/// Assertions:
/// - Email and password steps post the scraped hidden fields and tokens.
/// - The marketing consent page is declined exactly once.
/// - The code is taken from the app-scheme redirect.
#[tokio::test]
async fn test_full_wizard_returns_code() {
    let provider = MockProvider::start().await;
    provider.mount_sign_in().await;
    provider.mount_redirect_chain().await;

    let flow = flow_for(provider.config());
    let pkce = PkcePair::generate();
    let code = flow
        .run(&provider.url("/oidc/v1/authorize"), USERNAME, PASSWORD, &pkce)
        .await
        .unwrap();

    assert_eq!(code, AUTH_CODE);
    assert_eq!(provider.received("POST", CONSENT_PATH).await, 1);
}

/// Validates the post-password chain: 302 → consent 200 → 302 → code.
#[tokio::test]
async fn test_redirect_chain_declines_consent_once() {
    let provider = MockProvider::start().await;
    provider.mount_redirect_chain().await;

    let flow = flow_for(provider.config());
    let start = Url::parse(&provider.url(SSO_PATH)).unwrap();
    let terminal = flow.follow_redirect_chain(start).await.unwrap();

    assert_eq!(terminal.scheme(), "myaudi");
    assert_eq!(
        terminal.query_pairs().find(|(k, _)| k == "code").map(|(_, v)| v.into_owned()),
        Some(AUTH_CODE.to_string())
    );
}

/// Validates that a self-referencing redirect stops after the hop limit.
///
/// Assertions:
/// - Exactly `max_redirect_hops` GETs are made.
/// - The error reports the hop count.
#[tokio::test]
async fn test_endless_redirect_is_a_loop() {
    let provider = MockProvider::start().await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
        .expect(20)
        .mount(&provider.server)
        .await;

    let flow = flow_for(provider.config());
    let start = Url::parse(&provider.url("/loop")).unwrap();
    let err = flow.follow_redirect_chain(start).await.unwrap_err();

    assert!(matches!(err, AuthError::RedirectLoop { hops: 20 }), "{err:?}");
}

#[tokio::test]
async fn test_hop_limit_follows_config() {
    let provider = MockProvider::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(script_redirect_page("/again")))
        .expect(3)
        .mount(&provider.server)
        .await;

    let flow = flow_for(AuthConfig { max_redirect_hops: 3, ..provider.config() });
    let start = Url::parse(&provider.url("/again")).unwrap();

    assert!(matches!(
        flow.follow_redirect_chain(start).await,
        Err(AuthError::RedirectLoop { hops: 3 })
    ));
}

/// Validates that markup drift on the first page is reported as a shape
/// error naming the login form.
#[tokio::test]
async fn test_missing_login_form() {
    let provider = MockProvider::start().await;
    Mock::given(method("GET"))
        .and(path("/oidc/v1/authorize"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&provider.server)
        .await;

    let flow = flow_for(provider.config());
    let err = flow
        .run(&provider.url("/oidc/v1/authorize"), USERNAME, PASSWORD, &PkcePair::generate())
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::ProtocolShape { element: "login form" }), "{err:?}");
}

/// Validates that a password page without `window._IDK` stops the flow
/// before the password is sent.
#[tokio::test]
async fn test_password_page_without_idk() {
    let provider = MockProvider::start().await;
    Mock::given(method("GET"))
        .and(path("/oidc/v1/authorize"))
        .respond_with(ResponseTemplate::new(200).set_body_string(email_page("/identifier")))
        .mount(&provider.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/identifier"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "/authenticate?relayState=r1"),
        )
        .mount(&provider.server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"/login/authenticate$"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&provider.server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/login/authenticate$"))
        .respond_with(ResponseTemplate::new(302))
        .expect(0)
        .mount(&provider.server)
        .await;

    let flow = flow_for(provider.config());
    let err = flow
        .run(&provider.url("/oidc/v1/authorize"), USERNAME, PASSWORD, &PkcePair::generate())
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::ProtocolShape { element: "window._IDK object" }));
}

#[tokio::test]
async fn test_email_step_requires_redirect() {
    let provider = MockProvider::start().await;
    Mock::given(method("GET"))
        .and(path("/oidc/v1/authorize"))
        .respond_with(ResponseTemplate::new(200).set_body_string(email_page("/identifier")))
        .mount(&provider.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/identifier"))
        .respond_with(ResponseTemplate::new(200).set_body_string("unknown account"))
        .mount(&provider.server)
        .await;

    let flow = flow_for(provider.config());
    let err = flow
        .run(&provider.url("/oidc/v1/authorize"), USERNAME, PASSWORD, &PkcePair::generate())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(200));
    assert!(err.to_string().contains("submit email"), "{err}");
}
