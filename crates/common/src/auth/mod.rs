//! myAudi identity-provider authentication
//!
//! Logs in against the VW Group identity provider the way the mobile app
//! does: an OAuth 2.0 authorization-code flow with PKCE whose login pages are
//! scraped rather than shown to a user, followed by an exchange of the
//! `id_token` for the capability ("mbb") token the vehicle API accepts.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │     Session     │  login / refresh / authenticated requests
//! └────────┬────────┘
//!          │
//!          ├──► LoginFlow     (scraped sign-in wizard → authorization code)
//!          ├──► TokenClient   (discovery, code/id_token/refresh exchanges)
//!          ├──► TokenStore    (FileTokenStore: ~/.audi_tokens.json)
//!          │
//!          └──► PKCE + HTML utilities
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use audilink_common::auth::{Credentials, FileTokenStore, Session};
//! use audilink_common::config::AuthConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::new(
//!         AuthConfig::default(),
//!         Credentials::new("driver@example.com", "secret"),
//!         FileTokenStore::at_default_location()?,
//!     )?;
//!
//!     let outcome = session.login().await?;
//!     println!("Authenticated ({})", outcome.source);
//!
//!     let url = session.config().vehicles_url();
//!     let vehicles: serde_json::Value = session.authenticated_json(&url).await?;
//!     println!("{vehicles:#}");
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - **[`pkce`]**: verifier, S256 challenge, state and nonce
//! - **[`html`]**: form, `window._IDK` and script-redirect extraction
//! - **[`flow`]**: the sign-in wizard state machine
//! - **[`client`]**: OpenID discovery and token endpoint calls
//! - **[`store`]**: atomic JSON token file
//! - **[`session`]**: login policy, single-flight refresh, `401` retry
//! - **[`types`]**: tokens, records, wire shapes
//! - **[`error`]**: [`AuthError`] and [`StoreError`]

pub mod client;
pub mod error;
pub mod flow;
pub mod html;
pub mod pkce;
pub mod session;
pub mod store;
pub mod traits;
pub mod types;

pub use client::TokenClient;
pub use error::{AuthError, StoreError};
pub use flow::{http_client, FlowStep, LoginFlow};
pub use pkce::{code_challenge, PkcePair};
pub use session::{Credentials, Session};
pub use store::{FileTokenStore, DEFAULT_TOKEN_FILE};
pub use traits::TokenStore;
pub use types::{
    CapabilityToken, LoginOutcome, SessionRecord, StoredSession, TokenSet, TokenSource,
};
