//! Session manager
//!
//! [`Session`] is the only type collaborators need: [`Session::login`]
//! decides between the cached record, a refresh and a full login, and
//! [`Session::authenticated_request`] sends API calls with a single
//! refresh-and-retry on `401`.
//!
//! # Concurrency
//!
//! - The in-memory record and its generation counter live behind one
//!   `RwLock`; readers never see a half-replaced token pair.
//! - Refreshes are single-flight. The refresh slot mutex only guards the
//!   decision ("has the generation I used already been replaced, or is a
//!   refresh already running?"). The refresh itself runs in a spawned task
//!   exposed as a shared future, so a cancelled waiter never cancels it and
//!   the result is always installed and persisted.
//! - Concurrent `login` calls are serialized by an async mutex.
//!
//! No lock is held across a network round trip.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::client::TokenClient;
use super::error::AuthError;
use super::flow::{http_client, LoginFlow};
use super::pkce::PkcePair;
use super::store::FileTokenStore;
use super::traits::TokenStore;
use super::types::{LoginOutcome, SessionRecord, TokenSource};
use crate::config::{AppConfig, AuthConfig};
use crate::observability::{redact, response_excerpt};

type RefreshResult = Result<(), Arc<AuthError>>;
type RefreshFuture = Shared<BoxFuture<'static, RefreshResult>>;

/// Account credentials for the full login
#[derive(Clone)]
pub struct Credentials {
    /// Account email
    pub username: String,
    /// Account password
    pub password: String,
}

impl Credentials {
    /// Credentials from username and password
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Default)]
struct Live {
    record: Option<SessionRecord>,
    generation: u64,
    persisted: bool,
}

#[derive(Default)]
struct RefreshSlot {
    in_flight: Option<RefreshFuture>,
}

struct Inner<S> {
    config: Arc<AuthConfig>,
    credentials: Credentials,
    http: Client,
    tokens: TokenClient,
    flow: LoginFlow,
    store: Arc<S>,
    live: RwLock<Live>,
    refresh: Mutex<RefreshSlot>,
    login_lock: tokio::sync::Mutex<()>,
}

/// Authenticated session against the identity provider and vehicle API
///
/// Cheap to clone; clones share tokens, the HTTP client and the refresh slot.
pub struct Session<S: TokenStore = FileTokenStore> {
    inner: Arc<Inner<S>>,
}

impl<S: TokenStore> Clone for Session<S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<S: TokenStore> fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let live = self.inner.live.read();
        f.debug_struct("Session")
            .field("username", &self.inner.credentials.username)
            .field("authenticated", &live.record.is_some())
            .field("generation", &live.generation)
            .finish_non_exhaustive()
    }
}

impl Session<FileTokenStore> {
    /// Session persisted to `token_file`, or `~/.audi_tokens.json`
    ///
    /// # Errors
    /// - [`AuthError::Store`] if no token file is given and no home
    ///   directory is known
    /// - [`AuthError::Config`] if the HTTP client cannot be built
    pub fn from_app_config(app: AppConfig) -> Result<Self, AuthError> {
        let store = match app.token_file {
            Some(path) => FileTokenStore::new(path),
            None => FileTokenStore::at_default_location()?,
        };
        Self::new(app.auth, Credentials::new(app.username, app.password), store)
    }

    /// Location of the session file
    #[must_use]
    pub fn token_file(&self) -> PathBuf {
        self.inner.store.path().to_path_buf()
    }
}

impl<S: TokenStore> Session<S> {
    /// Create a session; no network or store access happens here
    ///
    /// # Errors
    /// [`AuthError::Config`] if the HTTP client cannot be built.
    pub fn new(config: AuthConfig, credentials: Credentials, store: S) -> Result<Self, AuthError> {
        let config = Arc::new(config);
        let http = http_client(&config)?;

        Ok(Self {
            inner: Arc::new(Inner {
                tokens: TokenClient::new(Arc::clone(&config), http.clone()),
                flow: LoginFlow::new(Arc::clone(&config), http.clone()),
                config,
                credentials,
                http,
                store: Arc::new(store),
                live: RwLock::new(Live::default()),
                refresh: Mutex::new(RefreshSlot::default()),
                login_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// Session configuration
    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    /// Token store backing this session
    #[must_use]
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Snapshot of the current record
    #[must_use]
    pub fn record(&self) -> Option<SessionRecord> {
        self.inner.live.read().record.clone()
    }

    /// Forget the in-memory tokens; the session file is left untouched
    pub fn logout(&self) {
        let mut live = self.inner.live.write();
        live.record = None;
        live.generation += 1;
        live.persisted = false;
        info!("Session cleared");
    }

    /// Make sure the session holds usable tokens
    ///
    /// In order:
    /// 1. an unexpired capability token (from memory or the store) is used
    ///    as-is, without network calls
    /// 2. a refresh token is redeemed; failure is logged and falls through
    /// 3. a full login is performed
    ///
    /// A store write failure does not fail the login; it is reported through
    /// [`LoginOutcome::persisted`].
    ///
    /// # Errors
    /// The full-login error when steps 1 and 2 did not apply or failed.
    #[instrument(skip(self), fields(username = %redact(&self.inner.credentials.username)))]
    pub async fn login(&self) -> Result<LoginOutcome, AuthError> {
        let _serialized = self.inner.login_lock.lock().await;
        let leeway = self.inner.config.expiry_leeway();

        if self.inner.live.read().record.is_none() {
            self.restore_from_store().await;
        }

        let (has_valid_capability, has_refresh_token, generation, persisted) = {
            let live = self.inner.live.read();
            let record = live.record.as_ref();
            (
                record.and_then(|r| r.valid_capability(leeway)).is_some(),
                record.and_then(SessionRecord::refresh_token).is_some(),
                live.generation,
                live.persisted,
            )
        };

        if has_valid_capability {
            info!("Using cached session");
            return Ok(LoginOutcome { source: TokenSource::Cached, persisted });
        }

        if has_refresh_token {
            match self.refresh_after(generation).await {
                Ok(()) => {
                    info!("Session refreshed");
                    let persisted = self.inner.live.read().persisted;
                    return Ok(LoginOutcome { source: TokenSource::Refreshed, persisted });
                }
                Err(e) => warn!(error = %e, "Refresh failed, falling back to full login"),
            }
        }

        let record = self.full_login().await?;
        let generation = self.inner.install(record.clone());
        let persisted = self.inner.persist(&record, generation).await;

        info!(persisted, "Full login complete");
        Ok(LoginOutcome { source: TokenSource::FullLogin, persisted })
    }

    async fn restore_from_store(&self) {
        let loaded = match self.inner.store.load().await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(error = %e, "Token store unreadable, continuing without cached session");
                None
            }
        };

        if let Some(record) = loaded {
            debug!("Restored session from token store");
            let mut live = self.inner.live.write();
            if live.record.is_none() {
                live.record = Some(record);
                live.generation += 1;
                live.persisted = true;
            }
        }
    }

    async fn full_login(&self) -> Result<SessionRecord, AuthError> {
        info!("Starting full login");
        let inner = &self.inner;

        let authorization_endpoint = inner.tokens.discover().await?.authorization_endpoint.clone();
        let pkce = PkcePair::generate();
        let code = inner
            .flow
            .run(
                &authorization_endpoint,
                &inner.credentials.username,
                &inner.credentials.password,
                &pkce,
            )
            .await?;

        let tokens = inner.tokens.exchange_code(&code, &pkce.verifier).await?;
        let id_token =
            tokens.id_token.as_deref().ok_or(AuthError::ProtocolShape { element: "id_token" })?;
        let capability = inner.tokens.exchange_id_token(id_token).await?;

        Ok(SessionRecord::new(tokens, capability))
    }

    /// Refresh unless the record of `seen_generation` was already replaced
    ///
    /// Joins a refresh that is already running instead of starting another.
    async fn refresh_after(&self, seen_generation: u64) -> Result<(), AuthError> {
        let pending = {
            let mut slot = self.inner.refresh.lock();
            if self.inner.live.read().generation != seen_generation {
                debug!("Tokens already replaced, skipping refresh");
                return Ok(());
            }
            match slot.in_flight.clone().filter(|running| running.peek().is_none()) {
                Some(running) => {
                    debug!("Joining in-flight refresh");
                    running
                }
                None => {
                    let started = Inner::spawn_refresh(Arc::clone(&self.inner));
                    slot.in_flight = Some(started.clone());
                    started
                }
            }
        };

        pending.await.map_err(AuthError::Refresh)
    }

    fn bearer(&self) -> Result<(String, u64), AuthError> {
        let live = self.inner.live.read();
        let token = live
            .record
            .as_ref()
            .and_then(|record| record.bearer(self.inner.config.bearer))
            .ok_or(AuthError::NotAuthenticated)?;
        Ok((token.to_string(), live.generation))
    }

    async fn send_get(&self, url: &Url, token: &str) -> Result<Response, AuthError> {
        Ok(self
            .inner
            .http
            .get(url.clone())
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(ACCEPT, "application/json")
            .header("X-Client-Id", &self.inner.config.x_client_id)
            .send()
            .await?)
    }

    /// GET `url` with the session's bearer token
    ///
    /// On `401` the tokens are refreshed once (joining any refresh already
    /// running) and the request is retried once. The retried response is
    /// returned whatever its status.
    ///
    /// # Errors
    /// - [`AuthError::NotAuthenticated`] if there is no session
    /// - [`AuthError::Refresh`] if the refresh after a `401` failed
    /// - [`AuthError::Transport`] on network failures
    #[instrument(skip(self), fields(path = tracing::field::Empty))]
    pub async fn authenticated_request(&self, url: &str) -> Result<Response, AuthError> {
        let url = Url::parse(url)?;
        tracing::Span::current().record("path", url.path());

        let (token, generation) = self.bearer()?;
        let response = self.send_get(&url, &token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        info!("Request unauthorized, refreshing tokens");
        self.refresh_after(generation).await?;

        let (token, _) = self.bearer()?;
        self.send_get(&url, &token).await
    }

    /// [`Self::authenticated_request`] decoding a JSON body
    ///
    /// # Errors
    /// As [`Self::authenticated_request`], plus [`AuthError::HttpStatus`] for
    /// a non-2xx final response and [`AuthError::Transport`] for an
    /// undecodable body.
    pub async fn authenticated_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, AuthError> {
        let response = self.authenticated_request(url).await?;
        let status = response.status();

        if !status.is_success() {
            return Err(AuthError::HttpStatus {
                step: "authenticated request".to_string(),
                status: status.as_u16(),
                excerpt: response_excerpt(response).await,
            });
        }

        Ok(response.json().await?)
    }
}

impl<S: TokenStore> Inner<S> {
    /// Replace the record and bump the generation
    fn install(&self, record: SessionRecord) -> u64 {
        let mut live = self.live.write();
        live.record = Some(record);
        live.generation += 1;
        live.persisted = false;
        live.generation
    }

    /// Save `record`; a failure is logged and reported as `false`
    async fn persist(&self, record: &SessionRecord, generation: u64) -> bool {
        match self.store.save(record).await {
            Ok(()) => {
                let mut live = self.live.write();
                if live.generation == generation {
                    live.persisted = true;
                }
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to persist session; tokens kept in memory");
                false
            }
        }
    }

    fn spawn_refresh(inner: Arc<Self>) -> RefreshFuture {
        let task = tokio::spawn(async move { inner.run_refresh().await });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(Arc::new(AuthError::Config(format!("refresh task aborted: {e}")))),
            }
        }
        .boxed()
        .shared()
    }

    async fn run_refresh(&self) -> RefreshResult {
        let refresh_token = {
            let live = self.live.read();
            live.record.as_ref().and_then(SessionRecord::refresh_token).map(str::to_string)
        };

        let outcome = match refresh_token {
            Some(token) => self.tokens.refresh(&token).await,
            None => Err(AuthError::NotAuthenticated),
        };

        let installed = {
            let mut slot = self.refresh.lock();
            let installed = outcome.map(|(tokens, capability)| {
                let record = SessionRecord::new(tokens, capability);
                (self.install(record.clone()), record)
            });
            slot.in_flight = None;
            installed
        };

        match installed {
            Ok((generation, record)) => {
                self.persist(&record, generation).await;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                Err(Arc::new(e))
            }
        }
    }
}
