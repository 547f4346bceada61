//! Error types for the login flow, token exchange and token store

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::error::{ErrorClassification, ErrorSeverity};

/// Delay suggested before retrying after a transient provider failure.
const TRANSIENT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Failures of the login flow, token exchange and authenticated requests
#[derive(Debug, Error)]
pub enum AuthError {
    /// A provider page or response lacks an element the flow depends on
    ///
    /// Usually means the provider changed its markup.
    #[error("provider response is missing the expected {element}")]
    ProtocolShape {
        /// Human-readable name of the missing element
        element: &'static str,
    },

    /// The redirect chain did not terminate within the hop bound
    #[error("redirect chain exceeded {hops} hops")]
    RedirectLoop {
        /// Hops followed before giving up
        hops: usize,
    },

    /// A page ended the chain without a location, JS redirect or code
    #[error("redirect chain stopped at {location} without an authorization code")]
    NoFurtherRedirect {
        /// Last URL visited
        location: String,
    },

    /// A flow step or API request returned an unexpected status
    #[error("{step} returned HTTP {status}: {excerpt}")]
    HttpStatus {
        /// Flow step or request label
        step: String,
        /// HTTP status code
        status: u16,
        /// Bounded body excerpt
        excerpt: String,
    },

    /// A token endpoint rejected the exchange
    #[error("token exchange at {endpoint} failed with HTTP {status}: {excerpt}")]
    TokenExchange {
        /// Endpoint URL
        endpoint: String,
        /// HTTP status code
        status: u16,
        /// Bounded body excerpt
        excerpt: String,
    },

    /// The final redirect carried a different `state` than was sent
    #[error("authorization redirect carried an unexpected state parameter")]
    StateMismatch,

    /// The token store failed
    #[error("token store error: {0}")]
    Store(#[from] StoreError),

    /// Network or protocol failure below HTTP status handling
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A URL from configuration or a provider response could not be parsed
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration is unusable (e.g. the HTTP client cannot be built)
    #[error("configuration error: {0}")]
    Config(String),

    /// No session is loaded; call `login` first
    #[error("no authenticated session")]
    NotAuthenticated,

    /// A shared single-flight refresh failed
    #[error("token refresh failed: {0}")]
    Refresh(Arc<AuthError>),
}

impl AuthError {
    /// Status code carried by HTTP-level failures
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } | Self::TokenExchange { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Refresh(inner) => inner.status(),
            _ => None,
        }
    }
}

impl ErrorClassification for AuthError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::HttpStatus { status, .. } | Self::TokenExchange { status, .. } => {
                *status >= 500 || *status == 429
            }
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Refresh(inner) => inner.is_retryable(),
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ProtocolShape { .. } | Self::RedirectLoop { .. } => ErrorSeverity::Critical,
            Self::NotAuthenticated => ErrorSeverity::Info,
            Self::Store(_) => ErrorSeverity::Warning,
            Self::Refresh(inner) => inner.severity(),
            _ if self.is_retryable() => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    fn retry_after(&self) -> Option<Duration> {
        self.is_retryable().then_some(TRANSIENT_RETRY_DELAY)
    }
}

/// Token store failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading, writing or syncing the file failed
    #[error("token file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The record could not be encoded or decoded
    #[error("token file serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The temporary file could not be renamed over the target
    #[error("failed to replace token file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl ErrorClassification for StoreError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Persist(_))
    }

    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Warning
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}
