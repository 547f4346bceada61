//! Logging setup and log-safe formatting helpers
//!
//! The library only emits `tracing` events; binaries decide where they go by
//! calling `init_tracing` (feature `observability`) once at startup. Events
//! never carry token values, passwords or full response bodies. Use
//! [`redact`] for secrets that need to be recognisable in logs and
//! [`excerpt`] for provider responses. Error responses are read through
//! [`response_excerpt`], which stops after [`MAX_BODY_READ`] bytes.

use serde::{Deserialize, Serialize};
#[cfg(feature = "observability")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Longest body excerpt carried in errors and log events, in characters.
pub const MAX_BODY_EXCERPT: usize = 256;

/// Most bytes read from an error response body.
pub const MAX_BODY_READ: usize = 16 * 1024;

/// Output format for the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl_label_conversions!(LogFormat {
    Pretty => "pretty",
    Json => "json",
});

/// Install the global tracing subscriber
///
/// The filter comes from `RUST_LOG`, falling back to `default_filter`
/// (typically `"info"`). Events go to stderr.
///
/// # Errors
/// Returns an error if a global subscriber is already installed.
#[cfg(feature = "observability")]
pub fn init_tracing(
    format: LogFormat,
    default_filter: &str,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    }
}

/// Truncate a response body for inclusion in errors and logs
///
/// Keeps at most [`MAX_BODY_EXCERPT`] characters, collapses whitespace runs
/// and marks truncation with a trailing ellipsis.
#[must_use]
pub fn excerpt(body: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_BODY_EXCERPT {
        return collapsed;
    }

    let mut truncated: String = collapsed.chars().take(MAX_BODY_EXCERPT).collect();
    truncated.push('…');
    truncated
}

/// Excerpt of an error response, reading at most [`MAX_BODY_READ`] bytes
///
/// The rest of the body is discarded with the response. A body that fails
/// mid-read keeps what arrived; invalid UTF-8 is replaced.
#[must_use]
pub async fn response_excerpt(mut response: reqwest::Response) -> String {
    let mut body = Vec::new();

    while body.len() < MAX_BODY_READ {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let remaining = MAX_BODY_READ - body.len();
                body.extend(chunk.iter().take(remaining));
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Error body read failed");
                break;
            }
        }
    }

    excerpt(&String::from_utf8_lossy(&body))
}

/// Mask a secret, keeping a short prefix so values can be told apart
#[must_use]
pub fn redact(secret: &str) -> String {
    const VISIBLE: usize = 4;

    if secret.chars().count() <= VISIBLE * 2 {
        return "***".to_string();
    }
    let prefix: String = secret.chars().take(VISIBLE).collect();
    format!("{prefix}***")
}
