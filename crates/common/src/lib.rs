//! Authentication and session handling for the myAudi identity provider.
//!
//! # Modules
//!
//! - `auth`: PKCE login flow, token exchanges, token file and [`Session`]
//! - `config`: [`AuthConfig`] endpoints and constants, environment and file
//!   loading
//! - `error`: shared [`ErrorClassification`]
//! - `observability`: log-safe formatting; tracing initialization with the
//!   `observability` feature
//! - `testing`: in-memory token store and sign-in page fixtures
//!   (`test-utils` feature, on by default)
//!
//! # Safety and Quality
//!
//! No unsafe code; panicking shortcuts are denied outside tests.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Utilities first so `impl_label_conversions!` is in scope for later modules
// ---------------------------------------------------------------------------
#[macro_use]
pub mod utils;

pub mod error;

pub mod config;
pub mod observability;

pub mod auth;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "test-utils", test))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
pub use auth::{
    AuthError, Credentials, FileTokenStore, LoginOutcome, Session, SessionRecord, StoreError,
    TokenSource, TokenStore,
};
pub use config::{AppConfig, AuthConfig, BearerToken, ConfigError};
pub use error::{ErrorClassification, ErrorSeverity};
#[cfg(feature = "observability")]
pub use observability::init_tracing;
pub use observability::LogFormat;
pub use utils::serde::{iso8601_opt, parse_iso8601};
