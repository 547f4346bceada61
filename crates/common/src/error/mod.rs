//! Shared error classification for audilink crates
//!
//! Every error type exposed by this crate implements [`ErrorClassification`]
//! so callers can make uniform decisions about retries, log levels and exit
//! codes without matching on each module's variants.
//!
//! ## ErrorSeverity Levels
//!
//! | Level | Use Case | Examples |
//! |-------|----------|----------|
//! | **Info** | Expected conditions | No cached session, user logged out |
//! | **Warning** | Degraded but operational | Token file not writable, refresh fell back to login |
//! | **Error** | Failure requiring attention | Token exchange rejected, unexpected HTTP status |
//! | **Critical** | Integration broken | Provider markup drift, redirect loops |
//!
//! ## Example
//!
//! ```rust,ignore
//! use audilink_common::error::ErrorClassification;
//!
//! match session.authenticated_request(url).await {
//!     Ok(response) => handle(response),
//!     Err(e) if e.is_retryable() => schedule_retry(e.retry_after()),
//!     Err(e) => return Err(e),
//! }
//! ```

use std::fmt;
use std::time::Duration;

/// Standard error classification interface
///
/// Implemented by every error type in the crate to provide consistent
/// handling across modules.
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient issues that may succeed if attempted
    /// again, such as network timeouts or a provider returning `5xx`.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    ///
    /// Used for logging and exit-code decisions.
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    ///
    /// Critical errors indicate that the login integration itself no longer
    /// matches the provider (markup drift, redirect loops).
    fn is_critical(&self) -> bool;

    /// Get the suggested retry delay if applicable
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}
