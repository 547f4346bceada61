//! Common utility functions and helper macros
//!
//! - **[`macros`]**: Utility macros for reducing boilerplate code
//! - **[`serde`]**: Serialization helpers for timestamps

#[macro_use]
pub mod macros;
pub mod serde;

// Re-export commonly used items for convenience
pub use self::serde::{iso8601_opt, parse_iso8601};
