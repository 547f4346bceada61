//! Testing utilities and helpers
//!
//! - **[`mocks`]**: in-memory [`TokenStore`](crate::auth::TokenStore) with
//!   call counters and failure injection
//! - **[`fixtures`]**: sign-in service pages and sample session records
//!
//! ## Usage
//!
//! ```rust
//! use audilink_common::testing::{sample_record, MemoryTokenStore};
//!
//! let store = MemoryTokenStore::with_record(sample_record("access", "mbb"));
//! store.fail_saves(true);
//! assert_eq!(store.save_count(), 0);
//! ```

pub mod fixtures;
pub mod mocks;

pub use fixtures::{
    consent_page, email_page, expired_record, password_page, sample_record, script_redirect_page,
};
pub use mocks::MemoryTokenStore;
