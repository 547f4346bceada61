//! Trait seam for session persistence
//!
//! The session manager only talks to storage through [`TokenStore`], so
//! tests and embedders can swap the JSON file for something else.

use async_trait::async_trait;

use super::error::StoreError;
use super::types::SessionRecord;

/// Durable storage for the single session record
#[async_trait]
pub trait TokenStore: Send + Sync + 'static {
    /// Load the stored record
    ///
    /// # Returns
    /// `None` when nothing usable is stored.
    ///
    /// # Errors
    /// Returns error only for failures the caller may want to report; the
    /// session manager treats any error as "no cached session".
    async fn load(&self) -> Result<Option<SessionRecord>, StoreError>;

    /// Replace the stored record wholesale
    ///
    /// # Errors
    /// Returns error if the record could not be durably written. The
    /// previous record must then still be intact.
    async fn save(&self, record: &SessionRecord) -> Result<(), StoreError>;
}
