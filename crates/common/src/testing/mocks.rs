//! Mock implementations of the auth traits

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::auth::error::StoreError;
use crate::auth::traits::TokenStore;
use crate::auth::types::SessionRecord;

#[derive(Debug, Default)]
struct State {
    record: Mutex<Option<SessionRecord>>,
    loads: AtomicUsize,
    saves: AtomicUsize,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
}

/// In-memory token store
///
/// Clones share state, so a test can keep a handle after moving a clone
/// into a session.
///
/// # Examples
///
/// ```
/// use audilink_common::testing::{sample_record, MemoryTokenStore};
///
/// let store = MemoryTokenStore::with_record(sample_record("a", "m"));
/// let handle = store.clone();
/// assert_eq!(handle.current().unwrap().tokens.access_token, "a");
/// assert_eq!(handle.load_count(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    state: Arc<State>,
}

impl MemoryTokenStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with `record`
    #[must_use]
    pub fn with_record(record: SessionRecord) -> Self {
        let store = Self::new();
        *store.state.record.lock() = Some(record);
        store
    }

    /// Record currently held
    #[must_use]
    pub fn current(&self) -> Option<SessionRecord> {
        self.state.record.lock().clone()
    }

    /// Number of `load` calls so far
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.state.loads.load(Ordering::SeqCst)
    }

    /// Number of `save` calls so far, failed ones included
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.state.saves.load(Ordering::SeqCst)
    }

    /// Make subsequent loads fail
    pub fn fail_loads(&self, fail: bool) {
        self.state.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent saves fail
    pub fn fail_saves(&self, fail: bool) {
        self.state.fail_saves.store(fail, Ordering::SeqCst);
    }
}

fn injected(operation: &str) -> StoreError {
    StoreError::Io(io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("injected {operation} failure"),
    ))
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<SessionRecord>, StoreError> {
        self.state.loads.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_loads.load(Ordering::SeqCst) {
            return Err(injected("load"));
        }
        Ok(self.current())
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.state.saves.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_saves.load(Ordering::SeqCst) {
            return Err(injected("save"));
        }
        *self.state.record.lock() = Some(record.clone());
        Ok(())
    }
}
