//! In-memory store implementation.

use std::sync::{Arc, Mutex};

use super::{RecentRoomEntry, SessionStore, StoreError, upsert_recent, validate_username};

/// In-memory store for tests and simulations.
///
/// All state lives behind an `Arc<Mutex<..>>` so clones share one view,
/// matching how drivers hand the store to background tasks. Uses
/// `lock().expect()`, which panics if the mutex is poisoned - acceptable for
/// test code.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Remembered visits, most recent first.
    recent: Vec<RecentRoomEntry>,

    /// Saved username, if any.
    username: Option<String>,
}

impl MemoryStore {
    /// Create a new empty `MemoryStore`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for test
    /// code.
    #[allow(clippy::expect_used)]
    fn record_join(&self, room_id: &str, joined_at_secs: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        let entries = std::mem::take(&mut inner.recent);
        inner.recent = upsert_recent(entries, room_id, joined_at_secs);
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn list_recent(&self) -> Result<Vec<RecentRoomEntry>, StoreError> {
        Ok(self.inner.lock().expect("Mutex poisoned").recent.clone())
    }

    #[allow(clippy::expect_used)]
    fn save_username(&self, username: &str) -> Result<(), StoreError> {
        validate_username(username)?;
        self.inner.lock().expect("Mutex poisoned").username = Some(username.to_string());
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn load_username(&self) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().expect("Mutex poisoned").username.clone())
    }
}
