//! Local persistence for recent rooms and the saved profile.
//!
//! The store powers the rejoin list and username prefill. It is advisory
//! bookkeeping: reads that fail degrade to empty results through
//! [`recent_rooms_or_empty`] and [`saved_username_or_none`], so a corrupt
//! store can never block joining a room.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod memory;
mod redb;

pub use memory::MemoryStore;
pub use redb::RedbStore;

/// Most remembered room visits kept per client.
///
/// The recents list is a short rejoin menu, not a history; the oldest visit
/// falls off when the cap is hit.
pub const MAX_RECENT_ROOMS: usize = 10;

/// Errors from session store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Value rejected before the write.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// CBOR serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Underlying storage I/O failed.
    #[error("storage I/O error: {0}")]
    Io(String),
}

/// One remembered room visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentRoomEntry {
    /// Room identifier.
    pub room_id: String,

    /// Unix timestamp (seconds) of the latest join.
    pub last_joined_secs: u64,
}

/// Persistent client-side bookkeeping.
///
/// All methods are synchronous and take `&self`; implementations handle
/// interior mutability. The `Clone + Send + Sync + 'static` bound matches
/// how drivers share one store with background tasks.
///
/// # Panics
///
/// Implementations may panic on poisoned locks (a thread panicked while
/// holding the lock), as this indicates a bug elsewhere.
pub trait SessionStore: Clone + Send + Sync + 'static {
    /// Record a room visit at `joined_at_secs` (Unix seconds).
    ///
    /// Upserts by room id: a repeat visit refreshes the timestamp instead of
    /// adding a duplicate entry. At most [`MAX_RECENT_ROOMS`] entries are
    /// kept.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn record_join(&self, room_id: &str, joined_at_secs: u64) -> Result<(), StoreError>;

    /// All remembered visits, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    fn list_recent(&self) -> Result<Vec<RecentRoomEntry>, StoreError>;

    /// Persist the preferred username for prefill on the next launch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidValue`] for the empty string; anything
    /// else is stored verbatim.
    fn save_username(&self, username: &str) -> Result<(), StoreError>;

    /// The saved username, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    fn load_username(&self) -> Result<Option<String>, StoreError>;
}

/// Remembered visits, or an empty list when the store is unreadable.
pub fn recent_rooms_or_empty<S: SessionStore>(store: &S) -> Vec<RecentRoomEntry> {
    store.list_recent().unwrap_or_default()
}

/// Saved username, or `None` when the store is unreadable.
pub fn saved_username_or_none<S: SessionStore>(store: &S) -> Option<String> {
    store.load_username().ok().flatten()
}

/// Upsert `room_id` into `entries`, keeping most-recent-first order and the
/// [`MAX_RECENT_ROOMS`] cap.
///
/// A repeat visit keeps the later of the stored and new timestamps, so a
/// replayed write cannot move an entry backwards in time.
fn upsert_recent(
    mut entries: Vec<RecentRoomEntry>,
    room_id: &str,
    joined_at_secs: u64,
) -> Vec<RecentRoomEntry> {
    if let Some(existing) = entries.iter_mut().find(|entry| entry.room_id == room_id) {
        existing.last_joined_secs = existing.last_joined_secs.max(joined_at_secs);
    } else {
        entries
            .push(RecentRoomEntry { room_id: room_id.to_string(), last_joined_secs: joined_at_secs });
    }

    // Stable sort: ties keep their existing order.
    entries.sort_by(|a, b| b.last_joined_secs.cmp(&a.last_joined_secs));
    entries.truncate(MAX_RECENT_ROOMS);
    entries
}

fn validate_username(username: &str) -> Result<(), StoreError> {
    if username.is_empty() {
        return Err(StoreError::InvalidValue("username must not be empty".to_string()));
    }
    Ok(())
}
