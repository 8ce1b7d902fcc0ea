//! Redb-backed durable store implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. The
//! recents list and profile survive client restarts.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};

use super::{RecentRoomEntry, SessionStore, StoreError, upsert_recent, validate_username};

/// Table: recent_rooms
/// Key: fixed key `b"recent"` (single row)
/// Value: CBOR-encoded `Vec<RecentRoomEntry>`, most recent first
const RECENT_ROOMS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("recent_rooms");

/// Table: profile
/// Key: fixed key `b"username"` (single row)
/// Value: username as UTF-8 bytes
const PROFILE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("profile");

const RECENT_KEY: &[u8] = b"recent";
const USERNAME_KEY: &[u8] = b"username";

/// Durable store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist (`RECENT_ROOMS`, `PROFILE`).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(|e| StoreError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(RECENT_ROOMS).map_err(|e| StoreError::Io(e.to_string()))?;
            let _ = txn.open_table(PROFILE).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

/// Decode a stored visit list, treating a corrupt blob as empty.
///
/// Recents are advisory bookkeeping; one bad write must not wedge the
/// feature, so decode failures degrade instead of erroring.
fn decode_recent(raw: Option<Vec<u8>>) -> Vec<RecentRoomEntry> {
    match raw {
        Some(bytes) => ciborium::from_reader(bytes.as_slice()).unwrap_or_default(),
        None => Vec::new(),
    }
}

impl SessionStore for RedbStore {
    fn record_join(&self, room_id: &str, joined_at_secs: u64) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(RECENT_ROOMS).map_err(|e| StoreError::Io(e.to_string()))?;

            let raw = table
                .get(RECENT_KEY)
                .map_err(|e| StoreError::Io(e.to_string()))?
                .map(|guard| guard.value().to_vec());

            let entries = upsert_recent(decode_recent(raw), room_id, joined_at_secs);

            let mut value = Vec::new();
            ciborium::into_writer(&entries, &mut value)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;

            table
                .insert(RECENT_KEY, value.as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(())
    }

    fn list_recent(&self) -> Result<Vec<RecentRoomEntry>, StoreError> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Io(e.to_string()))?;
        let table = txn.open_table(RECENT_ROOMS).map_err(|e| StoreError::Io(e.to_string()))?;

        let raw = table
            .get(RECENT_KEY)
            .map_err(|e| StoreError::Io(e.to_string()))?
            .map(|guard| guard.value().to_vec());

        Ok(decode_recent(raw))
    }

    fn save_username(&self, username: &str) -> Result<(), StoreError> {
        validate_username(username)?;

        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;

        {
            let mut table = txn.open_table(PROFILE).map_err(|e| StoreError::Io(e.to_string()))?;
            table
                .insert(USERNAME_KEY, username.as_bytes())
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(())
    }

    fn load_username(&self) -> Result<Option<String>, StoreError> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Io(e.to_string()))?;
        let table = txn.open_table(PROFILE).map_err(|e| StoreError::Io(e.to_string()))?;

        let raw = table
            .get(USERNAME_KEY)
            .map_err(|e| StoreError::Io(e.to_string()))?
            .map(|guard| guard.value().to_vec());

        // A non-UTF-8 value means the row was corrupted; prefill silently
        // falls back to an empty form.
        Ok(raw.and_then(|bytes| String::from_utf8(bytes).ok()))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn visits_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.redb");

        {
            let store = RedbStore::open(&path).unwrap();
            store.record_join("1a2b3c", 100).unwrap();
            store.record_join("4d5e6f", 200).unwrap();
            store.save_username("alice").unwrap();
        }

        let store = RedbStore::open(&path).unwrap();

        let recent = store.list_recent().unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].room_id, "4d5e6f");
        assert_eq!(store.load_username().unwrap(), Some("alice".to_string()));
    }

    #[test]
    fn repeat_visit_keeps_one_entry_with_later_timestamp() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        store.record_join("1a2b3c", 100).unwrap();
        store.record_join("1a2b3c", 250).unwrap();

        let recent = store.list_recent().unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].last_joined_secs, 250);
    }

    #[test]
    fn empty_store_lists_nothing() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        assert!(store.list_recent().unwrap().is_empty());
        assert_eq!(store.load_username().unwrap(), None);
    }

    #[test]
    fn corrupt_recents_degrade_to_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.redb");

        // Poison the stored blob directly, then reopen through the store.
        {
            let db = Database::create(&path).unwrap();
            let txn = db.begin_write().unwrap();
            {
                let mut table = txn.open_table(RECENT_ROOMS).unwrap();
                table.insert(RECENT_KEY, [0xFF, 0x13, 0x37].as_slice()).unwrap();
            }
            txn.commit().unwrap();
        }

        let store = RedbStore::open(&path).unwrap();
        assert!(store.list_recent().unwrap().is_empty());

        // A fresh visit replaces the corrupt blob.
        store.record_join("1a2b3c", 100).unwrap();
        assert_eq!(store.list_recent().unwrap().len(), 1);
    }

    #[test]
    fn username_overwrite_is_last_write_wins() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        store.save_username("alice").unwrap();
        store.save_username("bob").unwrap();

        assert_eq!(store.load_username().unwrap(), Some("bob".to_string()));
    }

    #[test]
    fn empty_username_is_rejected() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        assert!(matches!(store.save_username(""), Err(StoreError::InvalidValue(_))));
        assert_eq!(store.load_username().unwrap(), None);
    }
}
