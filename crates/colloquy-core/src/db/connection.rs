//! Database connection management

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::Connection;

use super::migrations;
use super::queue::UploadQueueRepository;
use super::settings::SettingsRepository;
use super::syncable::SyncableRepository;
use crate::error::Result;
use crate::models::{Attachment, CloudModel, Conversation, McpServer, Memory, Message};
use crate::util::now_ms;

/// How long tombstones and queue history are retained before purge.
pub const RETENTION_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Shared handle to the `SQLite` database.
///
/// Opening runs migrations and the maintenance pass: in-flight queue
/// entries reset to pending and expired tombstones purge. Clones share the
/// underlying connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    device_id: String,
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        configure(&conn)?;
        migrations::run(&conn)?;
        let device_id = maintain(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            device_id,
        })
    }

    /// Lock the connection for a batch of statements. Hold the guard only
    /// for synchronous work, never across an await point.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stable identity of this installation, minted on first open.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Wipe all synced state: entity tables, the upload queue, and the
    /// change cursor. Used when the remote zone no longer exists.
    pub fn reset_synced_state(&self) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        SyncableRepository::<Conversation>::new(&tx).clear()?;
        SyncableRepository::<Message>::new(&tx).clear()?;
        SyncableRepository::<Attachment>::new(&tx).clear()?;
        SyncableRepository::<Memory>::new(&tx).clear()?;
        SyncableRepository::<CloudModel>::new(&tx).clear()?;
        SyncableRepository::<McpServer>::new(&tx).clear()?;
        UploadQueueRepository::new(&tx).clear()?;
        SettingsRepository::new(&tx).clear_sync_cursor()?;
        tx.commit()?;
        Ok(())
    }
}

fn configure(conn: &Connection) -> Result<()> {
    // WAL wants a query, not execute
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// Open-time maintenance. Returns the device id.
fn maintain(conn: &Connection) -> Result<String> {
    let cutoff = now_ms() - RETENTION_MS;

    let queue = UploadQueueRepository::new(conn);
    let reset = queue.reset_in_flight()?;
    if reset > 0 {
        tracing::info!(reset, "returned in-flight queue entries to pending");
    }
    let purged = queue.purge(cutoff)?
        + SyncableRepository::<Conversation>::new(conn).purge_removed_before(cutoff)?
        + SyncableRepository::<Message>::new(conn).purge_removed_before(cutoff)?
        + SyncableRepository::<Attachment>::new(conn).purge_removed_before(cutoff)?
        + SyncableRepository::<Memory>::new(conn).purge_removed_before(cutoff)?
        + SyncableRepository::<CloudModel>::new(conn).purge_removed_before(cutoff)?
        + SyncableRepository::<McpServer>::new(conn).purge_removed_before(cutoff)?;
    if purged > 0 {
        tracing::debug!(purged, "purged expired sync history");
    }

    SettingsRepository::new(conn).device_id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeKind, UploadEntry, UploadState};

    #[test]
    fn test_open_in_memory_mints_device_id() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.device_id().is_empty());
    }

    #[test]
    fn test_device_id_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("colloquy.db");

        let first = Database::open(&path).unwrap().device_id().to_string();
        let second = Database::open(&path).unwrap().device_id().to_string();
        assert_eq!(first, second);
    }

    #[test]
    fn test_open_resets_in_flight_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("colloquy.db");

        {
            let db = Database::open(&path).unwrap();
            let conn = db.lock();
            let queue = UploadQueueRepository::new(&conn);
            let memory = Memory::new("a");
            let id = queue
                .enqueue(&UploadEntry::from_source(&memory, ChangeKind::Insert).unwrap())
                .unwrap();
            queue.set_state(&[id], UploadState::Uploading).unwrap();
        }

        let db = Database::open(&path).unwrap();
        let conn = db.lock();
        let entries = UploadQueueRepository::new(&conn).list_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].state, UploadState::Pending);
    }

    #[test]
    fn test_open_purges_expired_tombstones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("colloquy.db");

        let object_id;
        {
            let db = Database::open(&path).unwrap();
            let conn = db.lock();
            let repo = SyncableRepository::<Memory>::new(&conn);
            let mut memory = Memory::new("old");
            memory.removed = true;
            memory.modified = now_ms() - RETENTION_MS - 1000;
            object_id = memory.object_id.clone();
            repo.upsert(&memory).unwrap();
        }

        let db = Database::open(&path).unwrap();
        let conn = db.lock();
        let repo = SyncableRepository::<Memory>::new(&conn);
        assert_eq!(repo.get(&object_id).unwrap(), None);
    }

    #[test]
    fn test_reset_synced_state_clears_everything() {
        let db = Database::open_in_memory().unwrap();
        {
            let conn = db.lock();
            SyncableRepository::<Memory>::new(&conn)
                .upsert(&Memory::new("a"))
                .unwrap();
            let memory = Memory::new("b");
            UploadQueueRepository::new(&conn)
                .enqueue(&UploadEntry::from_source(&memory, ChangeKind::Insert).unwrap())
                .unwrap();
            SettingsRepository::new(&conn).set_sync_cursor("42").unwrap();
        }

        db.reset_synced_state().unwrap();

        let conn = db.lock();
        assert_eq!(SyncableRepository::<Memory>::new(&conn).count().unwrap(), 0);
        assert_eq!(UploadQueueRepository::new(&conn).count().unwrap(), 0);
        assert_eq!(SettingsRepository::new(&conn).sync_cursor().unwrap(), None);
    }
}
