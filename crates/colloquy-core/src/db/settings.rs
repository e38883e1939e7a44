//! Key-value settings repository.
//!
//! Settings are local-only state: the device identity, the remote change
//! cursor, and per-group sync switches. They never enter the upload queue.

use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::error::Result;

/// Stable identity of this installation.
pub const KEY_DEVICE_ID: &str = "device_id";
/// Opaque resume token for the remote change feed.
pub const KEY_SYNC_CURSOR: &str = "sync_cursor";
/// Set once the initial queue backfill has run.
pub const KEY_BACKFILL_DONE: &str = "sync_backfill_done";

pub struct SettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SettingsRepository<'a> {
    #[must_use]
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Return the device id, minting one on first use.
    pub fn device_id(&self) -> Result<String> {
        if let Some(id) = self.get(KEY_DEVICE_ID)? {
            return Ok(id);
        }
        let id = Uuid::new_v4().to_string();
        self.set(KEY_DEVICE_ID, &id)?;
        Ok(id)
    }

    pub fn sync_cursor(&self) -> Result<Option<String>> {
        self.get(KEY_SYNC_CURSOR)
    }

    pub fn set_sync_cursor(&self, cursor: &str) -> Result<()> {
        self.set(KEY_SYNC_CURSOR, cursor)
    }

    pub fn clear_sync_cursor(&self) -> Result<()> {
        self.delete(KEY_SYNC_CURSOR)
    }

    pub fn backfill_done(&self) -> Result<bool> {
        Ok(self.get(KEY_BACKFILL_DONE)?.is_some())
    }

    pub fn set_backfill_done(&self) -> Result<()> {
        self.set(KEY_BACKFILL_DONE, "1")
    }

    pub fn clear_backfill_done(&self) -> Result<()> {
        self.delete(KEY_BACKFILL_DONE)
    }
}
