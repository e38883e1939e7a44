//! Upload queue repository.
//!
//! The queue is an append-only mutation log. Ids are assigned as max + 1
//! inside the caller's transaction, so an id both orders sends and acts as
//! a watermark: confirming id N for an object supersedes every earlier
//! entry for that object.

use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use crate::error::{Error, Result};
use crate::models::{ChangeKind, UploadEntry, UploadState};

/// Entries that failed this many times stop being selected for send. The
/// counter is advisory; nothing is deleted until purge.
pub const FAIL_COUNT_CEILING: i64 = 100;

const COLUMNS: &str =
    "id, table_name, object_id, device_id, creation, modified, changes, state, fail_count, payload";

type RawEntry = (i64, String, String, String, i64, i64, i64, i64, i64, Vec<u8>);

pub struct UploadQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> UploadQueueRepository<'a> {
    #[must_use]
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn decode_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEntry> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
            row.get(8)?,
            row.get(9)?,
        ))
    }

    fn hydrate(raw: RawEntry) -> Result<UploadEntry> {
        let (id, table_name, object_id, device_id, creation, modified, changes, state, fail_count, payload) =
            raw;
        let changes = ChangeKind::from_i64(changes)
            .ok_or_else(|| Error::InvalidInput(format!("bad change kind {changes}")))?;
        let state = UploadState::from_i64(state)
            .ok_or_else(|| Error::InvalidInput(format!("bad upload state {state}")))?;
        Ok(UploadEntry {
            id,
            table_name,
            object_id,
            device_id,
            creation,
            modified,
            changes,
            state,
            fail_count,
            payload,
        })
    }

    /// Append one entry, assigning the next id. Run inside the same
    /// transaction as the entity write so log and state stay consistent.
    pub fn enqueue(&self, entry: &UploadEntry) -> Result<i64> {
        let id: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(id), 0) + 1 FROM upload_queue",
            [],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO upload_queue
             (id, table_name, object_id, device_id, creation, modified, changes, state, fail_count, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                entry.table_name,
                entry.object_id,
                entry.device_id,
                entry.creation,
                entry.modified,
                entry.changes.as_i64(),
                entry.state.as_i64(),
                entry.fail_count,
                entry.payload,
            ],
        )?;
        Ok(id)
    }

    /// Select the next batch to send: the latest pending entry per object,
    /// restricted to the enabled tables, below the failure ceiling, in
    /// ascending id order.
    pub fn pending_batch(&self, limit: usize, enabled_tables: &[&str]) -> Result<Vec<UploadEntry>> {
        if enabled_tables.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; enabled_tables.len()].join(", ");
        let sql = format!(
            "SELECT {COLUMNS} FROM upload_queue
             WHERE id IN (
                 SELECT MAX(id) FROM upload_queue
                 WHERE state = {pending} AND fail_count < {ceiling}
                   AND table_name IN ({placeholders})
                 GROUP BY table_name, object_id
             )
             ORDER BY id ASC
             LIMIT {limit}",
            pending = UploadState::Pending.as_i64(),
            ceiling = FAIL_COUNT_CEILING,
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(enabled_tables.iter()), Self::decode_row)?;
        let mut entries = Vec::new();
        for raw in rows {
            entries.push(Self::hydrate(raw?)?);
        }
        Ok(entries)
    }

    pub fn get(&self, id: i64) -> Result<Option<UploadEntry>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM upload_queue WHERE id = ?1"),
                params![id],
                Self::decode_row,
            )
            .optional()?;
        raw.map(Self::hydrate).transpose()
    }

    /// Every entry in id order. Test and diagnostics helper.
    pub fn list_all(&self) -> Result<Vec<UploadEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {COLUMNS} FROM upload_queue ORDER BY id ASC"))?;
        let rows = stmt.query_map([], Self::decode_row)?;
        let mut entries = Vec::new();
        for raw in rows {
            entries.push(Self::hydrate(raw?)?);
        }
        Ok(entries)
    }

    pub fn set_state(&self, ids: &[i64], state: UploadState) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "UPDATE upload_queue SET state = {} WHERE id IN ({placeholders})",
            state.as_i64()
        );
        self.conn.execute(&sql, params_from_iter(ids.iter()))?;
        Ok(())
    }

    /// Confirm a save: every entry for the object up to and including
    /// `queue_id` is superseded and marked finished.
    pub fn dequeue_confirmed(&self, queue_id: i64, object_id: &str, table_name: &str) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE upload_queue SET state = ?1
             WHERE id <= ?2 AND object_id = ?3 AND table_name = ?4",
            params![UploadState::Finish.as_i64(), queue_id, object_id, table_name],
        )?;
        Ok(changed)
    }

    /// Confirm a tombstone: the object is gone remotely, so its whole log
    /// history is dropped outright.
    pub fn dequeue_tombstoned(&self, object_id: &str, table_name: &str) -> Result<usize> {
        let changed = self.conn.execute(
            "DELETE FROM upload_queue WHERE object_id = ?1 AND table_name = ?2",
            params![object_id, table_name],
        )?;
        Ok(changed)
    }

    /// Record a structural failure and return the entry to pending so the
    /// next cycle retries it.
    pub fn mark_failed(&self, id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE upload_queue SET fail_count = fail_count + 1, state = ?1 WHERE id = ?2",
            params![UploadState::Pending.as_i64(), id],
        )?;
        Ok(())
    }

    /// Crash recovery on open: anything left uploading or failed becomes
    /// pending again. Delivery is at-least-once; the remote dedupes by
    /// record name.
    pub fn reset_in_flight(&self) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE upload_queue SET state = ?1 WHERE state IN (?2, ?3)",
            params![
                UploadState::Pending.as_i64(),
                UploadState::Uploading.as_i64(),
                UploadState::Failed.as_i64(),
            ],
        )?;
        Ok(changed)
    }

    /// Drop finished entries, entries past the failure ceiling, and entries
    /// older than `cutoff_ms`.
    pub fn purge(&self, cutoff_ms: i64) -> Result<usize> {
        let changed = self.conn.execute(
            "DELETE FROM upload_queue
             WHERE state = ?1 OR fail_count >= ?2 OR modified < ?3",
            params![UploadState::Finish.as_i64(), FAIL_COUNT_CEILING, cutoff_ms],
        )?;
        Ok(changed)
    }

    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM upload_queue", [])?;
        Ok(())
    }

    pub fn count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM upload_queue", [], |row| row.get(0))?;
        Ok(count)
    }
}
