//! Generic repository over synced entity tables.
//!
//! All entity tables share one shape (identity and sync columns plus the
//! serialized object in `data`), so a single repository parameterized over
//! the model covers every table. The sync columns are authoritative when
//! they disagree with the serialized snapshot, which happens after a
//! column-only tombstone update.

use std::marker::PhantomData;

use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use crate::error::Result;
use crate::sync::syncable::Syncable;

pub struct SyncableRepository<'a, T> {
    conn: &'a Connection,
    _marker: PhantomData<T>,
}

impl<'a, T: Syncable> SyncableRepository<'a, T> {
    #[must_use]
    pub const fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            _marker: PhantomData,
        }
    }

    fn decode_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, i64, bool)> {
        Ok((
            row.get("data")?,
            row.get("device_id")?,
            row.get("modified")?,
            row.get("removed")?,
        ))
    }

    fn hydrate(raw: (String, String, i64, bool)) -> Result<T> {
        let (data, device_id, modified, removed) = raw;
        let mut object: T = serde_json::from_str(&data)?;
        object.set_device_id(&device_id);
        object.set_modified(modified);
        object.set_removed(removed);
        Ok(object)
    }

    /// Fetch one row by object id, tombstones included.
    pub fn get(&self, object_id: &str) -> Result<Option<T>> {
        let sql = format!(
            "SELECT data, device_id, modified, removed FROM {} WHERE object_id = ?1",
            T::TABLE
        );
        let raw = self
            .conn
            .query_row(&sql, params![object_id], Self::decode_row)
            .optional()?;
        raw.map(Self::hydrate).transpose()
    }

    /// Fetch the rows for the given object ids, tombstones included.
    pub fn get_by_ids(&self, object_ids: &[&str]) -> Result<Vec<T>> {
        if object_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; object_ids.len()].join(", ");
        let sql = format!(
            "SELECT data, device_id, modified, removed FROM {} WHERE object_id IN ({placeholders})",
            T::TABLE
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(object_ids.iter()), Self::decode_row)?;
        let mut objects = Vec::new();
        for raw in rows {
            objects.push(Self::hydrate(raw?)?);
        }
        Ok(objects)
    }

    /// All live rows ordered by ascending `modified`.
    pub fn list_live(&self) -> Result<Vec<T>> {
        let sql = format!(
            "SELECT data, device_id, modified, removed FROM {} WHERE removed = 0 ORDER BY modified ASC",
            T::TABLE
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::decode_row)?;
        let mut objects = Vec::new();
        for raw in rows {
            objects.push(Self::hydrate(raw?)?);
        }
        Ok(objects)
    }

    /// Live rows that never entered the upload queue, ordered by ascending
    /// `modified`. Used to stage data that predates sync into the log.
    pub fn list_unstaged(&self) -> Result<Vec<T>> {
        let sql = format!(
            "SELECT data, device_id, modified, removed FROM {table}
             WHERE removed = 0 AND object_id NOT IN (
                 SELECT object_id FROM upload_queue WHERE table_name = '{table}'
             )
             ORDER BY modified ASC",
            table = T::TABLE
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::decode_row)?;
        let mut objects = Vec::new();
        for raw in rows {
            objects.push(Self::hydrate(raw?)?);
        }
        Ok(objects)
    }

    /// Insert or replace one row with the object's current state.
    pub fn upsert(&self, object: &T) -> Result<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO {} (object_id, device_id, creation, modified, removed, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            T::TABLE
        );
        self.conn.execute(
            &sql,
            params![
                object.object_id(),
                object.device_id(),
                object.creation(),
                object.modified(),
                object.removed(),
                serde_json::to_string(object)?,
            ],
        )?;
        Ok(())
    }

    pub fn upsert_all(&self, objects: &[T]) -> Result<()> {
        for object in objects {
            self.upsert(object)?;
        }
        Ok(())
    }

    /// Tombstone an existing row in place. Unknown objects are left alone;
    /// there is nothing to delete and no snapshot to store. The device is
    /// optional because feed-level deletions carry no authorship.
    pub fn tombstone(&self, object_id: &str, device_id: Option<&str>, modified: i64) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET removed = 1, device_id = COALESCE(?2, device_id),
                 modified = MAX(modified, ?3)
             WHERE object_id = ?1",
            T::TABLE
        );
        let changed = self.conn.execute(&sql, params![object_id, device_id, modified])?;
        Ok(changed > 0)
    }

    /// Drop tombstones older than `cutoff_ms`. Returns the purged count.
    pub fn purge_removed_before(&self, cutoff_ms: i64) -> Result<usize> {
        let sql = format!(
            "DELETE FROM {} WHERE removed = 1 AND modified < ?1",
            T::TABLE
        );
        Ok(self.conn.execute(&sql, params![cutoff_ms])?)
    }

    /// Delete every row. Used when the remote zone is gone and local state
    /// must be rebuilt from the feed.
    pub fn clear(&self) -> Result<()> {
        self.conn
            .execute(&format!("DELETE FROM {}", T::TABLE), [])?;
        Ok(())
    }

    pub fn count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", T::TABLE), [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }
}
