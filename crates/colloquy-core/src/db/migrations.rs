//! Database migrations

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
const CURRENT_VERSION: i64 = 2;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;
    if version >= CURRENT_VERSION {
        return Ok(());
    }

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i64> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(0);
    }

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Migration to version 1: entity tables and settings.
///
/// Every synced table shares the same shape: identity and sync columns for
/// SQL-level filtering plus the full object serialized in `data`. One
/// generic repository then covers all of them.
fn migrate_v1(conn: &Connection) -> Result<()> {
    let entity_tables = [
        "conversation",
        "message",
        "attachment",
        "memory",
        "cloud_model",
        "mcp_server",
    ];

    let mut sql = String::from(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    );
    for table in entity_tables {
        sql.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                object_id TEXT PRIMARY KEY,
                device_id TEXT NOT NULL,
                creation INTEGER NOT NULL,
                modified INTEGER NOT NULL,
                removed INTEGER NOT NULL DEFAULT 0,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_modified ON {table}(modified);
            CREATE INDEX IF NOT EXISTS idx_{table}_removed ON {table}(removed);"
        ));
    }
    sql.push_str(
        "INSERT INTO schema_version (version) VALUES (1);
        COMMIT;",
    );

    conn.execute_batch(&sql)?;
    Ok(())
}

/// Migration to version 2: the upload queue.
///
/// `id` is assigned by the queue repository as max + 1 inside the enqueue
/// transaction, so no AUTOINCREMENT.
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS upload_queue (
            id INTEGER PRIMARY KEY,
            table_name TEXT NOT NULL,
            object_id TEXT NOT NULL,
            device_id TEXT NOT NULL,
            creation INTEGER NOT NULL,
            modified INTEGER NOT NULL,
            changes INTEGER NOT NULL,
            state INTEGER NOT NULL DEFAULT 0,
            fail_count INTEGER NOT NULL DEFAULT 0,
            payload BLOB NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_upload_queue_state ON upload_queue(state);
        CREATE INDEX IF NOT EXISTS idx_upload_queue_object ON upload_queue(object_id, table_name);
        CREATE INDEX IF NOT EXISTS idx_upload_queue_creation ON upload_queue(creation);
        INSERT INTO schema_version (version) VALUES (2);
        COMMIT;",
    )?;
    Ok(())
}
