//! Sync orchestrator.
//!
//! The engine is the only component that talks to the remote store. One
//! cycle runs at a time: account check, zone ensure, send the pending log,
//! then fetch and apply remote changes. Local enqueues are debounced into
//! a single cycle by [`SyncEngine::run`].
//!
//! The connection guard is never held across an await; every database
//! batch completes before the next remote call starts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::Notify;

use crate::db::{Database, SettingsRepository, SyncableRepository, UploadQueueRepository};
use crate::error::Result;
use crate::models::{
    Attachment, ChangeKind, CloudModel, Conversation, McpServer, Memory, Message, UploadEntry,
    UploadState,
};
use crate::sync::diff::diff;
use crate::sync::preferences::{SyncGroup, SyncPreferences};
use crate::sync::record_id::{decode_save, decode_tombstone, encode_save, encode_tombstone};
use crate::sync::remote::{
    AccountStatus, FetchPage, RemoteError, RemoteRecord, RemoteStore, ZONE_NAME,
};
use crate::sync::syncable::Syncable;
use crate::util::now_ms;

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum log entries per send batch
    pub batch_size: usize,
    /// Quiet window after a local enqueue before a cycle starts
    pub debounce: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            debounce: Duration::from_secs(5),
        }
    }
}

/// What one cycle accomplished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Account status observed at cycle start
    pub account: Option<AccountStatus>,
    /// Saves confirmed by the remote
    pub confirmed_saves: usize,
    /// Deletes confirmed by the remote
    pub confirmed_deletes: usize,
    /// Fetched records applied locally
    pub applied: usize,
    /// Fetched deletions applied locally
    pub removed: usize,
    /// Change feed pages processed
    pub pages: usize,
}

pub struct SyncEngine<R: RemoteStore> {
    db: Database,
    remote: R,
    config: SyncConfig,
    cycle: tokio::sync::Mutex<()>,
    zone_ready: AtomicBool,
    cancelled: AtomicBool,
    notify: Notify,
}

impl<R: RemoteStore> SyncEngine<R> {
    #[must_use]
    pub fn new(db: Database, remote: R) -> Self {
        Self::with_config(db, remote, SyncConfig::default())
    }

    #[must_use]
    pub fn with_config(db: Database, remote: R, config: SyncConfig) -> Self {
        Self {
            db,
            remote,
            config,
            cycle: tokio::sync::Mutex::new(()),
            zone_ready: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    #[must_use]
    pub const fn db(&self) -> &Database {
        &self.db
    }

    /// Record a local change: the entity write and its log entry commit in
    /// one transaction, then a debounced cycle is scheduled. A failure here
    /// means neither happened, so no sync debt is incurred.
    pub fn enqueue_local_change<T: Syncable>(
        &self,
        object: &mut T,
        changes: ChangeKind,
    ) -> Result<i64> {
        if object.device_id().is_empty() {
            object.set_device_id(self.db.device_id());
        }
        if changes == ChangeKind::Delete {
            object.set_removed(true);
        }
        let entry = UploadEntry::from_source(object, changes)?;

        let id = {
            let mut conn = self.db.lock();
            let tx = conn.transaction()?;
            SyncableRepository::<T>::new(&tx).upsert(object)?;
            let id = UploadQueueRepository::new(&tx).enqueue(&entry)?;
            tx.commit()?;
            id
        };
        self.notify.notify_one();
        Ok(id)
    }

    /// Schedule a cycle without waiting for the debounce trigger.
    pub fn request_sync(&self) {
        self.notify.notify_one();
    }

    /// Stop the engine. The running cycle finishes its current batch and
    /// [`SyncEngine::run`] returns; committed progress is kept.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_group_enabled(&self, group: SyncGroup) -> Result<bool> {
        let conn = self.db.lock();
        Ok(SyncPreferences::load(&conn)?.is_enabled(group))
    }

    pub fn set_group_enabled(&self, group: SyncGroup, enabled: bool) -> Result<()> {
        let conn = self.db.lock();
        SyncPreferences::set_enabled(&conn, group, enabled)
    }

    /// Debounce loop. The caller spawns this; it returns after
    /// [`SyncEngine::cancel`].
    pub async fn run(&self) {
        loop {
            self.notify.notified().await;
            if self.is_cancelled() {
                break;
            }
            tokio::time::sleep(self.config.debounce).await;
            if self.is_cancelled() {
                break;
            }
            if let Err(error) = self.sync_now().await {
                tracing::warn!(%error, "sync cycle failed");
            }
        }
    }

    /// Run one full cycle. Serialized; a concurrent call waits its turn.
    pub async fn sync_now(&self) -> Result<SyncSummary> {
        let _guard = self.cycle.lock().await;
        let mut summary = SyncSummary::default();

        let status = match self.remote.account_status().await {
            Ok(status) => status,
            Err(error) if error.is_transient() => {
                tracing::debug!(%error, "account status unavailable, skipping cycle");
                return Ok(summary);
            }
            Err(error) => return Err(error.into()),
        };
        summary.account = Some(status);
        if status != AccountStatus::Available {
            tracing::info!(?status, "sync degraded, account not available");
            return Ok(summary);
        }

        match self.ensure_zone().await {
            Ok(()) => {}
            Err(error) if error.is_transient() => {
                tracing::debug!(%error, "zone check unavailable, skipping cycle");
                return Ok(summary);
            }
            Err(error) => return Err(error.into()),
        }

        self.backfill_if_needed()?;
        self.send_phase(&mut summary).await?;
        self.fetch_phase(&mut summary).await?;
        Ok(summary)
    }

    async fn ensure_zone(&self) -> std::result::Result<(), RemoteError> {
        if self.zone_ready.load(Ordering::SeqCst) {
            return Ok(());
        }
        let zones = self.remote.list_zones().await?;
        if !zones.iter().any(|zone| zone == ZONE_NAME) {
            tracing::info!(zone = ZONE_NAME, "creating remote zone");
            self.remote.create_zone(ZONE_NAME).await?;
        }
        self.zone_ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// First-use staging: every live row enters the log as an insert, in
    /// ascending `modified` order, so a fresh account receives existing
    /// data. Also runs again after the zone was lost and recreated.
    fn backfill_if_needed(&self) -> Result<usize> {
        let device_id = self.db.device_id().to_string();
        let mut conn = self.db.lock();
        if SettingsRepository::new(&conn).backfill_done()? {
            return Ok(0);
        }

        let tx = conn.transaction()?;
        let mut entries = Vec::new();
        collect_backfill::<Conversation>(&tx, &device_id, &mut entries)?;
        collect_backfill::<Message>(&tx, &device_id, &mut entries)?;
        collect_backfill::<Attachment>(&tx, &device_id, &mut entries)?;
        collect_backfill::<Memory>(&tx, &device_id, &mut entries)?;
        collect_backfill::<CloudModel>(&tx, &device_id, &mut entries)?;
        collect_backfill::<McpServer>(&tx, &device_id, &mut entries)?;
        entries.sort_by_key(|entry| entry.modified);

        let queue = UploadQueueRepository::new(&tx);
        for entry in &entries {
            queue.enqueue(entry)?;
        }
        SettingsRepository::new(&tx).set_backfill_done()?;
        tx.commit()?;

        if !entries.is_empty() {
            tracing::info!(count = entries.len(), "staged existing data for upload");
        }
        Ok(entries.len())
    }

    async fn send_phase(&self, summary: &mut SyncSummary) -> Result<()> {
        let mut zone_recreated = false;
        loop {
            if self.is_cancelled() {
                return Ok(());
            }

            let batch = {
                let conn = self.db.lock();
                let enabled = SyncPreferences::load(&conn)?.enabled_tables();
                let queue = UploadQueueRepository::new(&conn);
                let batch = queue.pending_batch(self.config.batch_size, &enabled)?;
                let ids: Vec<i64> = batch.iter().map(|entry| entry.id).collect();
                queue.set_state(&ids, UploadState::Uploading)?;
                batch
            };
            if batch.is_empty() {
                return Ok(());
            }
            let batch_ids: Vec<i64> = batch.iter().map(|entry| entry.id).collect();

            let mut saves = Vec::new();
            let mut deletes = Vec::new();
            let mut delete_ids: HashMap<String, i64> = HashMap::new();
            for entry in &batch {
                if entry.changes == ChangeKind::Delete {
                    let name = encode_tombstone(&entry.object_id, &entry.table_name);
                    delete_ids.insert(name.clone(), entry.id);
                    deletes.push(name);
                } else {
                    saves.push(RemoteRecord {
                        name: encode_save(entry.id, &entry.object_id, &entry.device_id),
                        table_name: entry.table_name.clone(),
                        created_by_device: entry.device_id.clone(),
                        modified_by_device: entry.device_id.clone(),
                        modified_ms: entry.modified,
                        payload: entry.payload.clone(),
                        change_tag: None,
                    });
                }
            }

            let outcome = match self.remote.modify_records(ZONE_NAME, saves, deletes).await {
                Ok(outcome) => outcome,
                Err(RemoteError::ZoneNotFound) if !zone_recreated => {
                    zone_recreated = true;
                    self.return_to_pending(&batch_ids)?;
                    self.zone_ready.store(false, Ordering::SeqCst);
                    match self.ensure_zone().await {
                        Ok(()) => continue,
                        Err(error) if error.is_transient() => return Ok(()),
                        Err(error) => return Err(error.into()),
                    }
                }
                Err(error) if error.is_transient() => {
                    tracing::debug!(%error, "send unavailable, will retry next cycle");
                    self.return_to_pending(&batch_ids)?;
                    return Ok(());
                }
                Err(error) => {
                    self.return_to_pending(&batch_ids)?;
                    return Err(error.into());
                }
            };

            let lost_zone = self.interpret_send_outcome(&batch, &delete_ids, outcome, summary)?;
            if lost_zone {
                self.zone_ready.store(false, Ordering::SeqCst);
                if zone_recreated {
                    return Ok(());
                }
                zone_recreated = true;
                match self.ensure_zone().await {
                    Ok(()) => {}
                    Err(error) if error.is_transient() => return Ok(()),
                    Err(error) => return Err(error.into()),
                }
            }
        }
    }

    fn return_to_pending(&self, ids: &[i64]) -> Result<()> {
        let conn = self.db.lock();
        UploadQueueRepository::new(&conn).set_state(ids, UploadState::Pending)
    }

    /// Per-record interpretation of a modify batch. Returns whether the
    /// zone turned out to be missing.
    fn interpret_send_outcome(
        &self,
        batch: &[UploadEntry],
        delete_ids: &HashMap<String, i64>,
        outcome: crate::sync::remote::ModifyOutcome,
        summary: &mut SyncSummary,
    ) -> Result<bool> {
        let by_id: HashMap<i64, &UploadEntry> =
            batch.iter().map(|entry| (entry.id, entry)).collect();
        let mut lost_zone = false;

        let conn = self.db.lock();
        let queue = UploadQueueRepository::new(&conn);

        for (name, result) in outcome.saved {
            let Some((queue_id, object_id, _)) = decode_save(&name) else {
                tracing::warn!(%name, "save result for undecodable record name");
                continue;
            };
            let Some(entry) = by_id.get(&queue_id) else {
                continue;
            };
            match result {
                Ok(_) => {
                    queue.dequeue_confirmed(queue_id, &object_id, &entry.table_name)?;
                    summary.confirmed_saves += 1;
                }
                Err(RemoteError::Conflict { .. }) => {
                    // Server holds a newer version; the next fetch brings
                    // it in and the diff engine reconciles.
                    tracing::debug!(%name, "dropping stale save after conflict");
                    queue.dequeue_confirmed(queue_id, &object_id, &entry.table_name)?;
                }
                Err(RemoteError::ZoneNotFound) => {
                    queue.set_state(&[queue_id], UploadState::Pending)?;
                    lost_zone = true;
                }
                Err(RemoteError::UnknownItem) => {
                    // Re-stage once more; the fail counter bounds the loop.
                    queue.mark_failed(queue_id)?;
                }
                Err(error) if error.is_transient() => {
                    queue.set_state(&[queue_id], UploadState::Pending)?;
                }
                Err(error) => {
                    tracing::error!(%name, %error, "record save failed");
                    queue.mark_failed(queue_id)?;
                }
            }
        }

        for (name, result) in outcome.deleted {
            let Some((object_id, table_name)) = decode_tombstone(&name) else {
                tracing::warn!(%name, "delete result for undecodable record name");
                continue;
            };
            match result {
                // A delete target already gone is as deleted as it gets.
                Ok(()) | Err(RemoteError::UnknownItem) => {
                    queue.dequeue_tombstoned(&object_id, &table_name)?;
                    summary.confirmed_deletes += 1;
                }
                Err(RemoteError::ZoneNotFound) => {
                    if let Some(id) = delete_ids.get(&name) {
                        queue.set_state(&[*id], UploadState::Pending)?;
                    }
                    lost_zone = true;
                }
                Err(error) if error.is_transient() => {
                    if let Some(id) = delete_ids.get(&name) {
                        queue.set_state(&[*id], UploadState::Pending)?;
                    }
                }
                Err(error) => {
                    tracing::error!(%name, %error, "record delete failed");
                    if let Some(id) = delete_ids.get(&name) {
                        queue.mark_failed(*id)?;
                    }
                }
            }
        }

        Ok(lost_zone)
    }

    async fn fetch_phase(&self, summary: &mut SyncSummary) -> Result<()> {
        loop {
            if self.is_cancelled() {
                return Ok(());
            }

            let cursor = {
                let conn = self.db.lock();
                SettingsRepository::new(&conn).sync_cursor()?
            };
            let page = match self.remote.fetch_changes(ZONE_NAME, cursor.as_deref()).await {
                Ok(page) => page,
                Err(RemoteError::ZoneNotFound) => {
                    self.handle_zone_lost()?;
                    return Ok(());
                }
                Err(error) if error.is_transient() => {
                    tracing::debug!(%error, "fetch unavailable, will retry next cycle");
                    return Ok(());
                }
                Err(error) => return Err(error.into()),
            };

            if !page.zone_deletions.is_empty() {
                tracing::warn!(
                    reasons = ?page.zone_deletions,
                    "remote zone deleted, resetting local synced state"
                );
                self.zone_ready.store(false, Ordering::SeqCst);
                self.db.reset_synced_state()?;
                let conn = self.db.lock();
                let settings = SettingsRepository::new(&conn);
                settings.clear_backfill_done()?;
                if let Some(next) = &page.cursor {
                    settings.set_sync_cursor(next)?;
                }
                return Ok(());
            }

            let more = page.more;
            self.apply_page(page, summary)?;
            summary.pages += 1;
            if !more {
                return Ok(());
            }
        }
    }

    /// After a `zoneNotFound` the zone is recreated on the next cycle and
    /// all data re-staged for resend.
    fn handle_zone_lost(&self) -> Result<()> {
        tracing::warn!("remote zone missing, staging full resend");
        self.zone_ready.store(false, Ordering::SeqCst);
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        // Dropping the log is safe: backfill restages every live row once
        // the zone is back.
        UploadQueueRepository::new(&tx).clear()?;
        let settings = SettingsRepository::new(&tx);
        settings.clear_sync_cursor()?;
        settings.clear_backfill_done()?;
        tx.commit()?;
        Ok(())
    }

    /// Apply one fetched page in a single local transaction.
    fn apply_page(&self, page: FetchPage, summary: &mut SyncSummary) -> Result<()> {
        let device_id = self.db.device_id().to_string();
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        let prefs = SyncPreferences::load(&tx)?;
        {
            let queue = UploadQueueRepository::new(&tx);

            for record in &page.modifications {
                let Some((queue_id, object_id, record_device)) = decode_save(&record.name) else {
                    tracing::warn!(name = %record.name, "skipping undecodable record name");
                    continue;
                };
                if record_device == device_id {
                    // Echo: our own write came back; stop waiting on it.
                    queue.dequeue_confirmed(queue_id, &object_id, &record.table_name)?;
                    continue;
                }
                if !prefs.allows_table(&record.table_name) {
                    continue;
                }
                if apply_modification(&tx, record)? {
                    summary.applied += 1;
                }
            }

            for name in &page.deletions {
                let Some((object_id, table_name)) = decode_tombstone(name) else {
                    tracing::warn!(%name, "skipping undecodable deletion name");
                    continue;
                };
                if !prefs.allows_table(&table_name) {
                    continue;
                }
                if tombstone_local(&tx, &object_id, &table_name)? {
                    summary.removed += 1;
                }
                // The server considers the object gone; never re-send for it.
                queue.dequeue_tombstoned(&object_id, &table_name)?;
            }

            if let Some(cursor) = &page.cursor {
                SettingsRepository::new(&tx).set_sync_cursor(cursor)?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn collect_backfill<T: Syncable>(
    conn: &Connection,
    device_id: &str,
    out: &mut Vec<UploadEntry>,
) -> Result<()> {
    let repo = SyncableRepository::<T>::new(conn);
    for mut object in repo.list_unstaged()? {
        if object.device_id().is_empty() {
            object.set_device_id(device_id);
            repo.upsert(&object)?;
        }
        out.push(UploadEntry::from_source(&object, ChangeKind::Insert)?);
    }
    Ok(())
}

fn apply_modification(conn: &Connection, record: &RemoteRecord) -> Result<bool> {
    match record.table_name.as_str() {
        Conversation::TABLE => apply_saved::<Conversation>(conn, record),
        Message::TABLE => apply_saved::<Message>(conn, record),
        Attachment::TABLE => apply_saved::<Attachment>(conn, record),
        Memory::TABLE => apply_saved::<Memory>(conn, record),
        CloudModel::TABLE => apply_saved::<CloudModel>(conn, record),
        McpServer::TABLE => apply_saved::<McpServer>(conn, record),
        other => {
            tracing::warn!(table = other, "skipping record for unknown table");
            Ok(false)
        }
    }
}

fn apply_saved<T: Syncable>(conn: &Connection, record: &RemoteRecord) -> Result<bool> {
    let mut candidate = match T::decode_payload(&record.payload) {
        Ok(candidate) => candidate,
        Err(error) => {
            // One bad record never aborts the batch.
            tracing::warn!(name = %record.name, %error, "skipping undecodable payload");
            return Ok(false);
        }
    };
    if candidate.device_id().is_empty() {
        candidate.set_device_id(&record.modified_by_device);
    }
    if candidate.modified() == 0 {
        candidate.set_modified(record.modified_ms);
    }

    let repo = SyncableRepository::<T>::new(conn);
    let local: Vec<T> = repo.get(candidate.object_id())?.into_iter().collect();
    let classified = diff(vec![candidate], &local);
    if classified.is_empty() {
        return Ok(false);
    }
    repo.upsert_all(&classified.insert)?;
    repo.upsert_all(&classified.update)?;
    for tombstone in &classified.delete {
        repo.tombstone(
            tombstone.object_id(),
            Some(tombstone.device_id()),
            tombstone.modified(),
        )?;
    }
    Ok(true)
}

fn tombstone_local(conn: &Connection, object_id: &str, table_name: &str) -> Result<bool> {
    let modified = now_ms();
    match table_name {
        Conversation::TABLE => {
            SyncableRepository::<Conversation>::new(conn).tombstone(object_id, None, modified)
        }
        Message::TABLE => {
            SyncableRepository::<Message>::new(conn).tombstone(object_id, None, modified)
        }
        Attachment::TABLE => {
            SyncableRepository::<Attachment>::new(conn).tombstone(object_id, None, modified)
        }
        Memory::TABLE => {
            SyncableRepository::<Memory>::new(conn).tombstone(object_id, None, modified)
        }
        CloudModel::TABLE => {
            SyncableRepository::<CloudModel>::new(conn).tombstone(object_id, None, modified)
        }
        McpServer::TABLE => {
            SyncableRepository::<McpServer>::new(conn).tombstone(object_id, None, modified)
        }
        other => {
            tracing::warn!(table = other, "skipping deletion for unknown table");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Memory;
    use crate::sync::remote::{MemoryRemoteStore, RemoteOp, ZoneDeletionReason};
    use pretty_assertions::assert_eq;

    fn engine_with(remote: &MemoryRemoteStore) -> SyncEngine<MemoryRemoteStore> {
        let db = Database::open_in_memory().unwrap();
        SyncEngine::new(db, remote.clone())
    }

    fn queue_entries(engine: &SyncEngine<MemoryRemoteStore>) -> Vec<UploadEntry> {
        let conn = engine.db().lock();
        UploadQueueRepository::new(&conn).list_all().unwrap()
    }

    fn local_memory(engine: &SyncEngine<MemoryRemoteStore>, object_id: &str) -> Option<Memory> {
        let conn = engine.db().lock();
        SyncableRepository::<Memory>::new(&conn).get(object_id).unwrap()
    }

    fn save_name_for(engine: &SyncEngine<MemoryRemoteStore>, id: i64, object_id: &str) -> String {
        encode_save(id, object_id, engine.db().device_id())
    }

    fn record_from(memory: &Memory, queue_id: i64) -> RemoteRecord {
        RemoteRecord {
            name: encode_save(queue_id, &memory.object_id, &memory.device_id),
            table_name: Memory::TABLE.to_string(),
            created_by_device: memory.device_id.clone(),
            modified_by_device: memory.device_id.clone(),
            modified_ms: memory.modified,
            payload: memory.encode_payload().unwrap(),
            change_tag: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_push_confirms_and_dequeues() {
        let remote = MemoryRemoteStore::new();
        let engine = engine_with(&remote);

        let mut memory = Memory::new("note");
        let id = engine
            .enqueue_local_change(&mut memory, ChangeKind::Insert)
            .unwrap();

        let summary = engine.sync_now().await.unwrap();
        assert_eq!(summary.confirmed_saves, 1);
        assert_eq!(summary.applied, 0);
        assert_eq!(remote.record_count(ZONE_NAME), 1);

        let entries = queue_entries(&engine);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);
        assert_eq!(entries[0].state, UploadState::Finish);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_replicates_between_devices() {
        let remote = MemoryRemoteStore::new();
        let first = engine_with(&remote);
        let second = engine_with(&remote);

        let mut conversation = Conversation::new("hello");
        first
            .enqueue_local_change(&mut conversation, ChangeKind::Insert)
            .unwrap();
        first.sync_now().await.unwrap();

        let summary = second.sync_now().await.unwrap();
        assert_eq!(summary.applied, 1);

        let conn = second.db().lock();
        let loaded = SyncableRepository::<Conversation>::new(&conn)
            .get(&conversation.object_id)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.title, "hello");
        assert_eq!(loaded.device_id, first.db().device_id());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remote_tombstone_applies_locally() {
        let remote = MemoryRemoteStore::new();
        let first = engine_with(&remote);
        let second = engine_with(&remote);

        let mut memory = Memory::new("shared");
        first
            .enqueue_local_change(&mut memory, ChangeKind::Insert)
            .unwrap();
        first.sync_now().await.unwrap();
        second.sync_now().await.unwrap();

        let mut copy = local_memory(&second, &memory.object_id).unwrap();
        copy.touch();
        second
            .enqueue_local_change(&mut copy, ChangeKind::Delete)
            .unwrap();
        second.sync_now().await.unwrap();

        first.sync_now().await.unwrap();
        let row = local_memory(&first, &memory.object_id).unwrap();
        assert!(row.removed);
        // Nothing left pending for the dead object.
        assert!(
            queue_entries(&first)
                .iter()
                .all(|entry| entry.state != UploadState::Pending)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_echo_suppression_skips_apply() {
        let remote = MemoryRemoteStore::new();
        let engine = engine_with(&remote);

        let mut memory = Memory::new("mine");
        let id = engine
            .enqueue_local_change(&mut memory, ChangeKind::Insert)
            .unwrap();

        // The record already reached the remote (say, a previous process
        // crashed after upload but before confirmation).
        remote.create_zone(ZONE_NAME).await.unwrap();
        memory.set_device_id(engine.db().device_id());
        remote
            .modify_records(ZONE_NAME, vec![record_from(&memory, id)], vec![])
            .await
            .unwrap();
        remote.inject_call_error(RemoteOp::Modify, RemoteError::NetworkUnavailable);

        let summary = engine.sync_now().await.unwrap();
        assert_eq!(summary.applied, 0);
        assert_eq!(queue_entries(&engine)[0].state, UploadState::Finish);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_wins_update_then_tombstone() {
        let remote = MemoryRemoteStore::new();
        let engine = engine_with(&remote);

        let mut memory = Memory::new("original");
        memory.modified = now_ms() - 60_000;
        engine
            .enqueue_local_change(&mut memory, ChangeKind::Insert)
            .unwrap();
        engine.sync_now().await.unwrap();

        let mut update = memory.clone();
        update.device_id = "other-device".to_string();
        update.content = "updated".to_string();
        update.modified += 1;
        remote
            .modify_records(
                ZONE_NAME,
                vec![record_from(&update, 999)],
                vec![encode_tombstone(&memory.object_id, Memory::TABLE)],
            )
            .await
            .unwrap();

        engine.sync_now().await.unwrap();
        let row = local_memory(&engine, &memory.object_id).unwrap();
        assert!(row.removed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_wins_tombstone_then_update() {
        let remote = MemoryRemoteStore::new();
        let engine = engine_with(&remote);

        let mut memory = Memory::new("original");
        memory.modified = now_ms() - 60_000;
        engine
            .enqueue_local_change(&mut memory, ChangeKind::Insert)
            .unwrap();
        engine.sync_now().await.unwrap();

        remote
            .modify_records(
                ZONE_NAME,
                vec![],
                vec![encode_tombstone(&memory.object_id, Memory::TABLE)],
            )
            .await
            .unwrap();
        engine.sync_now().await.unwrap();
        assert!(local_memory(&engine, &memory.object_id).unwrap().removed);

        // A concurrent update stamped before the tombstone applied locally
        // must not resurrect the object.
        let mut update = memory.clone();
        update.device_id = "other-device".to_string();
        update.content = "updated".to_string();
        update.modified += 1;
        remote
            .modify_records(ZONE_NAME, vec![record_from(&update, 999)], vec![])
            .await
            .unwrap();

        engine.sync_now().await.unwrap();
        assert!(local_memory(&engine, &memory.object_id).unwrap().removed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_disabled_group_gates_send_and_apply() {
        let remote = MemoryRemoteStore::new();
        let engine = engine_with(&remote);
        engine.set_group_enabled(SyncGroup::Memory, false).unwrap();

        let mut memory = Memory::new("private");
        engine
            .enqueue_local_change(&mut memory, ChangeKind::Insert)
            .unwrap();

        // Inbound memory record from another device.
        let mut foreign = Memory::new("foreign");
        foreign.device_id = "other-device".to_string();
        engine.sync_now().await.unwrap();
        remote
            .modify_records(ZONE_NAME, vec![record_from(&foreign, 7)], vec![])
            .await
            .unwrap();

        let summary = engine.sync_now().await.unwrap();
        assert_eq!(remote.record_count(ZONE_NAME), 1);
        assert_eq!(summary.applied, 0);
        assert_eq!(local_memory(&engine, &foreign.object_id), None);
        assert_eq!(queue_entries(&engine)[0].state, UploadState::Pending);

        // Re-enabling lets the queued entry go out on the next cycle.
        engine.set_group_enabled(SyncGroup::Memory, true).unwrap();
        let summary = engine.sync_now().await.unwrap();
        assert_eq!(summary.confirmed_saves, 1);
        assert_eq!(remote.record_count(ZONE_NAME), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_conflict_drops_stale_attempt() {
        let remote = MemoryRemoteStore::new();
        let engine = engine_with(&remote);

        let mut memory = Memory::new("stale");
        let id = engine
            .enqueue_local_change(&mut memory, ChangeKind::Insert)
            .unwrap();
        remote.inject_record_error(
            save_name_for(&engine, id, &memory.object_id),
            RemoteError::Conflict { server: None },
        );

        let summary = engine.sync_now().await.unwrap();
        assert_eq!(summary.confirmed_saves, 0);
        assert_eq!(queue_entries(&engine)[0].state, UploadState::Finish);

        // Nothing is resent afterwards.
        let summary = engine.sync_now().await.unwrap();
        assert_eq!(summary.confirmed_saves, 0);
        assert_eq!(remote.record_count(ZONE_NAME), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_zone_not_found_recreates_and_resends() {
        let remote = MemoryRemoteStore::new();
        let engine = engine_with(&remote);
        engine.sync_now().await.unwrap();

        let mut memory = Memory::new("retry me");
        engine
            .enqueue_local_change(&mut memory, ChangeKind::Insert)
            .unwrap();
        remote.inject_call_error(RemoteOp::Modify, RemoteError::ZoneNotFound);

        let summary = engine.sync_now().await.unwrap();
        assert_eq!(summary.confirmed_saves, 1);
        assert!(remote.zone_exists(ZONE_NAME));
        assert_eq!(remote.record_count(ZONE_NAME), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_transient_error_leaves_entry_pending() {
        let remote = MemoryRemoteStore::new();
        let engine = engine_with(&remote);

        let mut memory = Memory::new("later");
        engine
            .enqueue_local_change(&mut memory, ChangeKind::Insert)
            .unwrap();
        remote.inject_call_error(RemoteOp::Modify, RemoteError::NetworkUnavailable);

        engine.sync_now().await.unwrap();
        let entry = &queue_entries(&engine)[0];
        assert_eq!(entry.state, UploadState::Pending);
        assert_eq!(entry.fail_count, 0);
        assert_eq!(remote.record_count(ZONE_NAME), 0);

        let summary = engine.sync_now().await.unwrap();
        assert_eq!(summary.confirmed_saves, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_item_on_save_is_restaged() {
        let remote = MemoryRemoteStore::new();
        let engine = engine_with(&remote);

        let mut memory = Memory::new("flaky");
        let id = engine
            .enqueue_local_change(&mut memory, ChangeKind::Insert)
            .unwrap();
        remote.inject_record_error(
            save_name_for(&engine, id, &memory.object_id),
            RemoteError::UnknownItem,
        );

        engine.sync_now().await.unwrap();
        let entry = &queue_entries(&engine)[0];
        assert_eq!(entry.state, UploadState::Pending);
        assert_eq!(entry.fail_count, 1);

        let summary = engine.sync_now().await.unwrap();
        assert_eq!(summary.confirmed_saves, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_zone_deletion_resets_local_state() {
        let remote = MemoryRemoteStore::new();
        let engine = engine_with(&remote);

        let mut memory = Memory::new("doomed");
        engine
            .enqueue_local_change(&mut memory, ChangeKind::Insert)
            .unwrap();
        engine.sync_now().await.unwrap();

        remote.delete_zone(ZONE_NAME, ZoneDeletionReason::Purged);
        engine.sync_now().await.unwrap();

        assert_eq!(local_memory(&engine, &memory.object_id), None);
        assert!(queue_entries(&engine).is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_account_unavailable_skips_cycle() {
        let remote = MemoryRemoteStore::new();
        let engine = engine_with(&remote);
        remote.set_account_status(AccountStatus::NoAccount);

        let mut memory = Memory::new("waiting");
        engine
            .enqueue_local_change(&mut memory, ChangeKind::Insert)
            .unwrap();

        let summary = engine.sync_now().await.unwrap();
        assert_eq!(summary.account, Some(AccountStatus::NoAccount));
        assert!(!remote.zone_exists(ZONE_NAME));
        assert_eq!(queue_entries(&engine)[0].state, UploadState::Pending);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_idempotent_apply() {
        let remote = MemoryRemoteStore::new();
        let first = engine_with(&remote);
        let second = engine_with(&remote);

        let mut memory = Memory::new("once");
        first
            .enqueue_local_change(&mut memory, ChangeKind::Insert)
            .unwrap();
        first.sync_now().await.unwrap();
        assert_eq!(second.sync_now().await.unwrap().applied, 1);

        let before = local_memory(&second, &memory.object_id);
        // Rewind the cursor so the same page replays.
        {
            let conn = second.db().lock();
            SettingsRepository::new(&conn).set_sync_cursor("0").unwrap();
        }
        let summary = second.sync_now().await.unwrap();
        assert_eq!(summary.applied, 0);
        assert_eq!(local_memory(&second, &memory.object_id), before);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_backfill_stages_existing_rows() {
        let remote = MemoryRemoteStore::new();
        let db = Database::open_in_memory().unwrap();
        {
            let conn = db.lock();
            SyncableRepository::<Memory>::new(&conn)
                .upsert(&Memory::new("pre-existing"))
                .unwrap();
        }

        let engine = SyncEngine::new(db, remote.clone());
        let summary = engine.sync_now().await.unwrap();
        assert_eq!(summary.confirmed_saves, 1);
        assert_eq!(remote.record_count(ZONE_NAME), 1);

        // Only once.
        engine.sync_now().await.unwrap();
        assert_eq!(remote.record_count(ZONE_NAME), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_debounces_then_syncs() {
        let remote = MemoryRemoteStore::new();
        let db = Database::open_in_memory().unwrap();
        let engine = SyncEngine::with_config(
            db,
            remote.clone(),
            SyncConfig {
                batch_size: 100,
                debounce: Duration::from_millis(10),
            },
        );

        let mut memory = Memory::new("soon");
        engine
            .enqueue_local_change(&mut memory, ChangeKind::Insert)
            .unwrap();

        tokio::select! {
            () = engine.run() => {}
            () = tokio::time::sleep(Duration::from_secs(2)) => {}
        }
        assert_eq!(remote.record_count(ZONE_NAME), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_stops_run_loop() {
        let remote = MemoryRemoteStore::new();
        let engine = engine_with(&remote);
        engine.cancel();
        tokio::time::timeout(Duration::from_secs(1), engine.run())
            .await
            .expect("run should return after cancel");
    }
}
