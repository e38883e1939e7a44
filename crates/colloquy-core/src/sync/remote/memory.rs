//! In-memory remote store for deterministic tests.
//!
//! Replicates the real store's contract: per-record optimistic concurrency
//! via change tags, per-record typed errors, a resumable change feed, and
//! zone lifecycle. Error injection lets tests exercise every branch of the
//! engine's result interpretation without network access.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{
    AccountStatus, FetchPage, ModifyOutcome, RemoteError, RemoteRecord, RemoteStore,
    ZoneDeletionReason,
};

/// Change feed page size of the fake store.
const FETCH_PAGE_SIZE: usize = 50;

/// Remote operations that accept injected call-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    AccountStatus,
    ListZones,
    CreateZone,
    Modify,
    Fetch,
}

#[derive(Clone)]
enum FeedEvent {
    Saved(RemoteRecord),
    DeletedRecord(String),
    DeletedZone(ZoneDeletionReason),
}

#[derive(Default)]
struct ZoneState {
    records: BTreeMap<String, RemoteRecord>,
    feed: Vec<FeedEvent>,
}

struct State {
    account: AccountStatus,
    zones: HashMap<String, ZoneState>,
    next_tag: u64,
    call_errors: HashMap<RemoteOp, VecDeque<RemoteError>>,
    record_errors: HashMap<String, RemoteError>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            account: AccountStatus::Available,
            zones: HashMap::new(),
            next_tag: 0,
            call_errors: HashMap::new(),
            record_errors: HashMap::new(),
        }
    }
}

/// Shared-state fake; clones are handles onto the same store, so a test
/// can hold one handle while the engine owns another.
#[derive(Clone, Default)]
pub struct MemoryRemoteStore {
    state: Arc<Mutex<State>>,
}

impl MemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_call_error(state: &mut State, op: RemoteOp) -> Option<RemoteError> {
        state.call_errors.get_mut(&op).and_then(VecDeque::pop_front)
    }

    /// Set the reported account status.
    pub fn set_account_status(&self, status: AccountStatus) {
        self.state().account = status;
    }

    /// Fail the next call of `op` with `error`. Injections queue up and are
    /// consumed in order.
    pub fn inject_call_error(&self, op: RemoteOp, error: RemoteError) {
        self.state()
            .call_errors
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Fail the next save or delete of the named record with `error`.
    pub fn inject_record_error(&self, name: impl Into<String>, error: RemoteError) {
        self.state().record_errors.insert(name.into(), error);
    }

    /// Simulate a remote-side zone wipe: records vanish and the change feed
    /// reports a zone deletion.
    pub fn delete_zone(&self, zone: &str, reason: ZoneDeletionReason) {
        let mut state = self.state();
        if let Some(zone_state) = state.zones.get_mut(zone) {
            zone_state.records.clear();
            zone_state.feed.push(FeedEvent::DeletedZone(reason));
        }
    }

    /// Whether the zone exists.
    #[must_use]
    pub fn zone_exists(&self, zone: &str) -> bool {
        self.state().zones.contains_key(zone)
    }

    /// Look up a stored record by name.
    #[must_use]
    pub fn record(&self, zone: &str, name: &str) -> Option<RemoteRecord> {
        self.state()
            .zones
            .get(zone)
            .and_then(|z| z.records.get(name).cloned())
    }

    /// Number of stored records in the zone.
    #[must_use]
    pub fn record_count(&self, zone: &str) -> usize {
        self.state().zones.get(zone).map_or(0, |z| z.records.len())
    }

    /// All stored records in the zone, ordered by name.
    #[must_use]
    pub fn records(&self, zone: &str) -> Vec<RemoteRecord> {
        self.state()
            .zones
            .get(zone)
            .map_or_else(Vec::new, |z| z.records.values().cloned().collect())
    }
}

impl RemoteStore for MemoryRemoteStore {
    async fn account_status(&self) -> Result<AccountStatus, RemoteError> {
        let mut state = self.state();
        if let Some(error) = Self::take_call_error(&mut state, RemoteOp::AccountStatus) {
            return Err(error);
        }
        Ok(state.account)
    }

    async fn list_zones(&self) -> Result<Vec<String>, RemoteError> {
        let mut state = self.state();
        if let Some(error) = Self::take_call_error(&mut state, RemoteOp::ListZones) {
            return Err(error);
        }
        let mut zones: Vec<String> = state.zones.keys().cloned().collect();
        zones.sort();
        Ok(zones)
    }

    async fn create_zone(&self, zone: &str) -> Result<(), RemoteError> {
        let mut state = self.state();
        if let Some(error) = Self::take_call_error(&mut state, RemoteOp::CreateZone) {
            return Err(error);
        }
        state.zones.entry(zone.to_string()).or_default();
        Ok(())
    }

    async fn modify_records(
        &self,
        zone: &str,
        saves: Vec<RemoteRecord>,
        deletes: Vec<String>,
    ) -> Result<ModifyOutcome, RemoteError> {
        let mut state = self.state();
        if let Some(error) = Self::take_call_error(&mut state, RemoteOp::Modify) {
            return Err(error);
        }
        if !state.zones.contains_key(zone) {
            return Err(RemoteError::ZoneNotFound);
        }

        let mut outcome = ModifyOutcome::default();

        for mut record in saves {
            let name = record.name.clone();
            if let Some(error) = state.record_errors.remove(&name) {
                outcome.saved.push((name, Err(error)));
                continue;
            }
            if let Some(existing) = state
                .zones
                .get(zone)
                .and_then(|z| z.records.get(&name))
                .cloned()
            {
                if record.change_tag != existing.change_tag {
                    outcome.saved.push((
                        name,
                        Err(RemoteError::Conflict {
                            server: Some(Box::new(existing)),
                        }),
                    ));
                    continue;
                }
            }
            state.next_tag += 1;
            record.change_tag = Some(state.next_tag.to_string());
            if let Some(zone_state) = state.zones.get_mut(zone) {
                zone_state.records.insert(name.clone(), record.clone());
                zone_state.feed.push(FeedEvent::Saved(record.clone()));
            }
            outcome.saved.push((name, Ok(record)));
        }

        for name in deletes {
            if let Some(error) = state.record_errors.remove(&name) {
                outcome.deleted.push((name, Err(error)));
                continue;
            }
            let Some(zone_state) = state.zones.get_mut(zone) else {
                outcome.deleted.push((name, Err(RemoteError::ZoneNotFound)));
                continue;
            };
            // Deletes are idempotent and always enter the feed: tombstone
            // names never match a stored save record, yet other devices
            // must still observe the deletion.
            zone_state.records.remove(&name);
            zone_state.feed.push(FeedEvent::DeletedRecord(name.clone()));
            outcome.deleted.push((name, Ok(())));
        }

        Ok(outcome)
    }

    async fn fetch_changes(
        &self,
        zone: &str,
        cursor: Option<&str>,
    ) -> Result<FetchPage, RemoteError> {
        let mut state = self.state();
        if let Some(error) = Self::take_call_error(&mut state, RemoteOp::Fetch) {
            return Err(error);
        }
        let Some(zone_state) = state.zones.get(zone) else {
            return Err(RemoteError::ZoneNotFound);
        };

        let start: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let start = start.min(zone_state.feed.len());
        let end = (start + FETCH_PAGE_SIZE).min(zone_state.feed.len());

        let mut page = FetchPage::default();
        for event in &zone_state.feed[start..end] {
            match event {
                FeedEvent::Saved(record) => page.modifications.push(record.clone()),
                FeedEvent::DeletedRecord(name) => page.deletions.push(name.clone()),
                FeedEvent::DeletedZone(reason) => page.zone_deletions.push(*reason),
            }
        }
        page.cursor = Some(end.to_string());
        page.more = end < zone_state.feed.len();
        Ok(page)
    }
}
