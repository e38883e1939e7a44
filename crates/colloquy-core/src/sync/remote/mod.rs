//! Remote record store contract.
//!
//! The sync engine is generic over [`RemoteStore`] so tests can run against
//! the deterministic in-memory implementation while production uses the
//! HTTP client. The store offers per-record strong consistency with
//! optimistic concurrency, not transactional multi-record consistency.

mod http;
mod memory;

pub use http::HttpRemoteStore;
pub use memory::{MemoryRemoteStore, RemoteOp};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The zone holding all of this app's synced records for one account.
pub const ZONE_NAME: &str = "ColloquySync";

/// One record in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Opaque record name (see `sync::record_id` for the encodings)
    pub name: String,
    /// Local table the payload belongs to
    pub table_name: String,
    /// Device that first created the record
    pub created_by_device: String,
    /// Device that last modified the record
    pub modified_by_device: String,
    /// Last modification timestamp in Unix ms; kept as an integer to avoid
    /// date precision issues when comparing
    pub modified_ms: i64,
    /// Serialized object snapshot
    #[serde(default)]
    pub payload: Vec<u8>,
    /// Server-assigned version tag; `None` for records never saved
    #[serde(default)]
    pub change_tag: Option<String>,
}

/// Account availability as reported by the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Available,
    NoAccount,
    Restricted,
    CouldNotDetermine,
}

/// Why a zone disappeared from the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneDeletionReason {
    /// The zone was deleted by the user or another device
    Deleted,
    /// The account's data was purged server-side
    Purged,
    /// Encrypted data was reset; history is unrecoverable
    EncryptedDataReset,
}

/// One page of the remote change feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchPage {
    /// Saved or modified records
    pub modifications: Vec<RemoteRecord>,
    /// Names of deleted records
    pub deletions: Vec<String>,
    /// Zone-level deletions observed in this page
    pub zone_deletions: Vec<ZoneDeletionReason>,
    /// Cursor to resume from after this page
    pub cursor: Option<String>,
    /// Whether more changes are available
    pub more: bool,
}

/// Per-record results of a modify batch.
#[derive(Debug, Clone, Default)]
pub struct ModifyOutcome {
    /// (record name, result) for each attempted save
    pub saved: Vec<(String, Result<RemoteRecord, RemoteError>)>,
    /// (record name, result) for each attempted delete
    pub deleted: Vec<(String, Result<(), RemoteError>)>,
}

/// Typed remote failures, mirroring the engine's error taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("network unavailable")]
    NetworkUnavailable,

    #[error("service unavailable")]
    ServiceUnavailable,

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("operation cancelled")]
    Cancelled,

    #[error("zone not found")]
    ZoneNotFound,

    #[error("unknown item")]
    UnknownItem,

    /// The server holds a newer version of the record.
    #[error("conflict: server record is newer")]
    Conflict {
        /// The authoritative server record, when the server returned it
        server: Option<Box<RemoteRecord>>,
    },

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("remote error: {0}")]
    Other(String),
}

impl RemoteError {
    /// Transient errors cause no state change; the entry is retried on the
    /// next cycle.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkUnavailable | Self::ServiceUnavailable | Self::NotAuthenticated | Self::Cancelled
        )
    }
}

/// Remote record store operations consumed by the sync engine.
///
/// `modify_records` applies a batch atomically per zone with
/// optimistic-concurrency semantics: a save whose `change_tag` does not
/// match the server's current tag is rejected per-record with
/// [`RemoteError::Conflict`].
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    async fn account_status(&self) -> Result<AccountStatus, RemoteError>;

    async fn list_zones(&self) -> Result<Vec<String>, RemoteError>;

    async fn create_zone(&self, zone: &str) -> Result<(), RemoteError>;

    async fn modify_records(
        &self,
        zone: &str,
        saves: Vec<RemoteRecord>,
        deletes: Vec<String>,
    ) -> Result<ModifyOutcome, RemoteError>;

    async fn fetch_changes(
        &self,
        zone: &str,
        cursor: Option<&str>,
    ) -> Result<FetchPage, RemoteError>;
}
