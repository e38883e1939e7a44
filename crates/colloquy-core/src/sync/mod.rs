//! Multi-device synchronization engine.

pub mod diff;
pub mod engine;
pub mod preferences;
pub mod record_id;
pub mod remote;
pub mod syncable;

pub use diff::{Diff, diff, sort_by_modified};
pub use engine::{SyncConfig, SyncEngine, SyncSummary};
pub use preferences::{SyncGroup, SyncPreferences};
pub use remote::{
    AccountStatus, FetchPage, HttpRemoteStore, MemoryRemoteStore, ModifyOutcome, RemoteError,
    RemoteOp, RemoteRecord, RemoteStore, ZONE_NAME, ZoneDeletionReason,
};
pub use syncable::Syncable;
