//! Upload queue entry model

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sync::syncable::Syncable;

/// The kind of change a queue entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Insert = 0,
    Update = 1,
    Delete = 2,
}

impl ChangeKind {
    /// Integer column representation.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self as i64
    }

    /// Parse the integer column representation.
    #[must_use]
    pub const fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Insert),
            1 => Some(Self::Update),
            2 => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Delivery state of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadState {
    Pending = 0,
    Uploading = 1,
    Finish = 2,
    Failed = 3,
}

impl UploadState {
    /// Integer column representation.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self as i64
    }

    /// Parse the integer column representation.
    #[must_use]
    pub const fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Pending),
            1 => Some(Self::Uploading),
            2 => Some(Self::Finish),
            3 => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One durable record of an outbound change awaiting remote confirmation.
///
/// The payload is a snapshot taken at enqueue time and is immutable after
/// creation; corrections become new entries so the log stays append-only
/// and replayable after a crash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadEntry {
    /// Strictly increasing id assigned at enqueue time; defines send order
    pub id: i64,
    /// Target entity table
    pub table_name: String,
    /// Target object id
    pub object_id: String,
    /// Device that authored the change
    pub device_id: String,
    /// Source object's `modified` at enqueue time; orders cross-table sends
    pub creation: i64,
    /// Source object's `modified` at enqueue time
    pub modified: i64,
    /// Change kind
    pub changes: ChangeKind,
    /// Delivery state
    pub state: UploadState,
    /// Advisory failure counter
    pub fail_count: i64,
    /// Serialized object snapshot; empty for deletes
    pub payload: Vec<u8>,
}

impl UploadEntry {
    /// Build an entry from a syncable object. The id is assigned at
    /// enqueue time by the queue repository.
    pub fn from_source<T: Syncable>(source: &T, changes: ChangeKind) -> Result<Self> {
        let payload = if changes == ChangeKind::Delete {
            Vec::new()
        } else {
            source.encode_payload()?
        };
        Ok(Self {
            id: 0,
            table_name: T::TABLE.to_string(),
            object_id: source.object_id().to_string(),
            device_id: source.device_id().to_string(),
            creation: source.modified(),
            modified: source.modified(),
            changes,
            state: UploadState::Pending,
            fail_count: 0,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Memory;

    #[test]
    fn test_change_kind_round_trip() {
        for kind in [ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete] {
            assert_eq!(ChangeKind::from_i64(kind.as_i64()), Some(kind));
        }
        assert_eq!(ChangeKind::from_i64(9), None);
    }

    #[test]
    fn test_upload_state_round_trip() {
        for state in [
            UploadState::Pending,
            UploadState::Uploading,
            UploadState::Finish,
            UploadState::Failed,
        ] {
            assert_eq!(UploadState::from_i64(state.as_i64()), Some(state));
        }
        assert_eq!(UploadState::from_i64(-1), None);
    }

    #[test]
    fn test_from_source_snapshots_payload() {
        let memory = Memory::new("note");
        let entry = UploadEntry::from_source(&memory, ChangeKind::Insert).unwrap();
        assert_eq!(entry.table_name, "memory");
        assert_eq!(entry.object_id, memory.object_id);
        assert_eq!(entry.creation, memory.modified);
        assert!(!entry.payload.is_empty());
        assert_eq!(entry.state, UploadState::Pending);
    }

    #[test]
    fn test_from_source_delete_has_no_payload() {
        let memory = Memory::new("note");
        let entry = UploadEntry::from_source(&memory, ChangeKind::Delete).unwrap();
        assert!(entry.payload.is_empty());
    }
}
