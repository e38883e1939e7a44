//! Conversation model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::syncable::Syncable;
use crate::util::now_ms;

/// A chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier, UUID v7 (time-sortable)
    pub object_id: String,
    /// Device that created or last modified this row
    pub device_id: String,
    /// Creation timestamp (Unix ms)
    pub creation: i64,
    /// Last modification timestamp (Unix ms)
    pub modified: i64,
    /// Soft delete flag for sync
    pub removed: bool,
    /// Display title
    pub title: String,
    /// Selected model identifier, if any
    pub model_id: Option<String>,
    /// Pinned to the top of the sidebar
    pub is_favorite: bool,
    /// Title may be regenerated from the first exchange
    pub should_auto_rename: bool,
}

impl Conversation {
    /// Create a new conversation with the given title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            object_id: Uuid::now_v7().to_string(),
            device_id: String::new(),
            creation: now,
            modified: now,
            removed: false,
            title: title.into(),
            model_id: None,
            is_favorite: false,
            should_auto_rename: true,
        }
    }
}

impl Syncable for Conversation {
    const TABLE: &'static str = "conversation";

    fn object_id(&self) -> &str {
        &self.object_id
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn creation(&self) -> i64 {
        self.creation
    }

    fn modified(&self) -> i64 {
        self.modified
    }

    fn removed(&self) -> bool {
        self.removed
    }

    fn set_device_id(&mut self, device_id: &str) {
        self.device_id = device_id.to_string();
    }

    fn set_modified(&mut self, modified: i64) {
        self.modified = modified;
    }

    fn set_removed(&mut self, removed: bool) {
        self.removed = removed;
    }
}
