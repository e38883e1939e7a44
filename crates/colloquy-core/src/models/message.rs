//! Message model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::syncable::Syncable;
use crate::util::now_ms;

/// The author role of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single message inside a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
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
    /// Parent conversation object id
    pub conversation_id: String,
    /// Author role
    pub role: MessageRole,
    /// Rendered message body
    pub document: String,
    /// Model reasoning trace, empty for non-reasoning output
    pub reasoning_content: String,
}

impl Message {
    /// Create a new message in the given conversation.
    #[must_use]
    pub fn new(conversation_id: impl Into<String>, role: MessageRole, document: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            object_id: Uuid::now_v7().to_string(),
            device_id: String::new(),
            creation: now,
            modified: now,
            removed: false,
            conversation_id: conversation_id.into(),
            role,
            document: document.into(),
            reasoning_content: String::new(),
        }
    }
}

impl Syncable for Message {
    const TABLE: &'static str = "message";

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
