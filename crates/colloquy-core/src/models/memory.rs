//! Memory model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::syncable::Syncable;
use crate::util::now_ms;

/// A long-term memory extracted from conversations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
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
    /// Memory text
    pub content: String,
    /// Conversation this memory originated from, if any
    pub conversation_id: Option<String>,
}

impl Memory {
    /// Create a new memory with the given content.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            object_id: Uuid::now_v7().to_string(),
            device_id: String::new(),
            creation: now,
            modified: now,
            removed: false,
            content: content.into(),
            conversation_id: None,
        }
    }
}

impl Syncable for Memory {
    const TABLE: &'static str = "memory";

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_new() {
        let memory = Memory::new("User prefers metric units");
        assert_eq!(memory.content, "User prefers metric units");
        assert!(memory.conversation_id.is_none());
        assert!(!memory.removed);
    }
}
