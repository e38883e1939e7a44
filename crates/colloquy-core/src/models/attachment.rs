//! Attachment model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::sync::syncable::Syncable;
use crate::util::now_ms;

/// Attachment metadata persisted for a message.
///
/// The attachment bytes themselves live in object storage; only the
/// metadata row replicates across devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
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
    /// Parent message object id
    pub message_id: String,
    /// Original file name
    pub filename: String,
    /// Content MIME type
    pub mime_type: String,
    /// Attachment size in bytes
    pub size_bytes: i64,
    /// Object storage key
    pub storage_key: String,
}

impl Attachment {
    /// Create a new attachment metadata record.
    pub fn new(
        message_id: impl Into<String>,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        size_bytes: i64,
        storage_key: impl Into<String>,
    ) -> Result<Self> {
        let filename = filename.into().trim().to_string();
        let mime_type = mime_type.into().trim().to_string();
        let storage_key = storage_key.into().trim().to_string();

        if filename.is_empty() {
            return Err(Error::InvalidInput(
                "Attachment filename cannot be empty".to_string(),
            ));
        }
        if mime_type.is_empty() {
            return Err(Error::InvalidInput(
                "Attachment mime_type cannot be empty".to_string(),
            ));
        }
        if storage_key.is_empty() {
            return Err(Error::InvalidInput(
                "Attachment storage_key cannot be empty".to_string(),
            ));
        }
        if size_bytes < 0 {
            return Err(Error::InvalidInput(
                "Attachment size_bytes cannot be negative".to_string(),
            ));
        }

        let now = now_ms();
        Ok(Self {
            object_id: Uuid::now_v7().to_string(),
            device_id: String::new(),
            creation: now,
            modified: now,
            removed: false,
            message_id: message_id.into(),
            filename,
            mime_type,
            size_bytes,
            storage_key,
        })
    }
}

impl Syncable for Attachment {
    const TABLE: &'static str = "attachment";

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
    fn test_attachment_new() {
        let attachment =
            Attachment::new("msg-1", "image.png", "image/png", 1234, "chats/msg/image.png")
                .unwrap();
        assert_eq!(attachment.filename, "image.png");
        assert_eq!(attachment.size_bytes, 1234);
        assert!(!attachment.removed);
    }

    #[test]
    fn test_attachment_validation() {
        assert!(Attachment::new("m", "", "image/png", 1, "key").is_err());
        assert!(Attachment::new("m", "file", "", 1, "key").is_err());
        assert!(Attachment::new("m", "file", "image/png", 1, "").is_err());
        assert!(Attachment::new("m", "file", "image/png", -1, "key").is_err());
    }
}
