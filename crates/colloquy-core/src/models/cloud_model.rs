//! Cloud model configuration

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::syncable::Syncable;
use crate::util::now_ms;

/// Configuration for a remote inference model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudModel {
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
    /// Provider-side model identifier (e.g. `gpt-4o`)
    pub model_identifier: String,
    /// Inference endpoint URL
    pub endpoint: String,
    /// API token; replicated so every device can use the model
    pub token: String,
    /// Free-form user comment
    pub comment: String,
}

impl CloudModel {
    /// Create a new cloud model configuration.
    #[must_use]
    pub fn new(model_identifier: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            object_id: Uuid::now_v7().to_string(),
            device_id: String::new(),
            creation: now,
            modified: now,
            removed: false,
            model_identifier: model_identifier.into(),
            endpoint: endpoint.into(),
            token: String::new(),
            comment: String::new(),
        }
    }
}

impl Syncable for CloudModel {
    const TABLE: &'static str = "cloud_model";

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
