//! MCP server configuration model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::syncable::Syncable;
use crate::util::now_ms;

/// Transport used to reach an MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpTransport {
    Http,
    Sse,
}

/// Configuration for a Model Context Protocol server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServer {
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
    /// Display name
    pub name: String,
    /// Server endpoint URL
    pub endpoint: String,
    /// Transport type
    pub transport: McpTransport,
    /// Request timeout in seconds
    pub timeout_secs: i64,
    /// Whether this server participates in tool calls
    pub enabled: bool,
}

impl McpServer {
    /// Create a new MCP server configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            object_id: Uuid::now_v7().to_string(),
            device_id: String::new(),
            creation: now,
            modified: now,
            removed: false,
            name: name.into(),
            endpoint: endpoint.into(),
            transport: McpTransport::Http,
            timeout_secs: 60,
            enabled: true,
        }
    }
}

impl Syncable for McpServer {
    const TABLE: &'static str = "mcp_server";

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
