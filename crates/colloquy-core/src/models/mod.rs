//! Data models for Colloquy

mod attachment;
mod cloud_model;
mod conversation;
mod mcp_server;
mod memory;
mod message;
mod upload_queue;

pub use attachment::Attachment;
pub use cloud_model::CloudModel;
pub use conversation::Conversation;
pub use mcp_server::{McpServer, McpTransport};
pub use memory::Memory;
pub use message::{Message, MessageRole};
pub use upload_queue::{ChangeKind, UploadEntry, UploadState};
