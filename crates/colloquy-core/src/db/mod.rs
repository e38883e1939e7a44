//! Database layer for Colloquy

mod connection;
mod migrations;
mod queue;
mod settings;
mod syncable;

pub use connection::{Database, RETENTION_MS};
pub use queue::{FAIL_COUNT_CEILING, UploadQueueRepository};
pub use settings::SettingsRepository;
pub use syncable::SyncableRepository;
