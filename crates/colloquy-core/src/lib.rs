//! Core library for Colloquy.
//!
//! Models, the local `SQLite` store, and the multi-device sync engine.

pub mod db;
pub mod error;
pub mod models;
pub mod sync;
pub mod util;

pub use db::Database;
pub use error::{Error, Result};
pub use sync::{SyncEngine, SyncGroup, SyncSummary};
