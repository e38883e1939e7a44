//! Per-group sync switches.
//!
//! Users can exclude groups of tables from sync. The switches gate both
//! directions: disabled tables are skipped when selecting entries to send
//! and inbound records for them are dropped before apply. The underlying
//! queue keeps accumulating entries so re-enabling resumes cleanly.

use rusqlite::Connection;

use crate::db::SettingsRepository;
use crate::error::Result;

/// A user-facing group of synced tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncGroup {
    /// Conversations with their messages and attachments
    Conversations,
    /// Saved memories
    Memory,
    /// MCP server configurations
    Mcp,
    /// Cloud model configurations, tokens included
    Models,
}

impl SyncGroup {
    pub const ALL: [Self; 4] = [Self::Conversations, Self::Memory, Self::Mcp, Self::Models];

    /// The settings key holding this group's switch.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Conversations => "sync_group_conversations",
            Self::Memory => "sync_group_memory",
            Self::Mcp => "sync_group_mcp",
            Self::Models => "sync_group_models",
        }
    }

    /// The tables this group covers.
    #[must_use]
    pub const fn tables(self) -> &'static [&'static str] {
        match self {
            Self::Conversations => &["conversation", "message", "attachment"],
            Self::Memory => &["memory"],
            Self::Mcp => &["mcp_server"],
            Self::Models => &["cloud_model"],
        }
    }

    /// Which group a table belongs to.
    #[must_use]
    pub fn for_table(table_name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|group| group.tables().contains(&table_name))
    }
}

/// Snapshot of all group switches, taken once per sync cycle so a cycle
/// sees consistent gating even if the user flips a switch mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPreferences {
    enabled: [bool; SyncGroup::ALL.len()],
}

impl SyncPreferences {
    /// Read the switches. Groups default to enabled.
    pub fn load(conn: &Connection) -> Result<Self> {
        let settings = SettingsRepository::new(conn);
        let mut enabled = [true; SyncGroup::ALL.len()];
        for (slot, group) in enabled.iter_mut().zip(SyncGroup::ALL) {
            if let Some(value) = settings.get(group.key())? {
                *slot = value != "0";
            }
        }
        Ok(Self { enabled })
    }

    /// Persist one switch.
    pub fn set_enabled(conn: &Connection, group: SyncGroup, enabled: bool) -> Result<()> {
        SettingsRepository::new(conn).set(group.key(), if enabled { "1" } else { "0" })
    }

    #[must_use]
    pub fn is_enabled(&self, group: SyncGroup) -> bool {
        SyncGroup::ALL
            .into_iter()
            .position(|g| g == group)
            .is_some_and(|index| self.enabled[index])
    }

    /// Whether records of this table may sync. Unknown tables are not
    /// allowed; their records come from newer schema versions.
    #[must_use]
    pub fn allows_table(&self, table_name: &str) -> bool {
        SyncGroup::for_table(table_name).is_some_and(|group| self.is_enabled(group))
    }

    /// Tables currently allowed to sync, for SQL-level send filtering.
    #[must_use]
    pub fn enabled_tables(&self) -> Vec<&'static str> {
        SyncGroup::ALL
            .into_iter()
            .filter(|group| self.is_enabled(*group))
            .flat_map(|group| group.tables().iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn test_groups_default_to_enabled() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock();
        let prefs = SyncPreferences::load(&conn).unwrap();
        for group in SyncGroup::ALL {
            assert!(prefs.is_enabled(group));
        }
        assert_eq!(prefs.enabled_tables().len(), 6);
    }

    #[test]
    fn test_disable_group_gates_its_tables() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock();
        SyncPreferences::set_enabled(&conn, SyncGroup::Memory, false).unwrap();

        let prefs = SyncPreferences::load(&conn).unwrap();
        assert!(!prefs.is_enabled(SyncGroup::Memory));
        assert!(!prefs.allows_table("memory"));
        assert!(prefs.allows_table("conversation"));
        assert!(!prefs.enabled_tables().contains(&"memory"));
    }

    #[test]
    fn test_reenable_group() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock();
        SyncPreferences::set_enabled(&conn, SyncGroup::Models, false).unwrap();
        SyncPreferences::set_enabled(&conn, SyncGroup::Models, true).unwrap();
        let prefs = SyncPreferences::load(&conn).unwrap();
        assert!(prefs.allows_table("cloud_model"));
    }

    #[test]
    fn test_unknown_table_is_not_allowed() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock();
        let prefs = SyncPreferences::load(&conn).unwrap();
        assert_eq!(SyncGroup::for_table("widget"), None);
        assert!(!prefs.allows_table("widget"));
    }

    #[test]
    fn test_table_to_group_mapping() {
        assert_eq!(SyncGroup::for_table("message"), Some(SyncGroup::Conversations));
        assert_eq!(SyncGroup::for_table("attachment"), Some(SyncGroup::Conversations));
        assert_eq!(SyncGroup::for_table("memory"), Some(SyncGroup::Memory));
        assert_eq!(SyncGroup::for_table("mcp_server"), Some(SyncGroup::Mcp));
        assert_eq!(SyncGroup::for_table("cloud_model"), Some(SyncGroup::Models));
    }
}
