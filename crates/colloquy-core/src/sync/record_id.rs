//! Deterministic, reversible encoding between local identities and remote
//! record names.
//!
//! Two schemes share the namespace and must stay mutually unambiguous:
//! saves use the `##` separator over three fields, tombstones use `:` over
//! two. Object and device ids are UUID strings, so neither separator can
//! appear inside a field.

/// Separator for save record names.
pub const SAVE_SEPARATOR: &str = "##";

/// Separator for tombstone record names.
pub const TOMBSTONE_SEPARATOR: &str = ":";

/// Encode a save record name: `<queueId>##<objectId>##<deviceId>`.
#[must_use]
pub fn encode_save(queue_id: i64, object_id: &str, device_id: &str) -> String {
    debug_assert!(!object_id.contains(SAVE_SEPARATOR) && !object_id.contains(TOMBSTONE_SEPARATOR));
    debug_assert!(!device_id.contains(SAVE_SEPARATOR) && !device_id.contains(TOMBSTONE_SEPARATOR));
    format!("{queue_id}{SAVE_SEPARATOR}{object_id}{SAVE_SEPARATOR}{device_id}")
}

/// Decode a save record name. Returns `None` on malformed input; callers
/// treat `None` as drop/ignore.
#[must_use]
pub fn decode_save(name: &str) -> Option<(i64, String, String)> {
    let parts: Vec<&str> = name.split(SAVE_SEPARATOR).collect();
    if parts.len() != 3 {
        return None;
    }
    let queue_id: i64 = parts[0].parse().ok()?;
    if parts[1].is_empty() || parts[2].is_empty() {
        return None;
    }
    Some((queue_id, parts[1].to_string(), parts[2].to_string()))
}

/// Encode a tombstone record name: `<objectId>:<tableName>`.
#[must_use]
pub fn encode_tombstone(object_id: &str, table_name: &str) -> String {
    debug_assert!(!object_id.contains(SAVE_SEPARATOR) && !object_id.contains(TOMBSTONE_SEPARATOR));
    debug_assert!(!table_name.contains(TOMBSTONE_SEPARATOR));
    format!("{object_id}{TOMBSTONE_SEPARATOR}{table_name}")
}

/// Decode a tombstone record name. Returns `None` on malformed input.
#[must_use]
pub fn decode_tombstone(name: &str) -> Option<(String, String)> {
    // A save name also contains no ':', but reject its separator outright
    // so the two schemes can never misparse each other.
    if name.contains(SAVE_SEPARATOR) {
        return None;
    }
    let parts: Vec<&str> = name.split(TOMBSTONE_SEPARATOR).collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return None;
    }
    Some((parts[0].to_string(), parts[1].to_string()))
}
