//! The contract every replicated entity satisfies, plus the payload envelope.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::util::now_ms;

/// Magic prefix identifying a Colloquy sync payload.
const PAYLOAD_MAGIC: [u8; 2] = *b"CQ";

/// Current payload envelope version.
const PAYLOAD_VERSION: u8 = 1;

/// Minimal shape every replicated entity must satisfy.
///
/// Sync treats the entity-specific fields as opaque beyond serialization;
/// the five sync columns drive diffing, conflict resolution, and tombstone
/// propagation.
pub trait Syncable: Serialize + DeserializeOwned + Clone {
    /// Local table this entity type lives in.
    const TABLE: &'static str;

    /// Globally unique, immutable identity of the logical record.
    fn object_id(&self) -> &str;

    /// Device that created or last asserted authorship. Used for echo
    /// suppression, never for ownership enforcement.
    fn device_id(&self) -> &str;

    /// Creation timestamp (Unix ms), immutable.
    fn creation(&self) -> i64;

    /// Last modification timestamp (Unix ms); the sole conflict signal.
    fn modified(&self) -> i64;

    /// Tombstone flag.
    fn removed(&self) -> bool;

    fn set_device_id(&mut self, device_id: &str);

    fn set_modified(&mut self, modified: i64);

    fn set_removed(&mut self, removed: bool);

    /// Advance `modified` to now. Call on every local mutation.
    fn touch(&mut self) {
        self.set_modified(now_ms());
    }

    /// Serialize into an upload payload.
    fn encode_payload(&self) -> Result<Vec<u8>> {
        encode_payload(self)
    }

    /// Restore an entity from an upload payload.
    fn decode_payload(data: &[u8]) -> Result<Self> {
        decode_payload(data)
    }
}

/// Serialize a value into the versioned payload envelope.
pub fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(value)?;
    let mut data = Vec::with_capacity(PAYLOAD_MAGIC.len() + 1 + body.len());
    data.extend_from_slice(&PAYLOAD_MAGIC);
    data.push(PAYLOAD_VERSION);
    data.extend_from_slice(&body);
    Ok(data)
}

/// Decode a value from the versioned payload envelope.
///
/// Returns [`Error::MalformedPayload`] for truncated data, a bad magic
/// prefix, an unsupported version, or an undecodable body. Callers must
/// skip the offending record, never abort the batch.
pub fn decode_payload<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    if data.len() < PAYLOAD_MAGIC.len() + 1 {
        return Err(Error::MalformedPayload("payload too short".to_string()));
    }
    if data[..PAYLOAD_MAGIC.len()] != PAYLOAD_MAGIC {
        return Err(Error::MalformedPayload("bad magic prefix".to_string()));
    }
    let version = data[PAYLOAD_MAGIC.len()];
    if version != PAYLOAD_VERSION {
        return Err(Error::MalformedPayload(format!(
            "unsupported payload version {version}"
        )));
    }
    serde_json::from_slice(&data[PAYLOAD_MAGIC.len() + 1..])
        .map_err(|e| Error::MalformedPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Memory;

    #[test]
    fn payload_round_trip() {
        let memory = Memory::new("remember this");
        let data = memory.encode_payload().unwrap();
        let decoded = Memory::decode_payload(&data).unwrap();
        assert_eq!(decoded, memory);
    }

    #[test]
    fn payload_rejects_truncated_data() {
        assert!(matches!(
            decode_payload::<Memory>(b"CQ"),
            Err(Error::MalformedPayload(_))
        ));
        assert!(matches!(
            decode_payload::<Memory>(b""),
            Err(Error::MalformedPayload(_))
        ));
    }

    #[test]
    fn payload_rejects_bad_magic() {
        let mut data = Memory::new("x").encode_payload().unwrap();
        data[0] = b'X';
        assert!(matches!(
            Memory::decode_payload(&data),
            Err(Error::MalformedPayload(_))
        ));
    }

    #[test]
    fn payload_rejects_unknown_version() {
        let mut data = Memory::new("x").encode_payload().unwrap();
        data[2] = 99;
        assert!(matches!(
            Memory::decode_payload(&data),
            Err(Error::MalformedPayload(_))
        ));
    }

    #[test]
    fn touch_advances_modified() {
        let mut memory = Memory::new("x");
        let before = memory.modified();
        memory.set_modified(before - 10);
        memory.touch();
        assert!(memory.modified() >= before);
    }
}
