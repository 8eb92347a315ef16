//! Save fingerprinting
//!
//! A fast polynomial hash over the serialized save. It identifies payloads
//! for listing and change detection only; it is not an integrity check.

use super::types::SaveData;

const MULTIPLIER: u32 = 31;

/// Fingerprint a byte sequence as 8 lowercase hex digits
pub fn checksum(bytes: &[u8]) -> String {
    let hash = bytes
        .iter()
        .fold(0u32, |hash, &byte| hash.wrapping_mul(MULTIPLIER).wrapping_add(byte as u32));
    format!("{:08x}", hash)
}

/// Fingerprint a save through its serialized form.
///
/// Object keys serialize in sorted order, so two saves holding the same
/// data fingerprint identically regardless of how their maps were built.
pub fn save_checksum(save: &SaveData) -> serde_json::Result<String> {
    Ok(checksum(&save.to_bytes()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_checksum_is_deterministic() {
        let data = br#"{"player":{"money":5000}}"#;
        assert_eq!(checksum(data), checksum(data));
        assert_eq!(checksum(data).len(), 8);
    }

    #[test]
    fn test_single_bit_flip_changes_checksum() {
        let original = b"expedition-log".to_vec();
        let mut flipped = original.clone();
        flipped[3] ^= 0b0000_0001;

        assert_ne!(checksum(&original), checksum(&flipped));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(checksum(b""), "00000000");
    }

    #[test]
    fn test_save_checksum_ignores_key_order() {
        let timestamp = chrono::Utc::now();
        let a = SaveData::with_timestamp(
            serde_json::from_str(r#"{"player":{"money":1,"level":2}}"#).unwrap(),
            timestamp,
        );
        let b = SaveData::with_timestamp(
            serde_json::from_str(r#"{"player":{"level":2,"money":1}}"#).unwrap(),
            timestamp,
        );

        assert_eq!(save_checksum(&a).unwrap(), save_checksum(&b).unwrap());

        let c = SaveData::with_timestamp(json!({"player": {"money": 2, "level": 2}}), timestamp);
        assert_ne!(save_checksum(&a).unwrap(), save_checksum(&c).unwrap());
    }
}
