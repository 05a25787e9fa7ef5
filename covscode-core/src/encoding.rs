//! Byte-preserving string encoding.
//!
//! Archive bytes travel inside JSON strings with one character per byte:
//! byte `b` becomes the char `U+00bb`. Decoding rejects any char above
//! `U+00FF`, since such a string could not have come from this encoding.

use crate::message::ProtocolError;

/// Encode raw bytes as a single-byte-per-character string.
pub fn bytes_to_binary_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Decode a single-byte-per-character string back into bytes.
pub fn binary_string_to_bytes(s: &str) -> Result<Vec<u8>, ProtocolError> {
    s.chars()
        .map(|c| {
            u8::try_from(c).map_err(|_| {
                ProtocolError::InvalidEncoding(format!("char U+{:04X} is not a byte", c as u32))
            })
        })
        .collect()
}

/// Serde adapter: `#[serde(with = "covscode_core::encoding::binary_string")]`.
pub mod binary_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::bytes_to_binary_string(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::binary_string_to_bytes(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_byte_survives() {
        let bytes: Vec<u8> = (0..=255u8).collect();
        let encoded = bytes_to_binary_string(&bytes);
        assert_eq!(encoded.chars().count(), 256);
        assert_eq!(binary_string_to_bytes(&encoded).unwrap(), bytes);
    }

    #[test]
    fn test_zip_magic_is_readable() {
        // PK\x03\x04
        let encoded = bytes_to_binary_string(&[0x50, 0x4b, 0x03, 0x04]);
        assert!(encoded.starts_with("PK"));
    }

    #[test]
    fn test_wide_char_rejected() {
        let err = binary_string_to_bytes("ok\u{4e2d}").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidEncoding(_)));
    }
}
