//! Content hashing using BLAKE3

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SyncError};

/// Read block size for streaming file hashes
pub const HASH_BLOCK_SIZE: usize = 64 * 1024;

/// A content hash using BLAKE3 (256-bit)
///
/// Serialized as a lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash arbitrary bytes
    #[must_use]
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Hash a file by path, streaming it in fixed-size blocks
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] if the file cannot be opened or read, which
    /// includes the file being deleted mid-read.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut file = std::fs::File::open(path).map_err(|e| SyncError::io(path, e))?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; HASH_BLOCK_SIZE];

        loop {
            let bytes_read = file.read(&mut buffer).map_err(|e| SyncError::io(path, e))?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(Self(*hasher.finalize().as_bytes()))
    }

    /// Get raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "ContentHash({})", hex.get(..16).unwrap_or(&hex))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "{}", hex.get(..16).unwrap_or(&hex))
    }
}

impl FromStr for ContentHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut raw = [0u8; 32];
        hex::decode_to_slice(s, &mut raw)?;
        Ok(Self(raw))
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_content_hash_deterministic() {
        let data = b"hello world";
        let h1 = ContentHash::from_bytes(data);
        let h2 = ContentHash::from_bytes(data);
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_content_hash_different_data() {
        let h1 = ContentHash::from_bytes(b"hello");
        let h2 = ContentHash::from_bytes(b"world");
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_file_hash_matches_bytes_across_blocks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        // Spans several read blocks with a ragged tail
        let data: Vec<u8> = (0..HASH_BLOCK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        assert_eq!(
            ContentHash::from_file(&path).unwrap(),
            ContentHash::from_bytes(&data)
        );
    }

    #[test]
    fn test_missing_file_is_vanished_io_error() {
        let dir = TempDir::new().unwrap();
        let err = ContentHash::from_file(&dir.path().join("gone.txt")).unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }));
        assert!(err.is_vanished());
    }

    #[test]
    fn test_hex_serde() {
        let hash = ContentHash::from_bytes(b"payload");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));

        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);

        assert!(serde_json::from_str::<ContentHash>("\"not-hex\"").is_err());
    }
}
