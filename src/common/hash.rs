//! Content identifiers
//!
//! A [`ContentId`] is the BLAKE3 digest of the payload together with its
//! owner, display name, creation time and a process-local sequence number.
//! Every field is length-prefixed before hashing so that shifting bytes
//! between neighbouring fields cannot produce the same digest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Identifier of one immutable content item (64 hex chars)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Derive a fresh identifier for a new content item
    pub fn derive(data: &[u8], owner: &str, name: &str, created_at: DateTime<Utc>) -> Self {
        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let nanos = created_at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| created_at.timestamp_micros().saturating_mul(1_000));

        let mut hasher = blake3::Hasher::new();
        for field in [data, owner.as_bytes(), name.as_bytes()] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field);
        }
        hasher.update(&nanos.to_le_bytes());
        hasher.update(&sequence.to_le_bytes());

        Self(hex::encode(hasher.finalize().as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ContentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// BLAKE3 of a payload, hex encoded (used for replica verification)
pub fn blake3_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id_format() {
        let id = ContentId::derive(b"hello", "alice", "a.txt", Utc::now());
        assert_eq!(id.as_str().len(), 64);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id.short().len(), 12);
    }

    #[test]
    fn test_same_inputs_yield_distinct_ids() {
        let now = Utc::now();
        let a = ContentId::derive(b"hello", "alice", "a.txt", now);
        let b = ContentId::derive(b"hello", "alice", "a.txt", now);
        assert_ne!(a, b);
    }

    #[test]
    fn test_field_boundaries_matter() {
        let now = Utc::now();
        let a = ContentId::derive(b"ab", "c", "x", now);
        let b = ContentId::derive(b"a", "bc", "x", now);
        assert_ne!(a, b);
    }

    #[test]
    fn test_blake3_hash() {
        assert_eq!(blake3_hash(b"hello world").len(), 64);
        assert_eq!(blake3_hash(b"x"), blake3_hash(b"x"));
    }
}
