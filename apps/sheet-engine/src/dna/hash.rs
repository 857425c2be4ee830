//! Stable content hashing for specifications and raw inputs.
//!
//! Hashes are SHA-256 over canonical JSON. `serde_json::Value` objects keep
//! their keys sorted, so two inputs that differ only in key order hash equal.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::dna::models::DesignSpecification;

/// Hex-encoded SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// Hashes the canonical (sorted-key) JSON encoding of `value`.
    pub fn of_value(value: &Value) -> Self {
        // Serialising a `Value` into memory cannot fail.
        let canonical = serde_json::to_vec(value).unwrap_or_default();
        Self::of_bytes(&canonical)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, used for derived ids.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.0)
    }
}

/// Stable content hash of a normalized specification, used for seeding and caching.
pub fn content_hash(spec: &DesignSpecification) -> ContentHash {
    let value = serde_json::to_value(spec).unwrap_or(Value::Null);
    ContentHash::of_value(&value)
}
