//! Content fingerprints
//!
//! A [`ContentDigest`] is the dedup key for the ledger. It is a pure function of
//! a file's bytes: the same bytes always produce the same digest, no matter the
//! file name or location.

use crate::error::Result;
use crate::utils;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// SHA-256 digest of a file's raw bytes, stored as lowercase hex
///
/// Digests read back from a ledger are kept verbatim even when they were
/// produced by another hash function, so the ledger set stays monotone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Digest of in-memory bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        ContentDigest(utils::hash_data(data))
    }

    /// Digest of a file's content
    ///
    /// # Errors
    ///
    /// Surfaces [`crate::ShipError::Unreadable`] for missing or unreadable files.
    /// Nothing is silently skipped.
    pub fn of_file(path: &Path) -> Result<Self> {
        Ok(ContentDigest(utils::hash_file_content(path)?))
    }

    /// Wrap a digest string read from persisted state
    pub fn from_hex(hex: impl Into<String>) -> Self {
        ContentDigest(hex.into())
    }

    /// Hex form of the digest
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        self.0.get(..end).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
