//! Content identifiers.
//!
//! Every commit, perspective and data object is identified by the SHA-256
//! hash of its canonical encoding. The same object always yields the same
//! CID, which is what makes the merge engine's identity checks sound.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 32-byte SHA-256 hash used as a Content Identifier (CID).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid([u8; 32]);

impl Cid {
    /// Create a CID from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Cid(bytes)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The zero CID (never produced by hashing, useful as a sentinel in tests).
    pub fn zero() -> Self {
        Cid([0u8; 32])
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 64 {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex_str = std::str::from_utf8(chunk).ok()?;
            bytes[i] = u8::from_str_radix(hex_str, 16).ok()?;
        }
        Some(Cid(bytes))
    }

    /// Truncated display (first 8 chars), for logs.
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// CIDs cross the JSON boundary as hex strings so they can live inside
// arbitrary data payloads (link lists) unchanged.
impl Serialize for Cid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Cid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Cid::from_hex(&s).ok_or_else(|| D::Error::custom(format!("invalid cid: {s}")))
    }
}

/// Hash algorithm selector for [`CidConfig`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    Sha2_256,
}

/// Text encoding selector for [`CidConfig`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CidEncoding {
    Base16,
}

/// Configuration for CID derivation.
///
/// Determinism contract: the same object hashed under the same config always
/// yields the same CID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidConfig {
    pub algorithm: HashAlgorithm,
    pub encoding: CidEncoding,
}

impl Default for CidConfig {
    fn default() -> Self {
        CidConfig {
            algorithm: HashAlgorithm::Sha2_256,
            encoding: CidEncoding::Base16,
        }
    }
}

impl CidConfig {
    /// Hash raw bytes under this config.
    pub fn hash(&self, data: &[u8]) -> Cid {
        match self.algorithm {
            HashAlgorithm::Sha2_256 => {
                let result = Sha256::digest(data);
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(&result);
                Cid(bytes)
            }
        }
    }
}
