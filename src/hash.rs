// src/hash.rs

//! Checksums, repository fingerprints and request digests
//!
//! - **Checksums** come from repository metadata (`sha256:<hex>`) and are
//!   carried verbatim into resolved package specifications.
//! - **Fingerprints** identify a repository configuration on disk (cache keys).
//! - **Digests** key the in-memory result memo (XXH3, never persisted).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::fmt;
use std::str::FromStr;
use xxhash_rust::xxh3::xxh3_128;

/// Checksum algorithms found in rpm-md metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChecksumType {
    Sha1,
    Sha224,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl ChecksumType {
    /// Get the algorithm name as a string
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Hex digest of `data`, or `None` if the algorithm cannot be computed here
    pub fn digest(&self, data: &[u8]) -> Option<String> {
        match self {
            Self::Sha1 => None,
            Self::Sha224 => Some(hex::encode(Sha224::digest(data))),
            Self::Sha256 => Some(hex::encode(Sha256::digest(data))),
            Self::Sha384 => Some(hex::encode(Sha384::digest(data))),
            Self::Sha512 => Some(hex::encode(Sha512::digest(data))),
        }
    }
}

impl fmt::Display for ChecksumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ChecksumType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            // "sha" is what old createrepo versions wrote for sha1
            "sha1" | "sha" => Ok(Self::Sha1),
            "sha224" => Ok(Self::Sha224),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            _ => Err(Error::Parse(format!("unknown checksum algorithm: {}", s))),
        }
    }
}

/// A checksum value with its algorithm
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum {
    pub algorithm: ChecksumType,
    /// Lowercase hex digest
    pub digest: String,
}

impl Checksum {
    pub fn new(algorithm: ChecksumType, digest: impl Into<String>) -> Result<Self> {
        let digest = digest.into();
        if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::Parse(format!("invalid {} digest '{}'", algorithm, digest)));
        }
        Ok(Self {
            algorithm,
            digest: digest.to_lowercase(),
        })
    }

    /// Parse a prefixed checksum string (e.g., "sha256:abc123...")
    pub fn parse_prefixed(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((algo, digest)) => Self::new(algo.parse()?, digest),
            None => Self::new(ChecksumType::Sha256, s),
        }
    }

    /// Format as a prefixed string (e.g., "sha256:abc123...")
    pub fn to_prefixed_string(&self) -> String {
        format!("{}:{}", self.algorithm.name(), self.digest)
    }

    /// Verify `data` against this checksum
    ///
    /// Returns `Ok(false)` when the algorithm cannot be computed locally.
    pub fn verify(&self, data: &[u8]) -> Result<bool> {
        match self.algorithm.digest(data) {
            Some(actual) if actual == self.digest => Ok(true),
            Some(actual) => Err(Error::Parse(format!(
                "{} mismatch: expected {}, got {}",
                self.algorithm, self.digest, actual
            ))),
            None => Ok(false),
        }
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_prefixed_string())
    }
}

impl TryFrom<String> for Checksum {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse_prefixed(&value)
    }
}

impl From<Checksum> for String {
    fn from(value: Checksum) -> Self {
        value.to_prefixed_string()
    }
}

/// Stable fingerprint of an ordered list of fields
///
/// Fields are NUL-separated so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn fingerprint<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update(field.as_bytes());
        hasher.update([0u8]);
    }
    let full = hex::encode(hasher.finalize());
    full[..32].to_string()
}

/// Fast digest of serialized request state for in-memory memoisation
#[inline]
pub fn request_digest(data: &[u8]) -> u128 {
    xxh3_128(data)
}
