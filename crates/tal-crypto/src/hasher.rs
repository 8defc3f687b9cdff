use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::Digest;
use tal_types::{EntryHash, LedgerEntry};

/// Domain tag prepended to every entry digest.
const ENTRY_DOMAIN: &str = "tal-entry-v1";

/// Digest primitive backing an [`EntryHasher`].
///
/// Both produce 256-bit output, so the genesis sentinel is the same
/// 64-character zero string whichever one a deployment selects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = HasherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            _ => Err(HasherError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// Domain-separated entry hasher.
///
/// Input fields are encoded as `<byte length>:<bytes>;` each, after the
/// `tal-entry-v1:` tag. The length prefix keeps the encoding injective:
/// moving characters between adjacent fields always changes the digest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntryHasher {
    algorithm: DigestAlgorithm,
}

impl EntryHasher {
    pub const SHA256: Self = Self::new(DigestAlgorithm::Sha256);
    pub const BLAKE3: Self = Self::new(DigestAlgorithm::Blake3);

    pub const fn new(algorithm: DigestAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Canonical byte encoding of an ordered field list.
    pub fn canonical_bytes(fields: &[&str]) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            ENTRY_DOMAIN.len() + 1 + fields.iter().map(|f| f.len() + 8).sum::<usize>(),
        );
        out.extend_from_slice(ENTRY_DOMAIN.as_bytes());
        out.push(b':');
        for field in fields {
            out.extend_from_slice(field.len().to_string().as_bytes());
            out.push(b':');
            out.extend_from_slice(field.as_bytes());
            out.push(b';');
        }
        out
    }

    /// Digest an ordered field list. Pure and deterministic.
    pub fn digest(&self, fields: &[&str]) -> EntryHash {
        let data = Self::canonical_bytes(fields);
        let bytes: [u8; 32] = match self.algorithm {
            DigestAlgorithm::Sha256 => sha2::Sha256::digest(&data).into(),
            DigestAlgorithm::Blake3 => *blake3::hash(&data).as_bytes(),
        };
        EntryHash::from_bytes(bytes)
    }

    /// Hash of an entry's canonical fields. Ignores the stored `hash`.
    pub fn seal(&self, entry: &LedgerEntry) -> EntryHash {
        let fields = entry.canonical_fields();
        let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
        self.digest(&refs)
    }

    /// Returns `true` if the stored hash matches the recomputed one.
    pub fn verify(&self, entry: &LedgerEntry) -> bool {
        self.seal(entry) == entry.hash
    }
}

/// Errors from hasher configuration.
///
/// A missing digest primitive is a fatal startup condition, never something
/// to retry at runtime.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("unsupported digest algorithm {0:?} (expected \"sha256\" or \"blake3\")")]
    UnsupportedAlgorithm(String),
}
