use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Digest output length in bytes. Every supported digest is 256-bit.
pub const HASH_LEN: usize = 32;

/// 256-bit entry digest.
///
/// Displayed and serialized as 64 lowercase hex characters. The all-zero
/// value is the genesis sentinel: the `previous_hash` of the first entry,
/// meaning "no predecessor".
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryHash([u8; HASH_LEN]);

impl EntryHash {
    /// Genesis sentinel. Its hex form is exactly 64 `'0'` characters.
    pub const GENESIS: Self = Self([0u8; HASH_LEN]);

    /// Wrap a pre-computed digest.
    pub const fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns `true` if this is the genesis sentinel.
    pub fn is_genesis(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Full lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex characters, for log lines and terminal output.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != HASH_LEN {
            return Err(TypeError::InvalidLength {
                expected: HASH_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; HASH_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for EntryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryHash({})", self.short_hex())
    }
}

impl fmt::Display for EntryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for EntryHash {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<EntryHash> for String {
    fn from(hash: EntryHash) -> Self {
        hash.to_hex()
    }
}

impl From<[u8; HASH_LEN]> for EntryHash {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }
}
