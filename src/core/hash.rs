//! Hash Commitment Primitive
//!
//! Provides the nested SHA-256 commitment used by both parties:
//! - `co = H(s)` proves knowledge of the secret at reveal1
//! - `cv = H(co)` is published first and binds the party to `s`
//!
//! The chain uses plain SHA-256 without a domain prefix so that any
//! external tool can check `H(H(s)) == cv` from the published values.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hash output type (256 bits / 32 bytes).
pub type HashValue = [u8; 32];

/// Secret length in bytes.
pub const SECRET_LEN: usize = 32;

/// A party's private 32-byte randomness contribution.
///
/// Kept by the generating party until its reveal2 step.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret(#[serde(with = "hex_bytes")] pub [u8; SECRET_LEN]);

impl Secret {
    /// Wrap raw bytes.
    pub const fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        Self(bytes)
    }

    /// Draw a fresh secret from the operating system CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }

    /// Build the commitment chain for this secret.
    pub fn commit(&self) -> CommitmentChain {
        commit(self)
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret({}..)", short_hex(&self.0))
    }
}

/// The two published values derived from a secret.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentChain {
    /// `H(s)`, published at reveal1.
    #[serde(with = "hex_bytes")]
    pub co: HashValue,
    /// `H(co)`, published at commit time.
    #[serde(with = "hex_bytes")]
    pub cv: HashValue,
}

/// Compute `(co, cv)` for a secret.
pub fn commit(secret: &Secret) -> CommitmentChain {
    let co = hash_bytes(secret.as_bytes());
    let cv = hash_bytes(&co);
    CommitmentChain { co, cv }
}

/// Check that `secret` opens the published commitment `cv`.
pub fn verify(secret: &Secret, cv: &HashValue) -> bool {
    commit(secret).cv == *cv
}

/// Check that a reveal1 value hashes to the published commitment.
pub fn verify_hash(co: &HashValue, cv: &HashValue) -> bool {
    hash_bytes(co) == *cv
}

/// Incremental SHA-256 hasher for multi-field derivations.
///
/// Order of updates is significant.
pub struct ChainHasher {
    hasher: Sha256,
}

impl ChainHasher {
    /// Create a hasher with no domain prefix.
    pub fn new() -> Self {
        Self { hasher: Sha256::new() }
    }

    /// Create a hasher prefixed with a domain separator.
    pub fn with_domain(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> HashValue {
        self.hasher.finalize().into()
    }
}

impl Default for ChainHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute a plain SHA-256 of arbitrary data.
pub fn hash_bytes(data: &[u8]) -> HashValue {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// First four bytes as hex, for log lines.
pub fn short_hex(bytes: &[u8]) -> String {
    hex::encode(&bytes[..bytes.len().min(4)])
}

/// Parse a 32-byte value from a hex string (optional `0x` prefix).
pub fn parse_hash_hex(s: &str) -> Option<HashValue> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(trimmed).ok()?;
    bytes.try_into().ok()
}

/// Serde adapter for fixed byte arrays: hex strings in human-readable
/// formats (JSON), plain arrays in binary ones (bincode).
///
/// Use with `#[serde(with = "hex_bytes")]`.
pub mod hex_bytes {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize `bytes`.
    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        [u8; N]: Serialize,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(bytes))
        } else {
            bytes.serialize(serializer)
        }
    }

    /// Deserialize exactly `N` bytes; accepts an optional `0x` prefix.
    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
        [u8; N]: Deserialize<'de>,
    {
        if !deserializer.is_human_readable() {
            return <[u8; N]>::deserialize(deserializer);
        }
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(text.strip_prefix("0x").unwrap_or(&text)).map_err(D::Error::custom)?;
        let len = bytes.len();
        bytes
            .try_into()
            .map_err(|_| D::Error::custom(format!("expected {} bytes, got {}", N, len)))
    }
}

// =============================================================================
// TESTS
// =============================================================================
