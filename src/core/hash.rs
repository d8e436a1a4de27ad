//! Seed Commitment Hashing
//!
//! The commitment published before every round is the SHA-256 digest of
//! the server seed's UTF-8 bytes, hex encoded. Verification recomputes the
//! same digest, so this module is the single implementation both sides use.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Raw digest (256 bits / 32 bytes).
pub type Digest256 = [u8; 32];

/// SHA-256 commitment of a server seed.
///
/// Serializes as lower-case hex, which is also its `Display` form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeedHash(pub Digest256);

impl SeedHash {
    /// Parse a hex digest (either case).
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: Digest256 = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Lower-case hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &Digest256 {
        &self.0
    }
}

impl fmt::Display for SeedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SeedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeedHash({})", self.to_hex())
    }
}

impl Serialize for SeedHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SeedHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).ok_or_else(|| serde::de::Error::custom("expected 64 hex characters"))
    }
}

/// Compute the SHA-256 of arbitrary data.
pub fn hash_bytes(data: &[u8]) -> Digest256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Commitment of a seed string.
pub fn hash_seed(seed: &str) -> SeedHash {
    SeedHash(hash_bytes(seed.as_bytes()))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_golden_vector() {
        // These values must never change!
        // Every published commitment depends on them.
        assert_eq!(
            hash_seed("skyhigh-aviator").to_hex(),
            "ea65734588a229ccae28588b9bd88340fa4a57d1ef45fdc4789eb6ffbc4f13f9"
        );
        assert_eq!(
            hash_seed("").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_determinism() {
        assert_eq!(hash_seed("round-seed"), hash_seed("round-seed"));
        assert_ne!(hash_seed("round-seed"), hash_seed("round-seeD"));
    }

    #[test]
    fn test_hex_parse() {
        let hash = hash_seed("skyhigh-aviator");
        let upper = hash.to_hex().to_uppercase();
        assert_eq!(SeedHash::from_hex(&upper), Some(hash));
        assert_eq!(SeedHash::from_hex("abcd"), None);
        assert_eq!(SeedHash::from_hex("zz"), None);
    }

    #[test]
    fn test_serde_as_hex_string() {
        let hash = hash_seed("skyhigh-aviator");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
        let back: SeedHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
