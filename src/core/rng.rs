//! Server Seed Generation
//!
//! Every round is driven by a fresh server seed drawn from the operating
//! system CSPRNG. The seed stays secret until the round settles; only its
//! SHA-256 commitment is published beforehand.
//!
//! There is no fallback generator. If the OS source cannot be
//! read the round must not start.

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// Number of independent 32-bit draws combined into one seed.
pub const SEED_WORDS: usize = 8;

/// Length of an encoded seed in hex characters.
pub const SEED_HEX_LEN: usize = SEED_WORDS * 8;

/// The secure random source could not be read.
#[derive(Debug, Clone, Error)]
#[error("Entropy source unavailable: {reason}")]
pub struct EntropyError {
    /// Description reported by the underlying source.
    pub reason: String,
}

/// A round's server seed.
///
/// `Debug` is redacted so a seed cannot leak through log lines before it
/// is revealed. Use [`ServerSeed::as_str`] at reveal time.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerSeed(String);

impl ServerSeed {
    /// Wrap an already revealed seed string (verification side).
    pub fn from_revealed(seed: impl Into<String>) -> Self {
        Self(seed.into())
    }

    /// Raw seed text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the raw seed text.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for ServerSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerSeed(<{} chars redacted>)", self.0.len())
    }
}

/// Anything able to hand out fresh server seeds.
///
/// The round controller only sees this trait, so tests can script seeds
/// or simulate an exhausted entropy source.
pub trait SeedSource: Send {
    /// Produce the next seed.
    fn next_seed(&mut self) -> Result<ServerSeed, EntropyError>;
}

/// Seed source backed by the operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSeedSource;

impl SeedSource for OsSeedSource {
    fn next_seed(&mut self) -> Result<ServerSeed, EntropyError> {
        generate_server_seed()
    }
}

/// Generate a fresh 64-hex-character server seed.
///
/// Draws [`SEED_WORDS`] independent 32-bit values from `OsRng` and renders
/// each as eight zero-padded lower-case hex digits.
pub fn generate_server_seed() -> Result<ServerSeed, EntropyError> {
    let mut words = [0u32; SEED_WORDS];
    for word in words.iter_mut() {
        let mut buf = [0u8; 4];
        OsRng.try_fill_bytes(&mut buf).map_err(|e| EntropyError {
            reason: e.to_string(),
        })?;
        *word = u32::from_be_bytes(buf);
    }
    Ok(encode_words(&words))
}

/// Render seed words as concatenated fixed-width hex.
fn encode_words(words: &[u32; SEED_WORDS]) -> ServerSeed {
    let mut out = String::with_capacity(SEED_HEX_LEN);
    for word in words {
        out.push_str(&format!("{:08x}", word));
    }
    ServerSeed(out)
}


// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_seed_shape() {
        let seed = generate_server_seed().unwrap();
        assert_eq!(seed.as_str().len(), SEED_HEX_LEN);
        assert!(seed
            .as_str()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_seeds_do_not_repeat() {
        let seeds: BTreeSet<String> = (0..256)
            .map(|_| generate_server_seed().unwrap().into_string())
            .collect();
        assert_eq!(seeds.len(), 256);
    }

    #[test]
    fn test_encode_words_pads() {
        let seed = encode_words(&[0, 1, 0xff, 0xdead_beef, 0, 0, 0, u32::MAX]);
        let expected = concat!(
            "00000000", "00000001", "000000ff", "deadbeef",
            "00000000", "00000000", "00000000", "ffffffff",
        );
        assert_eq!(seed.as_str(), expected);
    }

    #[test]
    fn test_debug_is_redacted() {
        let seed = ServerSeed::from_revealed("super-secret");
        let shown = format!("{:?}", seed);
        assert!(!shown.contains("super-secret"));
    }

    #[test]
    fn test_scripted_source_failure() {
        let mut source = testing::ScriptedSource::new().failure().seed("abc");
        assert!(source.next_seed().is_err());
        assert_eq!(source.next_seed().unwrap().as_str(), "abc");
    }
}
