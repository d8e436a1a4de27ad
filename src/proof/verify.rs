//! Verification API
//!
//! Recompute a round's commitment and crash point from its revealed seed.
//! Pure functions over the same `core` hasher and deriver the controller
//! uses; anyone holding a revealed seed gets the same answer.

use serde::{Deserialize, Serialize};

use crate::core::derive::{derive, CrashDerivation, HouseEdge};
use crate::core::hash::{hash_seed, SeedHash};
use crate::core::multiplier::Multiplier;
use crate::game::history::{HistoryRecord, Provenance};

/// Result of recomputing a revealed seed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    /// SHA-256 of the seed; compare with the published commitment.
    pub hash: SeedHash,

    /// Crash point the seed derives to; compare with the observed crash.
    pub crash_point: Multiplier,

    /// Intermediate values of the derivation.
    pub derivation: CrashDerivation,
}

/// Errors that can occur during verification.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationError {
    /// Edge outside `[0, 100)`.
    InvalidEdge(f64),

    /// Seed does not hash to the expected commitment.
    HashMismatch {
        /// Commitment the caller holds.
        expected: SeedHash,
        /// Hash of the supplied seed.
        computed: SeedHash,
    },
}

impl std::fmt::Display for VerificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEdge(value) => write!(f, "Invalid house edge: {}", value),
            Self::HashMismatch { expected, computed } => {
                write!(f, "Hash mismatch: expected {}, computed {}", expected, computed)
            }
        }
    }
}

impl std::error::Error for VerificationError {}

/// Recompute hash and crash point for a revealed seed.
pub fn verify(seed: &str, edge_percent: f64) -> Result<Verification, VerificationError> {
    let edge = HouseEdge::new(edge_percent).map_err(|e| VerificationError::InvalidEdge(e.0))?;
    Ok(verify_with_edge(seed, edge))
}

/// [`verify`] with an already validated edge.
pub fn verify_with_edge(seed: &str, edge: HouseEdge) -> Verification {
    let derivation = derive(seed, edge);
    Verification {
        hash: hash_seed(seed),
        crash_point: derivation.crash_point,
        derivation,
    }
}

/// Recompute and check the seed against a published commitment.
pub fn verify_against(
    seed: &str,
    edge_percent: f64,
    expected: &SeedHash,
) -> Result<Verification, VerificationError> {
    let verification = verify(seed, edge_percent)?;
    if verification.hash != *expected {
        return Err(VerificationError::HashMismatch {
            expected: *expected,
            computed: verification.hash,
        });
    }
    Ok(verification)
}

/// Outcome of auditing one history record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum RecordVerdict {
    /// Hash matches and the crash point is what the seed derives to.
    Fair,

    /// Hash matches, but the operator overrode or cut the outcome.
    OperatorForced {
        /// How the outcome was forced.
        provenance: Provenance,
        /// What the seed derives to.
        derived: Multiplier,
        /// What was recorded.
        recorded: Multiplier,
    },

    /// Organic round whose recorded crash point differs from the seed's.
    CrashMismatch {
        /// What the seed derives to.
        derived: Multiplier,
        /// What was recorded.
        recorded: Multiplier,
    },

    /// Revealed seed does not hash to the stored commitment.
    HashMismatch {
        /// Stored commitment.
        expected: SeedHash,
        /// Hash of the stored seed.
        computed: SeedHash,
    },
}

impl RecordVerdict {
    /// True only for [`RecordVerdict::Fair`].
    pub fn is_fair(&self) -> bool {
        matches!(self, RecordVerdict::Fair)
    }
}

/// Audit a settled round from its own record.
pub fn verify_record(record: &HistoryRecord) -> RecordVerdict {
    let check = verify_with_edge(record.server_seed(), record.house_edge());

    if check.hash != record.server_hash() {
        return RecordVerdict::HashMismatch {
            expected: record.server_hash(),
            computed: check.hash,
        };
    }

    let recorded = record.crash_point();
    match record.provenance() {
        Provenance::Organic if check.crash_point == recorded => RecordVerdict::Fair,
        Provenance::Organic => RecordVerdict::CrashMismatch {
            derived: check.crash_point,
            recorded,
        },
        provenance => RecordVerdict::OperatorForced {
            provenance,
            derived: check.crash_point,
            recorded,
        },
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::history::testing::{organic_record, with_crash_point};
    use proptest::prelude::*;

    #[test]
    fn test_verify_golden_vectors() {
        let v = verify("skyhigh-aviator", 3.0).unwrap();
        assert_eq!(
            v.hash.to_hex(),
            "ea65734588a229ccae28588b9bd88340fa4a57d1ef45fdc4789eb6ffbc4f13f9"
        );
        assert_eq!(v.crash_point.hundredths(), 819);

        let v = verify("test-seed", 0.0).unwrap();
        assert_eq!(v.crash_point.hundredths(), 614);
        assert!(!v.derivation.instant_crash);
    }

    #[test]
    fn test_verify_rejects_bad_edge() {
        assert_eq!(verify("x", 100.0), Err(VerificationError::InvalidEdge(100.0)));
        assert!(matches!(verify("x", -1.0), Err(VerificationError::InvalidEdge(_))));
        assert!(matches!(verify("x", f64::NAN), Err(VerificationError::InvalidEdge(_))));
    }

    #[test]
    fn test_verify_against_commitment() {
        let commitment = hash_seed("test-seed");
        assert!(verify_against("test-seed", 3.0, &commitment).is_ok());
        assert!(matches!(
            verify_against("test-seed!", 3.0, &commitment),
            Err(VerificationError::HashMismatch { .. })
        ));
    }

    #[test]
    fn test_verify_record_fair() {
        let record = organic_record(1, "test-seed");
        assert!(verify_record(&record).is_fair());
    }

    #[test]
    fn test_verify_record_detects_altered_crash() {
        let record = with_crash_point(organic_record(1, "test-seed"), Multiplier::from_hundredths(120));
        assert_eq!(
            verify_record(&record),
            RecordVerdict::CrashMismatch {
                derived: Multiplier::from_hundredths(595),
                recorded: Multiplier::from_hundredths(120),
            }
        );
    }

    proptest! {
        #[test]
        fn prop_commitment_integrity(seed in "[0-9a-f]{64}", edge in 0.0f64..99.0) {
            let first = verify(&seed, edge).unwrap();
            let second = verify(&seed, edge).unwrap();
            prop_assert_eq!(first, second);
            prop_assert_eq!(first.hash, hash_seed(&seed));
            prop_assert!(verify_against(&seed, edge, &first.hash).is_ok());
        }
    }
}
