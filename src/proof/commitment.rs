//! Round Commitment Protocol
//!
//! Commit to the seed before bets are taken, reveal it after the crash.
//! The commitment also pins the house edge so the reveal can be checked
//! against the edge that was actually in effect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::derive::{derive, HouseEdge};
use crate::core::hash::{hash_seed, SeedHash};
use crate::core::multiplier::Multiplier;
use crate::game::history::HistoryRecord;
use crate::game::state::RoundId;

/// Pre-round commitment, published when the round enters PREPARING.
///
/// Cannot be changed after it is published.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundCommitment {
    /// Round number.
    pub round_id: RoundId,

    /// SHA-256 of the secret seed.
    pub server_hash: SeedHash,

    /// Edge the crash point was derived with.
    pub house_edge: HouseEdge,

    /// When the commitment was published.
    pub committed_at: DateTime<Utc>,
}

/// Reveal structure (published after the round crashes).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundReveal {
    /// Round number.
    pub round_id: RoundId,

    /// The original seed.
    pub server_seed: String,

    /// Edge claimed for the derivation.
    pub house_edge: HouseEdge,

    /// Multiplier the round crashed at.
    pub crash_point: Multiplier,
}

impl RoundReveal {
    /// Reveal for a settled round.
    pub fn from_record(record: &HistoryRecord) -> Self {
        Self {
            round_id: record.round_id(),
            server_seed: record.server_seed().to_string(),
            house_edge: record.house_edge(),
            crash_point: record.crash_point(),
        }
    }

    /// Crash point the seed derives to under the revealed edge.
    pub fn derived_crash_point(&self) -> Multiplier {
        derive(&self.server_seed, self.house_edge).crash_point
    }

    /// Verify the reveal against a commitment.
    ///
    /// Only the binding is checked here (round, edge, hash). Whether the
    /// crash point was organic is answered by [`crate::proof::verify_record`].
    pub fn verify(&self, commitment: &RoundCommitment) -> Result<(), CommitmentError> {
        if self.round_id != commitment.round_id {
            return Err(CommitmentError::RoundMismatch {
                expected: commitment.round_id,
                got: self.round_id,
            });
        }

        if self.house_edge != commitment.house_edge {
            return Err(CommitmentError::EdgeMismatch {
                expected: commitment.house_edge,
                got: self.house_edge,
            });
        }

        let computed = hash_seed(&self.server_seed);
        if computed != commitment.server_hash {
            return Err(CommitmentError::HashMismatch {
                expected: commitment.server_hash,
                computed,
            });
        }

        Ok(())
    }
}

/// Errors that can occur during commitment verification.
///
/// These are detection signals, not faults: a mismatch means the reveal
/// does not belong to the commitment.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitmentError {
    /// Revealed seed doesn't hash to the commitment.
    HashMismatch {
        /// Published commitment.
        expected: SeedHash,
        /// Hash of the revealed seed.
        computed: SeedHash,
    },

    /// Revealed edge differs from the committed edge.
    EdgeMismatch {
        /// Committed edge.
        expected: HouseEdge,
        /// Revealed edge.
        got: HouseEdge,
    },

    /// Reveal belongs to another round.
    RoundMismatch {
        /// Committed round.
        expected: RoundId,
        /// Revealed round.
        got: RoundId,
    },
}

impl std::fmt::Display for CommitmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HashMismatch { expected, computed } => {
                write!(f, "Seed hash mismatch: committed {}, revealed seed hashes to {}", expected, computed)
            }
            Self::EdgeMismatch { expected, got } => {
                write!(f, "House edge mismatch: committed {}, revealed {}", expected, got)
            }
            Self::RoundMismatch { expected, got } => {
                write!(f, "Round mismatch: committed {}, revealed {}", expected, got)
            }
        }
    }
}

impl std::error::Error for CommitmentError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn commitment_for(seed: &str, edge: HouseEdge) -> RoundCommitment {
        RoundCommitment {
            round_id: RoundId(7),
            server_hash: hash_seed(seed),
            house_edge: edge,
            committed_at: Utc::now(),
        }
    }

    fn reveal_for(seed: &str, edge: HouseEdge) -> RoundReveal {
        RoundReveal {
            round_id: RoundId(7),
            server_seed: seed.to_string(),
            house_edge: edge,
            crash_point: derive(seed, edge).crash_point,
        }
    }

    #[test]
    fn test_reveal_verification() {
        let edge = HouseEdge::default();
        let commitment = commitment_for("test-seed", edge);
        let reveal = reveal_for("test-seed", edge);

        assert!(reveal.verify(&commitment).is_ok());
        assert_eq!(reveal.derived_crash_point().hundredths(), 595);
    }

    #[test]
    fn test_swapped_seed_fails() {
        let edge = HouseEdge::default();
        let commitment = commitment_for("test-seed", edge);
        let reveal = reveal_for("another-seed", edge);

        assert!(matches!(reveal.verify(&commitment), Err(CommitmentError::HashMismatch { .. })));
    }

    #[test]
    fn test_edge_and_round_must_match() {
        let commitment = commitment_for("test-seed", HouseEdge::default());

        let reveal = reveal_for("test-seed", HouseEdge::ZERO);
        assert!(matches!(reveal.verify(&commitment), Err(CommitmentError::EdgeMismatch { .. })));

        let mut reveal = reveal_for("test-seed", HouseEdge::default());
        reveal.round_id = RoundId(8);
        assert!(matches!(reveal.verify(&commitment), Err(CommitmentError::RoundMismatch { .. })));
    }

    #[test]
    fn test_commitment_json_has_no_seed() {
        let commitment = commitment_for("test-seed", HouseEdge::default());
        let json = serde_json::to_string(&commitment).unwrap();
        assert!(json.contains(&hash_seed("test-seed").to_hex()));
        assert!(!json.contains("test-seed"));
    }
}
