//! Provably-Fair Proof System
//!
//! Provides verifiable round outcomes through:
//! - A pre-round commitment (SHA-256 of the seed, plus the edge)
//! - A post-crash reveal of the seed
//! - Verification by recomputation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PROOF SYSTEM                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  commitment.rs   - Commit before bets, reveal after crash   │
//! │  verify.rs       - Recompute hash and crash point           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod commitment;
pub mod verify;

// Re-export key types
pub use commitment::{CommitmentError, RoundCommitment, RoundReveal};
pub use verify::{
    verify, verify_against, verify_record, verify_with_edge,
    RecordVerdict, Verification, VerificationError,
};
