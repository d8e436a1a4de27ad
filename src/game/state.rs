//! Round State Definitions
//!
//! Identifiers, the phase machine and the per-round data the controller
//! owns between preparation and settlement.

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::derive::{CrashDerivation, HouseEdge};
use crate::core::hash::SeedHash;
use crate::core::multiplier::Multiplier;
use crate::core::rng::ServerSeed;
use crate::game::bets::BetBook;
use crate::game::risk::RoundInput;
use crate::proof::commitment::RoundCommitment;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Unique player identifier (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct PlayerId(pub [u8; 16]);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Fresh random identifier.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().into_bytes())
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s)
            .ok()
            .map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }
}

/// Sequential round number. Survives restarts through the snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct RoundId(pub u64);

impl RoundId {
    /// The id after this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// PHASE
// =============================================================================

/// Round lifecycle phase.
///
/// ```text
/// PREPARING ──(commit delay)──> ASCENDING ──(crash)──> SETTLED ──(hold)──┐
///     ^                                                                   │
///     └───────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Commitment published (or awaiting entropy), bets open.
    Preparing,
    /// Multiplier climbing, cash-outs open.
    Ascending,
    /// Crashed, seed revealed, holding before the next round.
    Settled,
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoundPhase::Preparing => "PREPARING",
            RoundPhase::Ascending => "ASCENDING",
            RoundPhase::Settled => "SETTLED",
        };
        f.write_str(s)
    }
}

// =============================================================================
// OUTCOME
// =============================================================================

/// Crash point computed once, at preparation time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    /// Effective crash point for the round.
    pub crash_point: Multiplier,
    /// What the seed produced, whatever the input.
    pub derivation: CrashDerivation,
    /// Edge in effect when the crash point was derived.
    pub house_edge: HouseEdge,
    /// Organic or operator-forced.
    pub input: RoundInput,
}

impl RoundOutcome {
    /// Resolve the effective crash point from a derivation and the input.
    pub fn new(derivation: CrashDerivation, house_edge: HouseEdge, input: RoundInput) -> Self {
        let crash_point = match input {
            RoundInput::Organic => derivation.crash_point,
            RoundInput::Forced(value) => value,
        };
        Self {
            crash_point,
            derivation,
            house_edge,
            input,
        }
    }
}

// =============================================================================
// ROUND
// =============================================================================

/// A round between preparation and settlement.
///
/// The seed stays inside this struct until the controller settles the
/// round; nothing outside the controller can read it before then.
#[derive(Debug)]
pub struct Round {
    /// Round number.
    pub id: RoundId,
    pub(crate) seed: ServerSeed,
    /// Published commitment.
    pub hash: SeedHash,
    /// Crash point and how it was chosen.
    pub outcome: RoundOutcome,
    /// Bets placed on this round.
    pub bets: BetBook,
    /// When the commitment was published.
    pub committed_at: DateTime<Utc>,
    /// When the ascent started.
    pub started_at: Option<Instant>,
    /// Set when the operator ended the ascent early.
    pub forced_crash_at: Option<Multiplier>,
    /// Multiplier the round actually crashed at.
    pub crashed_at: Option<Multiplier>,
}

impl Round {
    /// Crash point in effect right now (forced crash wins).
    pub fn effective_crash_point(&self) -> Multiplier {
        self.forced_crash_at.unwrap_or(self.outcome.crash_point)
    }

    /// The public commitment for this round.
    pub fn commitment(&self) -> RoundCommitment {
        RoundCommitment {
            round_id: self.id,
            server_hash: self.hash,
            house_edge: self.outcome.house_edge,
            committed_at: self.committed_at,
        }
    }
}
