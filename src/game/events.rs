//! Round Events
//!
//! Emitted by the controller on every state change, drained by whoever
//! drives it (the WebSocket server broadcasts them, the demo logs them).
//! Nothing in an event leaks the seed before `Crashed`.

use serde::{Deserialize, Serialize};

use crate::core::derive::HouseEdge;
use crate::core::hash::SeedHash;
use crate::core::multiplier::Multiplier;
use crate::game::bets::{BetId, CashOut, RoundStats};
use crate::game::history::Provenance;
use crate::game::state::{PlayerId, RoundId};

/// Something observers should know about.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoundEvent {
    /// Commitment published; bets open.
    Committed {
        /// Round.
        round: RoundId,
        /// SHA-256 of the secret seed.
        server_hash: SeedHash,
        /// Edge the crash point was derived with.
        house_edge: HouseEdge,
        /// Milliseconds until the ascent starts.
        starts_in_ms: u64,
    },

    /// Preparation blocked; the round stays in PREPARING.
    AwaitingEntropy {
        /// Source error text.
        reason: String,
    },

    /// A bet was accepted.
    BetPlaced {
        /// Round.
        round: RoundId,
        /// Bet.
        bet_id: BetId,
        /// Owner.
        player: PlayerId,
        /// Stake.
        amount: u64,
    },

    /// Ascent started.
    Started {
        /// Round.
        round: RoundId,
        /// Bets now flying.
        active_bets: usize,
    },

    /// Current multiplier (once per tick).
    Multiplier {
        /// Round.
        round: RoundId,
        /// Current value.
        value: Multiplier,
        /// Milliseconds since the ascent began.
        elapsed_ms: u64,
    },

    /// A bet was cashed out.
    CashedOut {
        /// Round.
        round: RoundId,
        /// Details.
        cash_out: CashOut,
        /// Triggered by the bet's auto target.
        automatic: bool,
    },

    /// Round crashed; the seed is revealed.
    Crashed {
        /// Round.
        round: RoundId,
        /// Multiplier it crashed at.
        crash_point: Multiplier,
        /// Revealed seed.
        server_seed: String,
        /// Commitment published before the round.
        server_hash: SeedHash,
        /// Organic, overridden or force-crashed.
        provenance: Provenance,
        /// Bets still riding that were lost.
        bets_lost: usize,
        /// Per-round totals.
        stats: RoundStats,
    },
}

impl RoundEvent {
    /// Round this event belongs to, if any.
    pub fn round(&self) -> Option<RoundId> {
        match self {
            RoundEvent::Committed { round, .. }
            | RoundEvent::BetPlaced { round, .. }
            | RoundEvent::Started { round, .. }
            | RoundEvent::Multiplier { round, .. }
            | RoundEvent::CashedOut { round, .. }
            | RoundEvent::Crashed { round, .. } => Some(*round),
            RoundEvent::AwaitingEntropy { .. } => None,
        }
    }
}
