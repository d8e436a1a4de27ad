//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are JSON text frames tagged by `type`.
//!
//! Nothing a client can receive before `round_crashed` carries the seed.

use serde::{Deserialize, Serialize};

use crate::core::derive::HouseEdge;
use crate::core::hash::SeedHash;
use crate::core::multiplier::Multiplier;
use crate::game::audit::AuditEntry;
use crate::game::bets::{BetError, BetId, CashOut};
use crate::game::events::RoundEvent;
use crate::game::history::HistoryRecord;
use crate::game::state::{PlayerId, RoundId, RoundPhase};
use crate::game::tick::{PlatformStats, RoundError};
use crate::proof::commitment::RoundCommitment;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bet on the round currently taking bets.
    PlaceBet {
        /// Stake in credits.
        amount: u64,
        /// Optional automatic exit point.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auto_cash_out: Option<f64>,
    },

    /// Cash out one of this connection's bets.
    CashOut {
        /// Bet to cash out.
        bet_id: BetId,
    },

    /// Recompute hash and crash point for a revealed seed.
    Verify {
        /// Revealed seed.
        server_seed: String,
        /// Edge the round was committed with.
        house_edge: f64,
        /// Commitment to check against, if the client kept it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_hash: Option<SeedHash>,
    },

    /// Recent settled rounds.
    History {
        /// Maximum records (newest first).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },

    /// Operator action, gated by the admin key.
    Admin {
        /// Configured admin key.
        key: String,
        /// What to do.
        action: AdminAction,
    },
}

/// Administrative actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdminAction {
    /// Change the edge for future rounds.
    SetHouseEdge {
        /// Edge percentage in `[0, 100)`.
        percent: f64,
    },
    /// Arm (or clear with `null`) the override for the next round.
    SetNextOverride {
        /// Crash point for the next round.
        value: Option<f64>,
    },
    /// End the ascending round at the current multiplier.
    ForceCrash,
    /// Read the audit trail and platform totals.
    AuditLog,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after the handshake.
    Welcome(WelcomeInfo),

    /// Round lifecycle notification.
    Event(RoundEvent),

    /// Bet accepted.
    BetAccepted {
        /// Round the bet rides on.
        round: RoundId,
        /// Bet identifier, needed to cash out.
        bet_id: BetId,
    },

    /// Manual cash-out succeeded.
    CashOutResult(CashOut),

    /// Result of a `verify` request.
    VerifyResult(VerifyInfo),

    /// Settled rounds, newest first.
    History {
        /// Records.
        records: Vec<HistoryRecord>,
    },

    /// Audit trail for an admin.
    AuditLog {
        /// Entries, newest first.
        entries: Vec<AuditEntry>,
        /// Platform totals.
        stats: PlatformStats,
    },

    /// Admin action applied.
    AdminAck {
        /// Edge now in effect for future rounds.
        house_edge: HouseEdge,
        /// Override armed for the next round.
        pending_override: Option<Multiplier>,
        /// Multiplier of a force-crash, if that was the action.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        crashed_at: Option<Multiplier>,
    },

    /// Pong response.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server wall clock (ms since epoch).
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why.
        reason: String,
    },
}

/// Connection greeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WelcomeInfo {
    /// Identifier assigned to this connection.
    pub player_id: PlayerId,
    /// Current phase.
    pub phase: RoundPhase,
    /// Commitment of the round in progress, if any.
    pub commitment: Option<RoundCommitment>,
    /// Edge that will apply to the next preparation.
    pub house_edge: HouseEdge,
    /// Server version.
    pub server_version: String,
}

/// Verification answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyInfo {
    /// SHA-256 of the supplied seed.
    pub hash: SeedHash,
    /// Crash point the seed derives to.
    pub crash_point: Multiplier,
    /// Whether the edge branch fired.
    pub instant_crash: bool,
    /// Whether `hash` equals the supplied commitment (if one was given).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches_commitment: Option<bool>,
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Error with a code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&RoundError> for ServerError {
    fn from(err: &RoundError) -> Self {
        let code = match err {
            RoundError::Entropy(_) => ErrorCode::RoundUnavailable,
            RoundError::Config(_) => ErrorCode::InvalidConfig,
            RoundError::Bet(BetError::BettingClosed) => ErrorCode::BettingClosed,
            RoundError::Bet(_) => ErrorCode::BetRejected,
            RoundError::NotAscending => ErrorCode::NotAscending,
            RoundError::RoundInProgress(_) => ErrorCode::InternalError,
        };
        Self::new(code, err.to_string())
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed message.
    InvalidInput,
    /// No round is taking bets.
    BettingClosed,
    /// Bet or cash-out refused.
    BetRejected,
    /// No round is ascending.
    NotAscending,
    /// Missing or wrong admin key.
    Unauthorized,
    /// Rejected edge or override.
    InvalidConfig,
    /// Round preparation is waiting for entropy.
    RoundUnavailable,
    /// Connection limit reached.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
