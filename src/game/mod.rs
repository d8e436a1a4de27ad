//! Game Logic Module
//!
//! Everything that happens to a round between preparation and settlement.
//!
//! ## Module Structure
//!
//! - `state`: Identifiers, phases, the in-flight round
//! - `bets`: Stakes, cash-outs, per-round statistics
//! - `risk`: House edge and the one-shot override
//! - `audit`: Operator intervention trail
//! - `history`: Immutable settled-round records
//! - `events`: Notifications for observers
//! - `tick`: The round lifecycle controller

pub mod state;
pub mod bets;
pub mod risk;
pub mod audit;
pub mod history;
pub mod events;
pub mod tick;

// Re-export key types
pub use state::{PlayerId, Round, RoundId, RoundOutcome, RoundPhase};
pub use bets::{Bet, BetBook, BetError, BetId, BetStatus, CashOut, RoundStats};
pub use risk::{ConfigError, RiskControls, RoundInput};
pub use audit::{AuditEntry, AuditKind, AuditLog};
pub use history::{History, HistoryRecord, Provenance};
pub use events::RoundEvent;
pub use tick::{generate_round, EngineConfig, PlatformStats, RoundController, RoundError};
