//! Bets and Cash-outs
//!
//! Bookkeeping for the stakes placed on one round. Amounts are opaque
//! integer credits; no balance or payment handling happens here.
//!
//! Bet lifecycle:
//!
//! ```text
//! Pending ──(ascent starts)──> Active ──(cash out)──> Won
//!                                 └────(crash)──────> Lost
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::multiplier::Multiplier;
use crate::game::state::PlayerId;

/// Unique bet identifier (UUID as bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BetId(pub [u8; 16]);

impl BetId {
    /// Fresh random identifier.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().into_bytes())
    }
}

/// Errors from bet placement and cash-out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BetError {
    /// Bets are only taken while a committed round is preparing.
    #[error("Betting is closed")]
    BettingClosed,

    /// Zero stake.
    #[error("Bet amount must be positive")]
    ZeroAmount,

    /// Auto cash-out target below 1.01x or not in whole hundredths.
    #[error("Auto cash-out target must be above 1.00x in whole hundredths")]
    InvalidTarget,

    /// No such bet in the current round.
    #[error("Unknown bet")]
    UnknownBet,

    /// The bet is not flying (pending, already won, or lost).
    #[error("Bet is not active")]
    NotActive,
}

/// Where a bet stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetStatus {
    /// Placed, round not yet ascending.
    Pending,
    /// Riding the multiplier.
    Active,
    /// Cashed out.
    Won {
        /// Multiplier locked in.
        at: Multiplier,
        /// Credits returned (stake included).
        payout: u64,
    },
    /// Still active when the round crashed.
    Lost,
}

/// A single stake.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    /// Identifier.
    pub id: BetId,
    /// Owner.
    pub player: PlayerId,
    /// Stake in credits.
    pub amount: u64,
    /// Automatic exit point, if any.
    pub auto_cash_out: Option<Multiplier>,
    /// Current status.
    pub status: BetStatus,
}

/// A completed cash-out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashOut {
    /// Bet cashed out.
    pub bet_id: BetId,
    /// Owner.
    pub player: PlayerId,
    /// Multiplier locked in.
    pub at: Multiplier,
    /// Credits returned.
    pub payout: u64,
}

/// Aggregated per-round player statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundStats {
    /// Distinct players with a bet.
    pub total_players: u32,
    /// Bets placed.
    pub total_bets: u32,
    /// Credits staked.
    pub total_wagered: u64,
    /// Credits paid out.
    pub total_payout: u64,
}

/// All bets of one round.
#[derive(Clone, Debug, Default)]
pub struct BetBook {
    bets: BTreeMap<BetId, Bet>,
}

impl BetBook {
    /// Empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new pending bet.
    pub fn place(
        &mut self,
        player: PlayerId,
        amount: u64,
        auto_cash_out: Option<f64>,
    ) -> Result<&Bet, BetError> {
        if amount == 0 {
            return Err(BetError::ZeroAmount);
        }
        let auto_cash_out = match auto_cash_out {
            Some(target) => match Multiplier::exact_from_f64(target) {
                Some(m) if m > Multiplier::ONE => Some(m),
                _ => return Err(BetError::InvalidTarget),
            },
            None => None,
        };

        let id = BetId::random();
        let bet = Bet {
            id,
            player,
            amount,
            auto_cash_out,
            status: BetStatus::Pending,
        };
        Ok(self.bets.entry(id).or_insert(bet))
    }

    /// Look up a bet.
    pub fn get(&self, id: &BetId) -> Option<&Bet> {
        self.bets.get(id)
    }

    /// Iterate bets in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Bet> {
        self.bets.values()
    }

    /// Number of bets.
    pub fn len(&self) -> usize {
        self.bets.len()
    }

    /// True if no bets were placed.
    pub fn is_empty(&self) -> bool {
        self.bets.is_empty()
    }

    /// Pending bets start flying. Returns how many were activated.
    pub fn activate_all(&mut self) -> usize {
        let mut count = 0;
        for bet in self.bets.values_mut() {
            if bet.status == BetStatus::Pending {
                bet.status = BetStatus::Active;
                count += 1;
            }
        }
        count
    }

    /// Cash out an active bet at `at`.
    pub fn cash_out(&mut self, id: &BetId, at: Multiplier) -> Result<CashOut, BetError> {
        let bet = self.bets.get_mut(id).ok_or(BetError::UnknownBet)?;
        if bet.status != BetStatus::Active {
            return Err(BetError::NotActive);
        }
        let payout = at.payout(bet.amount);
        bet.status = BetStatus::Won { at, payout };
        Ok(CashOut {
            bet_id: bet.id,
            player: bet.player,
            at,
            payout,
        })
    }

    /// Active bets whose auto target is reached by `current` and lies
    /// strictly below `crash_point`. Each is cashed out at its target.
    pub fn run_auto_cash_outs(&mut self, current: Multiplier, crash_point: Multiplier) -> Vec<CashOut> {
        let due: Vec<(BetId, Multiplier)> = self
            .bets
            .values()
            .filter(|b| b.status == BetStatus::Active)
            .filter_map(|b| b.auto_cash_out.map(|t| (b.id, t)))
            .filter(|(_, target)| *target <= current && *target < crash_point)
            .collect();

        due.into_iter()
            .filter_map(|(id, target)| self.cash_out(&id, target).ok())
            .collect()
    }

    /// Resolve every still-active (or never activated) bet as lost.
    ///
    /// Returns the number of bets lost.
    pub fn settle(&mut self) -> usize {
        let mut lost = 0;
        for bet in self.bets.values_mut() {
            if matches!(bet.status, BetStatus::Active | BetStatus::Pending) {
                bet.status = BetStatus::Lost;
                lost += 1;
            }
        }
        lost
    }

    /// Aggregate statistics.
    pub fn stats(&self) -> RoundStats {
        let players: BTreeSet<PlayerId> = self.bets.values().map(|b| b.player).collect();
        let mut total_wagered = 0u64;
        let mut total_payout = 0u64;
        for bet in self.bets.values() {
            total_wagered = total_wagered.saturating_add(bet.amount);
            if let BetStatus::Won { payout, .. } = bet.status {
                total_payout = total_payout.saturating_add(payout);
            }
        }
        RoundStats {
            total_players: players.len() as u32,
            total_bets: self.bets.len() as u32,
            total_wagered,
            total_payout,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn player(n: u8) -> PlayerId {
        PlayerId::new([n; 16])
    }

    #[test]
    fn test_place_validation() {
        let mut book = BetBook::new();
        assert_eq!(book.place(player(1), 0, None).unwrap_err(), BetError::ZeroAmount);
        assert_eq!(book.place(player(1), 10, Some(1.0)).unwrap_err(), BetError::InvalidTarget);
        assert_eq!(book.place(player(1), 10, Some(0.3)).unwrap_err(), BetError::InvalidTarget);
        assert_eq!(book.place(player(1), 10, Some(2.555)).unwrap_err(), BetError::InvalidTarget);
        let bet = book.place(player(1), 10, Some(2.0)).unwrap();
        assert_eq!(bet.status, BetStatus::Pending);
        assert_eq!(bet.auto_cash_out, Some(Multiplier::from_hundredths(200)));
    }

    #[test]
    fn test_cash_out_requires_active() {
        let mut book = BetBook::new();
        let id = book.place(player(1), 100, None).unwrap().id;
        let at = Multiplier::from_hundredths(150);

        assert_eq!(book.cash_out(&id, at).unwrap_err(), BetError::NotActive);
        book.activate_all();

        let cash = book.cash_out(&id, at).unwrap();
        assert_eq!(cash.payout, 150);
        assert_eq!(book.cash_out(&id, at).unwrap_err(), BetError::NotActive);
        assert_eq!(
            book.cash_out(&BetId([9; 16]), at).unwrap_err(),
            BetError::UnknownBet
        );
    }

    #[test]
    fn test_auto_cash_out_pays_target() {
        let mut book = BetBook::new();
        let early = book.place(player(1), 100, Some(1.5)).unwrap().id;
        let late = book.place(player(2), 100, Some(5.0)).unwrap().id;
        book.activate_all();

        let crash = Multiplier::from_hundredths(400);
        let cashed = book.run_auto_cash_outs(Multiplier::from_hundredths(160), crash);
        assert_eq!(cashed.len(), 1);
        assert_eq!(cashed[0].bet_id, early);
        assert_eq!(cashed[0].at, Multiplier::from_hundredths(150));

        // Target above the crash point never pays
        let cashed = book.run_auto_cash_outs(Multiplier::from_hundredths(600), crash);
        assert!(cashed.is_empty());
        assert_eq!(book.get(&late).unwrap().status, BetStatus::Active);
    }

    #[test]
    fn test_settle_and_stats() {
        let mut book = BetBook::new();
        let a = book.place(player(1), 100, None).unwrap().id;
        book.place(player(1), 50, None).unwrap();
        book.place(player(2), 25, None).unwrap();
        book.activate_all();
        book.cash_out(&a, Multiplier::from_hundredths(300)).unwrap();

        assert_eq!(book.settle(), 2);
        let stats = book.stats();
        assert_eq!(stats.total_players, 2);
        assert_eq!(stats.total_bets, 3);
        assert_eq!(stats.total_wagered, 175);
        assert_eq!(stats.total_payout, 300);
        assert!(book.iter().filter(|b| b.status == BetStatus::Lost).count() == 2);
    }

    #[test]
    fn test_stats_saturate_on_huge_stakes() {
        let mut book = BetBook::new();
        let a = book.place(player(1), u64::MAX, None).unwrap().id;
        let b = book.place(player(2), u64::MAX, None).unwrap().id;
        book.activate_all();
        book.cash_out(&a, Multiplier::from_hundredths(200)).unwrap();
        book.cash_out(&b, Multiplier::from_hundredths(200)).unwrap();

        let stats = book.stats();
        assert_eq!(stats.total_wagered, u64::MAX);
        assert_eq!(stats.total_payout, u64::MAX);
    }
}
