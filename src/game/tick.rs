//! Round Lifecycle Controller
//!
//! The authoritative state machine:
//!
//! ```text
//! PREPARING   generate seed, publish SHA-256, derive crash point
//!             (consumes the pending override), take bets
//!      │      commit delay
//!      v
//! ASCENDING   multiplier(t) = e^(k·t), cash-outs accepted while
//!      │      multiplier < crash point
//!      v      multiplier >= crash point, or operator force-crash
//! SETTLED     reveal seed, append history, resolve bets
//!      │      hold delay
//!      └────> PREPARING
//! ```
//!
//! Time is passed in by the caller (`Instant`), so the controller is a
//! plain synchronous value: the server ticks it from one task, tests tick
//! it with synthetic instants. Rounds never overlap.

use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::core::derive::{derive, HouseEdge};
use crate::core::hash::{hash_seed, SeedHash};
use crate::core::multiplier::{GrowthCurve, Multiplier};
use crate::core::rng::{EntropyError, SeedSource, ServerSeed};
use crate::game::audit::{AuditKind, AuditLog, DEFAULT_AUDIT_CAPACITY};
use crate::game::bets::{BetBook, BetError, BetId, CashOut};
use crate::game::events::RoundEvent;
use crate::game::history::{History, HistoryRecord, DEFAULT_HISTORY_CAPACITY};
use crate::game::risk::{ConfigError, RiskControls, RoundInput};
use crate::game::state::{PlayerId, Round, RoundId, RoundOutcome, RoundPhase};
use crate::proof::commitment::RoundCommitment;
use crate::store::Snapshot;

/// Errors surfaced by controller operations.
#[derive(Debug, Clone, Error)]
pub enum RoundError {
    /// Seed generation failed; the round is held in PREPARING.
    #[error(transparent)]
    Entropy(#[from] EntropyError),

    /// Rejected administrative configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Rejected bet or cash-out.
    #[error(transparent)]
    Bet(#[from] BetError),

    /// The operation needs an ascending round.
    #[error("No round is ascending")]
    NotAscending,

    /// A round is already prepared or running.
    #[error("Round {0} is still in progress")]
    RoundInProgress(RoundId),
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Multiplier growth law.
    pub growth: GrowthCurve,
    /// Time between publishing the commitment and the ascent.
    pub commit_delay: Duration,
    /// Time the crash stays on screen before the next preparation.
    pub hold_delay: Duration,
    /// Wait before retrying a preparation that hit an entropy failure.
    pub entropy_retry: Duration,
    /// History records retained.
    pub history_capacity: usize,
    /// Audit entries retained.
    pub audit_capacity: usize,
    /// Edge used until an operator changes it.
    pub house_edge: HouseEdge,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            growth: GrowthCurve::default(),
            commit_delay: Duration::from_secs(5),
            hold_delay: Duration::from_secs(4),
            entropy_retry: Duration::from_secs(1),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
            house_edge: HouseEdge::default(),
        }
    }
}

/// Cumulative platform totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformStats {
    /// Credits staked across all settled rounds.
    pub total_wagered: u64,
    /// Credits paid out across all settled rounds.
    pub total_paid_out: u64,
}

impl PlatformStats {
    /// Wagered minus paid out.
    pub fn net(&self) -> i128 {
        self.total_wagered as i128 - self.total_paid_out as i128
    }

    /// Net as a percentage of wagered (0 when nothing was wagered).
    pub fn margin_percent(&self) -> f64 {
        if self.total_wagered == 0 {
            return 0.0;
        }
        self.net() as f64 / self.total_wagered as f64 * 100.0
    }
}

/// Output of one preparation: the seed, its commitment and the outcome.
#[derive(Debug)]
pub struct GeneratedRound {
    /// Secret seed.
    pub seed: ServerSeed,
    /// Commitment to publish.
    pub hash: SeedHash,
    /// Crash point, computed once.
    pub outcome: RoundOutcome,
}

/// Generate seed, commitment and crash point for one round.
///
/// The seed is drawn first; the override is only consumed once a seed
/// exists, so an entropy failure never burns a pending override.
pub fn generate_round(
    seeds: &mut dyn SeedSource,
    risk: &mut RiskControls,
) -> Result<GeneratedRound, EntropyError> {
    let seed = seeds.next_seed()?;
    let hash = hash_seed(seed.as_str());
    let prep = risk.take_preparation_input();
    let derivation = derive(seed.as_str(), prep.edge);
    Ok(GeneratedRound {
        seed,
        hash,
        outcome: RoundOutcome::new(derivation, prep.edge, prep.input),
    })
}

/// The round lifecycle controller.
pub struct RoundController {
    config: EngineConfig,
    risk: RiskControls,
    seeds: Box<dyn SeedSource>,
    phase: RoundPhase,
    round: Option<Round>,
    last_round_id: RoundId,
    /// Next phase transition (or preparation retry).
    deadline: Instant,
    history: History,
    audit: AuditLog,
    stats: PlatformStats,
    events: Vec<RoundEvent>,
}

impl RoundController {
    /// Create an idle controller. Call [`RoundController::tick`] to start.
    pub fn new(config: EngineConfig, seeds: Box<dyn SeedSource>) -> Self {
        let history = History::with_capacity(config.history_capacity);
        let audit = AuditLog::with_capacity(config.audit_capacity);
        Self {
            risk: RiskControls::new(config.house_edge),
            config,
            seeds,
            phase: RoundPhase::Preparing,
            round: None,
            last_round_id: RoundId(0),
            deadline: Instant::now(),
            history,
            audit,
            stats: PlatformStats::default(),
            events: Vec::new(),
        }
    }

    /// Create a controller continuing from a persisted snapshot.
    pub fn restore(config: EngineConfig, seeds: Box<dyn SeedSource>, snapshot: Snapshot) -> Self {
        let mut controller = Self::new(config, seeds);
        controller.history = History::from_records(snapshot.history, controller.config.history_capacity);
        controller.risk = RiskControls::new(snapshot.house_edge);
        controller.stats = snapshot.stats;
        controller.last_round_id = snapshot.last_round;
        info!(
            "Restored {} history records, last round {}, edge {}",
            controller.history.len(),
            controller.last_round_id,
            snapshot.house_edge
        );
        controller
    }

    /// State to persist.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            history: self.history.to_vec(),
            house_edge: self.risk.house_edge(),
            stats: self.stats,
            last_round: self.last_round_id,
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Current phase.
    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// Round currently prepared or ascending.
    pub fn current_round(&self) -> Option<&Round> {
        self.round.as_ref()
    }

    /// Published commitment of the current round.
    pub fn commitment(&self) -> Option<RoundCommitment> {
        self.round.as_ref().map(Round::commitment)
    }

    /// True while preparation is blocked on entropy.
    pub fn awaiting_round(&self) -> bool {
        self.phase == RoundPhase::Preparing && self.round.is_none()
    }

    /// Multiplier of the ascending round at `now` (1.00 in other phases).
    pub fn current_multiplier(&self, now: Instant) -> Multiplier {
        match (&self.round, self.phase) {
            (Some(round), RoundPhase::Ascending) => {
                let started = round.started_at.unwrap_or(now);
                let raw = self.config.growth.at(now.saturating_duration_since(started));
                Multiplier::floor_from_f64(raw).min(round.effective_crash_point())
            }
            _ => Multiplier::ONE,
        }
    }

    /// Settled rounds, newest first.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Operator audit trail.
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Platform totals.
    pub fn stats(&self) -> PlatformStats {
        self.stats
    }

    /// Edge and pending override.
    pub fn risk(&self) -> &RiskControls {
        &self.risk
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Take the events produced since the last call.
    pub fn drain_events(&mut self) -> Vec<RoundEvent> {
        std::mem::take(&mut self.events)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Prepare the next round: seed, commitment, crash point.
    ///
    /// On entropy failure the controller stays in PREPARING with no round
    /// and retries after `entropy_retry`.
    pub fn prepare_round(&mut self, now: Instant) -> Result<RoundCommitment, RoundError> {
        if let Some(round) = &self.round {
            return Err(RoundError::RoundInProgress(round.id));
        }
        self.phase = RoundPhase::Preparing;

        let generated = match generate_round(self.seeds.as_mut(), &mut self.risk) {
            Ok(g) => g,
            Err(e) => {
                error!("Round preparation failed: {}", e);
                self.audit.record(AuditKind::EntropyFailure {
                    reason: e.reason.clone(),
                });
                self.events.push(RoundEvent::AwaitingEntropy {
                    reason: e.reason.clone(),
                });
                self.deadline = now + self.config.entropy_retry;
                return Err(e.into());
            }
        };

        let id = self.last_round_id.next();
        self.last_round_id = id;

        let outcome = generated.outcome;
        match outcome.input {
            RoundInput::Organic => {
                self.audit.record(AuditKind::OrganicRound {
                    round: id,
                    crash_point: outcome.crash_point,
                });
            }
            RoundInput::Forced(value) => {
                self.audit.record(AuditKind::OverrideConsumed {
                    round: id,
                    value,
                    derived: outcome.derivation.crash_point,
                });
            }
        }

        let round = Round {
            id,
            seed: generated.seed,
            hash: generated.hash,
            outcome,
            bets: BetBook::new(),
            committed_at: Utc::now(),
            started_at: None,
            forced_crash_at: None,
            crashed_at: None,
        };
        let commitment = round.commitment();
        self.round = Some(round);
        self.deadline = now + self.config.commit_delay;

        info!(
            "Round {} committed: hash {} edge {}",
            id, commitment.server_hash, commitment.house_edge
        );
        self.events.push(RoundEvent::Committed {
            round: id,
            server_hash: commitment.server_hash,
            house_edge: commitment.house_edge,
            starts_in_ms: self.config.commit_delay.as_millis() as u64,
        });

        Ok(commitment)
    }

    /// Advance the state machine to `now`.
    pub fn tick(&mut self, now: Instant) {
        match self.phase {
            RoundPhase::Preparing => {
                if now < self.deadline {
                    return;
                }
                if self.round.is_none() {
                    // Retry path; the error is already logged and audited
                    let _ = self.prepare_round(now);
                } else {
                    self.begin_ascent(now);
                    self.advance_ascent(now);
                }
            }
            RoundPhase::Ascending => self.advance_ascent(now),
            RoundPhase::Settled => {
                if now >= self.deadline {
                    let _ = self.prepare_round(now);
                }
            }
        }
    }

    fn begin_ascent(&mut self, now: Instant) {
        let Some(round) = self.round.as_mut() else {
            return;
        };
        round.started_at = Some(now);
        let active_bets = round.bets.activate_all();
        self.phase = RoundPhase::Ascending;
        info!("Round {} ascending with {} bets", round.id, active_bets);
        self.events.push(RoundEvent::Started {
            round: round.id,
            active_bets,
        });
    }

    fn advance_ascent(&mut self, now: Instant) {
        let Some(round) = self.round.as_mut() else {
            return;
        };
        let elapsed = now.saturating_duration_since(round.started_at.unwrap_or(now));
        let raw = self.config.growth.at(elapsed);
        let crash_point = round.effective_crash_point();

        if raw >= crash_point.as_f64() {
            self.settle(crash_point);
            self.deadline = now + self.config.hold_delay;
            return;
        }

        let current = Multiplier::floor_from_f64(raw);
        for cash_out in round.bets.run_auto_cash_outs(current, crash_point) {
            self.events.push(RoundEvent::CashedOut {
                round: round.id,
                cash_out,
                automatic: true,
            });
        }
        self.events.push(RoundEvent::Multiplier {
            round: round.id,
            value: current,
            elapsed_ms: elapsed.as_millis() as u64,
        });
    }

    /// Crash the current round at `crash_point`: reveal, record, resolve.
    fn settle(&mut self, crash_point: Multiplier) {
        let Some(mut round) = self.round.take() else {
            return;
        };
        round.crashed_at = Some(crash_point);

        // Auto targets crossed between the last tick and the crash still pay
        for cash_out in round.bets.run_auto_cash_outs(crash_point, crash_point) {
            self.events.push(RoundEvent::CashedOut {
                round: round.id,
                cash_out,
                automatic: true,
            });
        }
        let bets_lost = round.bets.settle();

        let record = HistoryRecord::from_round(&round, crash_point, Utc::now());
        let round_stats = record.stats();
        self.stats.total_wagered = self.stats.total_wagered.saturating_add(round_stats.total_wagered);
        self.stats.total_paid_out = self.stats.total_paid_out.saturating_add(round_stats.total_payout);

        info!(
            "Round {} crashed at {} ({:?}), seed revealed",
            round.id,
            crash_point,
            record.provenance()
        );
        self.events.push(RoundEvent::Crashed {
            round: round.id,
            crash_point,
            server_seed: record.server_seed().to_string(),
            server_hash: record.server_hash(),
            provenance: record.provenance(),
            bets_lost,
            stats: round_stats,
        });
        self.history.push(record);
        self.phase = RoundPhase::Settled;
    }

    // -------------------------------------------------------------------------
    // Player operations
    // -------------------------------------------------------------------------

    /// Place a bet on the prepared round.
    pub fn place_bet(
        &mut self,
        player: PlayerId,
        amount: u64,
        auto_cash_out: Option<f64>,
    ) -> Result<BetId, RoundError> {
        let round = match (&mut self.round, self.phase) {
            (Some(round), RoundPhase::Preparing) => round,
            _ => return Err(BetError::BettingClosed.into()),
        };
        let bet = round.bets.place(player, amount, auto_cash_out)?;
        let bet_id = bet.id;
        debug!("Bet placed on round {}: {} credits", round.id, amount);
        self.events.push(RoundEvent::BetPlaced {
            round: round.id,
            bet_id,
            player,
            amount,
        });
        Ok(bet_id)
    }

    /// Cash out an active bet at the multiplier reached at `now`.
    pub fn cash_out(&mut self, bet_id: &BetId, now: Instant) -> Result<CashOut, RoundError> {
        // Bring the round up to date first: a crash due before `now` wins
        self.tick(now);
        if self.phase != RoundPhase::Ascending {
            return Err(RoundError::NotAscending);
        }
        let current = self.current_multiplier(now);
        let round = self.round.as_mut().ok_or(RoundError::NotAscending)?;
        let cash_out = round.bets.cash_out(bet_id, current)?;
        info!("Cash-out on round {} at {}: {} credits", round.id, current, cash_out.payout);
        self.events.push(RoundEvent::CashedOut {
            round: round.id,
            cash_out,
            automatic: false,
        });
        Ok(cash_out)
    }

    // -------------------------------------------------------------------------
    // Administrative operations
    // -------------------------------------------------------------------------

    /// End the ascending round now, at the current multiplier.
    pub fn force_crash(&mut self, now: Instant) -> Result<Multiplier, RoundError> {
        self.tick(now);
        if self.phase != RoundPhase::Ascending {
            return Err(RoundError::NotAscending);
        }
        let at = self.current_multiplier(now);
        let round = self.round.as_mut().ok_or(RoundError::NotAscending)?;
        let scheduled = round.outcome.crash_point;
        round.forced_crash_at = Some(at);
        self.audit.record(AuditKind::ForcedCrash {
            round: round.id,
            at,
            scheduled,
        });
        self.settle(at);
        self.deadline = now + self.config.hold_delay;
        Ok(at)
    }

    /// Change the edge used from the next preparation on.
    pub fn set_house_edge(&mut self, percent: f64) -> Result<HouseEdge, RoundError> {
        let from = self.risk.set_house_edge(percent)?;
        let to = self.risk.house_edge();
        self.audit.record(AuditKind::HouseEdgeChanged { from, to });
        Ok(to)
    }

    /// Arm or clear the one-shot override for the next preparation.
    pub fn set_next_override(&mut self, value: Option<f64>) -> Result<Option<Multiplier>, RoundError> {
        let previous = self.risk.set_next_override(value)?;
        match (self.risk.pending_override(), previous) {
            (Some(value), _) => {
                self.audit.record(AuditKind::OverrideArmed { value });
            }
            (None, Some(value)) => {
                self.audit.record(AuditKind::OverrideCleared { value });
            }
            (None, None) => {}
        }
        Ok(self.risk.pending_override())
    }
}

// =============================================================================
// TESTS
// =============================================================================
