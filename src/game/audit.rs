//! Operator Audit Trail
//!
//! Every action that can bend an outcome is recorded twice: as a
//! structured `tracing` event under the `skyhigh::audit` target, and as an
//! [`AuditEntry`] in a bounded in-memory ring the admin surface can query.
//! Organic round generation is recorded too, so the trail shows which
//! rounds were untouched.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::derive::HouseEdge;
use crate::core::multiplier::Multiplier;
use crate::game::state::RoundId;

/// Tracing target for audit lines.
pub const AUDIT_TARGET: &str = "skyhigh::audit";

/// Default number of entries kept.
pub const DEFAULT_AUDIT_CAPACITY: usize = 100;

/// What happened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// House edge changed.
    HouseEdgeChanged {
        /// Edge before.
        from: HouseEdge,
        /// Edge after.
        to: HouseEdge,
    },
    /// Override armed for the next round.
    OverrideArmed {
        /// Forced crash point.
        value: Multiplier,
    },
    /// Pending override withdrawn before use.
    OverrideCleared {
        /// The override that was withdrawn.
        value: Multiplier,
    },
    /// A round's crash point came from the seed.
    OrganicRound {
        /// Round.
        round: RoundId,
        /// Crash point.
        crash_point: Multiplier,
    },
    /// A round's crash point came from an override.
    OverrideConsumed {
        /// Round.
        round: RoundId,
        /// Forced crash point.
        value: Multiplier,
        /// What the seed would have produced.
        derived: Multiplier,
    },
    /// An ascending round was ended by the operator.
    ForcedCrash {
        /// Round.
        round: RoundId,
        /// Multiplier at the moment of the crash.
        at: Multiplier,
        /// Crash point the round was scheduled for.
        scheduled: Multiplier,
    },
    /// Round preparation could not read entropy.
    EntropyFailure {
        /// Source error text.
        reason: String,
    },
}

impl AuditKind {
    /// True for operator interventions (as opposed to organic activity).
    pub fn is_intervention(&self) -> bool {
        !matches!(
            self,
            AuditKind::OrganicRound { .. } | AuditKind::EntropyFailure { .. }
        )
    }
}

/// A timestamped audit record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When it was recorded.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: AuditKind,
}

/// Bounded audit ring, newest first.
#[derive(Clone, Debug)]
pub struct AuditLog {
    entries: VecDeque<AuditEntry>,
    capacity: usize,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }
}

impl AuditLog {
    /// Empty log keeping at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record an event and emit it as a log line.
    pub fn record(&mut self, kind: AuditKind) -> &AuditEntry {
        emit(&kind);
        self.entries.push_front(AuditEntry {
            timestamp: Utc::now(),
            kind,
        });
        self.entries.truncate(self.capacity);
        &self.entries[0]
    }

    /// Entries, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter()
    }

    /// Operator interventions only, newest first.
    pub fn interventions(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter().filter(|e| e.kind.is_intervention())
    }

    /// Number of entries held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn emit(kind: &AuditKind) {
    match kind {
        AuditKind::HouseEdgeChanged { from, to } => {
            warn!(target: AUDIT_TARGET, from = from.percent(), to = to.percent(), "ADMIN_RISK: house edge changed");
        }
        AuditKind::OverrideArmed { value } => {
            warn!(target: AUDIT_TARGET, value = %value, "ADMIN_RISK: next round forced");
        }
        AuditKind::OverrideCleared { value } => {
            warn!(target: AUDIT_TARGET, value = %value, "ADMIN_RISK: pending override cleared");
        }
        AuditKind::OrganicRound { round, crash_point } => {
            info!(target: AUDIT_TARGET, round = round.0, crash_point = %crash_point, "organic round generated");
        }
        AuditKind::OverrideConsumed { round, value, derived } => {
            warn!(target: AUDIT_TARGET, round = round.0, value = %value, derived = %derived, "ADMIN_OVERRIDE: forced round generated");
        }
        AuditKind::ForcedCrash { round, at, scheduled } => {
            warn!(target: AUDIT_TARGET, round = round.0, at = %at, scheduled = %scheduled, "ADMIN_OVERRIDE: manual crash");
        }
        AuditKind::EntropyFailure { reason } => {
            warn!(target: AUDIT_TARGET, reason = %reason, "round preparation blocked");
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_is_bounded_newest_first() {
        let mut log = AuditLog::with_capacity(3);
        for i in 0..5u64 {
            log.record(AuditKind::OrganicRound {
                round: RoundId(i),
                crash_point: Multiplier::ONE,
            });
        }
        assert_eq!(log.len(), 3);
        let rounds: Vec<u64> = log
            .entries()
            .map(|e| match e.kind {
                AuditKind::OrganicRound { round, .. } => round.0,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(rounds, vec![4, 3, 2]);
    }

    #[test]
    fn test_interventions_filter() {
        let mut log = AuditLog::default();
        log.record(AuditKind::OrganicRound {
            round: RoundId(1),
            crash_point: Multiplier::ONE,
        });
        log.record(AuditKind::OverrideArmed {
            value: Multiplier::from_hundredths(500),
        });
        log.record(AuditKind::EntropyFailure {
            reason: "offline".into(),
        });
        let interventions: Vec<_> = log.interventions().collect();
        assert_eq!(interventions.len(), 1);
        assert!(matches!(interventions[0].kind, AuditKind::OverrideArmed { .. }));
    }
}
