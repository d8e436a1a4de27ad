//! Settled Round History
//!
//! One [`HistoryRecord`] per settled round, created at crash time and
//! never mutated afterwards: fields are private and only readable through
//! getters. The [`History`] ring keeps the newest records and evicts the
//! oldest first.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::derive::HouseEdge;
use crate::core::hash::SeedHash;
use crate::core::multiplier::Multiplier;
use crate::game::bets::RoundStats;
use crate::game::risk::RoundInput;
use crate::game::state::{Round, RoundId};

/// Default number of records retained.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Where a settled crash point came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Seed-derived and ran to completion.
    Organic,
    /// Replaced by an override before the round.
    Overridden,
    /// Ended by the operator mid-ascent.
    ForceCrashed,
}

/// Immutable record of a settled round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    round_id: RoundId,
    crash_point: Multiplier,
    timestamp: DateTime<Utc>,
    server_seed: String,
    server_hash: SeedHash,
    house_edge: HouseEdge,
    input: RoundInput,
    forced_crash_at: Option<Multiplier>,
    stats: RoundStats,
}

impl HistoryRecord {
    /// Build the record for a round at the moment it crashes.
    ///
    /// This is where the seed is revealed.
    pub(crate) fn from_round(round: &Round, crash_point: Multiplier, timestamp: DateTime<Utc>) -> Self {
        Self {
            round_id: round.id,
            crash_point,
            timestamp,
            server_seed: round.seed.as_str().to_string(),
            server_hash: round.hash,
            house_edge: round.outcome.house_edge,
            input: round.outcome.input,
            forced_crash_at: round.forced_crash_at,
            stats: round.bets.stats(),
        }
    }

    /// Round number.
    pub fn round_id(&self) -> RoundId {
        self.round_id
    }

    /// Multiplier the round crashed at.
    pub fn crash_point(&self) -> Multiplier {
        self.crash_point
    }

    /// Settlement time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Revealed server seed.
    pub fn server_seed(&self) -> &str {
        &self.server_seed
    }

    /// Commitment published before the round.
    pub fn server_hash(&self) -> SeedHash {
        self.server_hash
    }

    /// Edge captured at preparation.
    pub fn house_edge(&self) -> HouseEdge {
        self.house_edge
    }

    /// Organic or forced preparation input.
    pub fn input(&self) -> RoundInput {
        self.input
    }

    /// Multiplier of an operator crash, if one happened.
    pub fn forced_crash_at(&self) -> Option<Multiplier> {
        self.forced_crash_at
    }

    /// Aggregated bet statistics.
    pub fn stats(&self) -> RoundStats {
        self.stats
    }

    /// How the crash point came about.
    pub fn provenance(&self) -> Provenance {
        if self.forced_crash_at.is_some() {
            Provenance::ForceCrashed
        } else if self.input.is_forced() {
            Provenance::Overridden
        } else {
            Provenance::Organic
        }
    }
}

/// Bounded history, newest first.
#[derive(Clone, Debug)]
pub struct History {
    records: VecDeque<HistoryRecord>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl History {
    /// Empty history keeping at most `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Rebuild from persisted records (newest first), applying the cap.
    pub fn from_records(records: Vec<HistoryRecord>, capacity: usize) -> Self {
        let mut history = Self::with_capacity(capacity);
        history.records.extend(records);
        history.records.truncate(history.capacity);
        history
    }

    /// Append a record, evicting the oldest beyond capacity.
    pub fn push(&mut self, record: HistoryRecord) {
        self.records.push_front(record);
        self.records.truncate(self.capacity);
    }

    /// Records, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.iter()
    }

    /// Most recent record.
    pub fn latest(&self) -> Option<&HistoryRecord> {
        self.records.front()
    }

    /// Find a record by round.
    pub fn get(&self, round: RoundId) -> Option<&HistoryRecord> {
        self.records.iter().find(|r| r.round_id == round)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Owned copy for persistence, newest first.
    pub fn to_vec(&self) -> Vec<HistoryRecord> {
        self.records.iter().cloned().collect()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::core::derive::derive;
    use crate::core::hash::hash_seed;

    /// A plausible organic record for a given seed.
    pub fn organic_record(id: u64, seed: &str) -> HistoryRecord {
        let edge = HouseEdge::default();
        HistoryRecord {
            round_id: RoundId(id),
            crash_point: derive(seed, edge).crash_point,
            timestamp: Utc::now(),
            server_seed: seed.to_string(),
            server_hash: hash_seed(seed),
            house_edge: edge,
            input: RoundInput::Organic,
            forced_crash_at: None,
            stats: RoundStats::default(),
        }
    }

    /// Same record with the crash point swapped (tampering).
    pub fn with_crash_point(mut record: HistoryRecord, crash_point: Multiplier) -> HistoryRecord {
        record.crash_point = crash_point;
        record
    }
}

// =============================================================================
// TESTS
// =============================================================================
