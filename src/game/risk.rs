//! Risk and Override Controls
//!
//! Administrative knobs that bend the outcome of the *next* round: the
//! house edge and a one-shot forced crash point. Both live in an explicit
//! [`RiskControls`] object owned by the round controller, never in global
//! state, so two controllers (e.g. in tests) cannot interfere.
//!
//! A forced outcome breaks the provably-fair promise for that round. It is
//! therefore carried as a tagged [`RoundInput::Forced`] all the way into
//! the history record, so audits match on provenance instead of parsing
//! log text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::derive::HouseEdge;
use crate::core::multiplier::Multiplier;

/// Rejected administrative configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Edge outside `[0, 100)`; the previous edge stays in force.
    #[error("Invalid house edge {0}: must be within [0, 100)")]
    InvalidEdgeParameter(f64),

    /// Override below 1.00x, not a whole number of hundredths, or not a
    /// number; nothing is armed.
    #[error("Invalid override {0}: must be at least 1.00x in whole hundredths")]
    OverrideMisuse(f64),
}

/// How a round's crash point was chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundInput {
    /// Derived from the committed seed and edge.
    Organic,
    /// Replaced by an operator override.
    Forced(Multiplier),
}

impl RoundInput {
    /// True if the operator chose the outcome.
    pub fn is_forced(&self) -> bool {
        matches!(self, RoundInput::Forced(_))
    }
}

/// What the next round preparation should use.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PreparationInput {
    /// Edge captured for this round.
    pub edge: HouseEdge,
    /// Organic or forced.
    pub input: RoundInput,
}

/// House edge plus the pending one-shot override.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RiskControls {
    house_edge: HouseEdge,
    pending_override: Option<Multiplier>,
}

impl RiskControls {
    /// Controls with a given starting edge and nothing armed.
    pub fn new(house_edge: HouseEdge) -> Self {
        Self {
            house_edge,
            pending_override: None,
        }
    }

    /// Current edge.
    pub fn house_edge(&self) -> HouseEdge {
        self.house_edge
    }

    /// Armed override, if any.
    pub fn pending_override(&self) -> Option<Multiplier> {
        self.pending_override
    }

    /// Change the edge used from the next preparation on.
    ///
    /// Returns the previous edge. Invalid values leave the edge untouched.
    pub fn set_house_edge(&mut self, percent: f64) -> Result<HouseEdge, ConfigError> {
        let edge = HouseEdge::new(percent).map_err(|_| ConfigError::InvalidEdgeParameter(percent))?;
        Ok(std::mem::replace(&mut self.house_edge, edge))
    }

    /// Arm (or with `None`, disarm) the override for the next round.
    ///
    /// The value is taken exactly: `2.555` is rejected rather than armed
    /// as 2.55x. Returns the override that was pending before the call.
    pub fn set_next_override(&mut self, value: Option<f64>) -> Result<Option<Multiplier>, ConfigError> {
        let next = match value {
            Some(v) => Some(Multiplier::exact_from_f64(v).ok_or(ConfigError::OverrideMisuse(v))?),
            None => None,
        };
        Ok(std::mem::replace(&mut self.pending_override, next))
    }

    /// Capture the edge and consume the override for one preparation.
    ///
    /// The override is cleared here, so it can affect exactly one round.
    pub fn take_preparation_input(&mut self) -> PreparationInput {
        let input = match self.pending_override.take() {
            Some(value) => RoundInput::Forced(value),
            None => RoundInput::Organic,
        };
        PreparationInput {
            edge: self.house_edge,
            input,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
