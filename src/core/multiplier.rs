//! Multiplier Arithmetic
//!
//! Multipliers are stored as integer hundredths (`100` = 1.00x) so that
//! crash points, cash-out points and payouts compare and serialize
//! exactly. Floats only appear where the published formulas demand them:
//! the crash derivation and the growth curve.
//!
//! ## Growth law
//!
//! ```text
//! multiplier(t) = e^(k · t)      t in seconds, k = 0.08
//!
//!   2.00x after ~8.7s
//!  10.00x after ~28.8s
//! 100.00x after ~57.6s
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Hundredths per 1.00x.
pub const HUNDREDTHS: u64 = 100;

/// Largest distance from a whole hundredth still read as exact.
const CENT_TOLERANCE: f64 = 1e-6;

/// Default growth constant `k` (per second).
pub const DEFAULT_GROWTH_RATE: f64 = 0.08;

/// A payout multiplier, always >= 1.00x.
///
/// Serializes as integer hundredths; deserializing anything below `100`
/// fails.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u64", try_from = "u64")]
pub struct Multiplier(u64);

impl Multiplier {
    /// 1.00x, the floor for every multiplier.
    pub const ONE: Multiplier = Multiplier(HUNDREDTHS);

    /// Build from hundredths, clamping to 1.00x.
    pub fn from_hundredths(hundredths: u64) -> Self {
        Self(hundredths.max(HUNDREDTHS))
    }

    /// Floor a float multiplier to hundredths, clamping to 1.00x.
    ///
    /// Non-finite input collapses to 1.00x.
    pub fn floor_from_f64(value: f64) -> Self {
        if !value.is_finite() || value < 1.0 {
            return Self::ONE;
        }
        Self::from_hundredths((value * HUNDREDTHS as f64).floor() as u64)
    }

    /// Strict conversion: `None` if the value is below 1.00x or not finite.
    pub fn try_from_f64(value: f64) -> Option<Self> {
        if value.is_finite() && value >= 1.0 {
            Some(Self::floor_from_f64(value))
        } else {
            None
        }
    }

    /// Exact conversion for operator and player input: `None` unless the
    /// value is at least 1.00x and a whole number of hundredths.
    ///
    /// Float noise such as `1.15 * 100 = 114.99999999999999` is tolerated.
    pub fn exact_from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 1.0 {
            return None;
        }
        let scaled = value * HUNDREDTHS as f64;
        let cents = scaled.round();
        if (scaled - cents).abs() > CENT_TOLERANCE || cents > u64::MAX as f64 {
            return None;
        }
        Some(Self::from_hundredths(cents as u64))
    }

    /// Integer hundredths.
    #[inline]
    pub fn hundredths(self) -> u64 {
        self.0
    }

    /// Float view for display and curve comparisons.
    #[inline]
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / HUNDREDTHS as f64
    }

    /// Amount returned for a stake at this multiplier (floored).
    pub fn payout(self, amount: u64) -> u64 {
        let scaled = amount as u128 * self.0 as u128 / HUNDREDTHS as u128;
        scaled.min(u64::MAX as u128) as u64
    }
}

impl From<Multiplier> for u64 {
    fn from(m: Multiplier) -> u64 {
        m.0
    }
}

impl TryFrom<u64> for Multiplier {
    type Error = String;

    fn try_from(hundredths: u64) -> Result<Self, Self::Error> {
        if hundredths < HUNDREDTHS {
            return Err(format!("multiplier {} hundredths is below 1.00x", hundredths));
        }
        Ok(Self(hundredths))
    }
}

impl Default for Multiplier {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}x", self.0 / HUNDREDTHS, self.0 % HUNDREDTHS)
    }
}

impl fmt::Debug for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Multiplier({})", self)
    }
}

/// Exponential multiplier curve used during the ascending phase.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GrowthCurve {
    /// Growth constant `k` per second.
    pub rate_per_sec: f64,
}

impl Default for GrowthCurve {
    fn default() -> Self {
        Self {
            rate_per_sec: DEFAULT_GROWTH_RATE,
        }
    }
}

impl GrowthCurve {
    /// Raw multiplier after `elapsed` seconds.
    #[inline]
    pub fn at_secs(&self, elapsed_secs: f64) -> f64 {
        (self.rate_per_sec * elapsed_secs.max(0.0)).exp()
    }

    /// Raw multiplier after `elapsed`.
    #[inline]
    pub fn at(&self, elapsed: Duration) -> f64 {
        self.at_secs(elapsed.as_secs_f64())
    }

    /// Time the curve needs to reach `target`.
    pub fn time_to_reach(&self, target: Multiplier) -> Duration {
        let secs = target.as_f64().ln() / self.rate_per_sec;
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Multiplier after `elapsed_secs` on the default curve.
pub fn current_multiplier(elapsed_secs: f64) -> f64 {
    GrowthCurve::default().at_secs(elapsed_secs)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_and_clamp() {
        assert_eq!(Multiplier::floor_from_f64(2.999).hundredths(), 299);
        assert_eq!(Multiplier::floor_from_f64(0.5), Multiplier::ONE);
        assert_eq!(Multiplier::floor_from_f64(f64::NAN), Multiplier::ONE);
        assert_eq!(Multiplier::from_hundredths(3), Multiplier::ONE);
    }

    #[test]
    fn test_try_from_rejects_below_one() {
        assert!(Multiplier::try_from_f64(0.99).is_none());
        assert!(Multiplier::try_from_f64(f64::INFINITY).is_none());
        assert_eq!(Multiplier::try_from_f64(1.0), Some(Multiplier::ONE));
        assert_eq!(Multiplier::try_from_f64(12.345).unwrap().hundredths(), 1234);
    }

    #[test]
    fn test_exact_from_f64() {
        assert_eq!(Multiplier::exact_from_f64(2.55).unwrap().hundredths(), 255);
        assert_eq!(Multiplier::exact_from_f64(1.15).unwrap().hundredths(), 115);
        assert_eq!(Multiplier::exact_from_f64(1.0), Some(Multiplier::ONE));
        assert_eq!(Multiplier::exact_from_f64(2.555), None);
        assert_eq!(Multiplier::exact_from_f64(12.345), None);
        assert_eq!(Multiplier::exact_from_f64(0.99), None);
        assert_eq!(Multiplier::exact_from_f64(f64::NAN), None);
    }

    #[test]
    fn test_serde_rejects_below_one() {
        let m: Multiplier = serde_json::from_str("595").unwrap();
        assert_eq!(m.hundredths(), 595);
        assert_eq!(serde_json::to_string(&m).unwrap(), "595");
        assert!(serde_json::from_str::<Multiplier>("99").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Multiplier::from_hundredths(595).to_string(), "5.95x");
        assert_eq!(Multiplier::from_hundredths(1005).to_string(), "10.05x");
        assert_eq!(Multiplier::ONE.to_string(), "1.00x");
    }

    #[test]
    fn test_payout() {
        let m = Multiplier::from_hundredths(250);
        assert_eq!(m.payout(1000), 2500);
        assert_eq!(m.payout(3), 7);
        assert_eq!(Multiplier::ONE.payout(42), 42);
    }

    #[test]
    fn test_curve_starts_at_one_and_grows() {
        let curve = GrowthCurve::default();
        assert_eq!(curve.at_secs(0.0), 1.0);
        assert!(curve.at_secs(1.0) > 1.0);
        assert!(curve.at_secs(10.0) > curve.at_secs(5.0));
        assert_eq!(curve.at_secs(-3.0), 1.0);
        assert_eq!(current_multiplier(0.0), 1.0);
    }

    #[test]
    fn test_time_to_reach_inverts_curve() {
        let curve = GrowthCurve::default();
        let target = Multiplier::from_hundredths(200);
        let t = curve.time_to_reach(target);
        assert!((curve.at(t) - 2.0).abs() < 1e-9);
        assert_eq!(curve.time_to_reach(Multiplier::ONE), Duration::ZERO);
    }
}
