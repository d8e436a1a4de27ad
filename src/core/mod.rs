//! Core provably-fair primitives.
//!
//! Everything here is either a pure function or a thin wrapper over the OS
//! random source. The round controller and the verification tool share
//! these implementations; there is no second copy of any formula.

pub mod rng;
pub mod hash;
pub mod multiplier;
pub mod derive;

// Re-export core types
pub use rng::{generate_server_seed, EntropyError, OsSeedSource, SeedSource, ServerSeed};
pub use hash::{hash_seed, SeedHash};
pub use multiplier::{current_multiplier, GrowthCurve, Multiplier};
pub use derive::{derive, derive_crash_point, CrashDerivation, HouseEdge, InvalidEdge};
