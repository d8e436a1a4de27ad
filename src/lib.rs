//! # SkyHigh Round Server
//!
//! Provably-fair crash-game round engine: commit to a seed before bets are
//! taken, run the multiplier up to a crash point derived from that seed,
//! reveal the seed afterwards so anyone can recompute the result.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SKYHIGH SERVER                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Pure primitives (single source of truth) │
//! │  ├── rng.rs      - Server seed generation (OS CSPRNG)        │
//! │  ├── hash.rs     - SHA-256 commitments                       │
//! │  ├── multiplier.rs - Hundredths arithmetic, growth curve     │
//! │  └── derive.rs   - Seed + edge -> crash point                │
//! │                                                              │
//! │  game/           - Round state machine                       │
//! │  ├── tick.rs     - Lifecycle controller                      │
//! │  ├── bets.rs     - Bets, cash-outs, round statistics         │
//! │  ├── risk.rs     - House edge, one-shot override             │
//! │  ├── audit.rs    - Operator intervention trail               │
//! │  └── history.rs  - Immutable settled-round records           │
//! │                                                              │
//! │  proof/          - Commitment and verification               │
//! │  network/        - WebSocket surface (non-deterministic)     │
//! │  store.rs        - Snapshot persistence                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Fairness Guarantee
//!
//! The controller and the verifier call the same `core` functions:
//! - `hash(seed)` is published before any bet is accepted
//! - The crash point is computed once, at preparation, from `(seed, edge)`
//! - The edge is recorded with the round, so later edge changes never
//!   affect verification
//! - Operator overrides and force-crashes are recorded and audited, so a
//!   verifier can tell an organic round from a forced one

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod proof;
pub mod store;

// Re-export commonly used types
pub use core::derive::{derive, derive_crash_point, HouseEdge};
pub use core::hash::{hash_seed, SeedHash};
pub use core::multiplier::{GrowthCurve, Multiplier};
pub use core::rng::{OsSeedSource, SeedSource, ServerSeed};
pub use game::tick::{EngineConfig, RoundController, RoundError};
pub use proof::verify::{verify, verify_record, RecordVerdict, Verification};
pub use store::{FileStore, MemoryStore, Snapshot, SnapshotStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Controller tick rate (Hz)
pub const TICK_RATE: u32 = 20;
