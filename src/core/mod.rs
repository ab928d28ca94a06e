//! Core deterministic primitives.
//!
//! Hashing, the seed-derived shuffle stream and the clock abstraction.
//! Everything above this layer builds on these types.

pub mod clock;
pub mod hash;
pub mod rng;

// Re-export core types
pub use clock::{Clock, ManualClock, Millis, SystemClock};
pub use hash::{commit, verify, CommitmentChain, HashValue, Secret};
pub use rng::{derive_combined_seed, DeterministicRng};
