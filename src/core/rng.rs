//! Deterministic Random Number Generator
//!
//! Uses Xorshift128+ for the seed-derived shuffle stream.
//! Given the same seed, produces identical sequence on all platforms.
//!
//! This generator is only ever driven by a combined seed that neither party
//! controls alone. Secrets themselves come from `OsRng` (see `core::hash`).

use serde::{Deserialize, Serialize};

use super::hash::{ChainHasher, HashValue, Secret};

/// Deterministic PRNG using Xorshift128+ algorithm.
///
/// # Example
///
/// ```
/// use fair_blackjack::core::rng::DeterministicRng;
///
/// let mut rng = DeterministicRng::new(12345);
/// let value = rng.next_u64();
/// assert_eq!(value, 6233086606872742541); // Always the same!
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);
        Self::from_state(state0, state1)
    }

    /// Create RNG from a 32-byte combined seed.
    ///
    /// Every seed byte feeds the initial state.
    pub fn from_seed_bytes(seed: &HashValue) -> Self {
        let word = |i: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&seed[i * 8..(i + 1) * 8]);
            u64::from_le_bytes(buf)
        };

        let mut a = word(0) ^ word(1).rotate_left(32);
        let mut b = word(2) ^ word(3).rotate_left(32);
        let state0 = splitmix64(&mut a);
        let state1 = splitmix64(&mut b);
        Self::from_state(state0, state1)
    }

    fn from_state(state0: u64, state1: u64) -> Self {
        // Ensure state is never all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };
        Self { state }
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a uniform integer in `[0, bound)`.
    ///
    /// Rejection sampling removes modulo bias; `bound == 0` yields 0.
    pub fn next_below(&mut self, bound: u32) -> u32 {
        if bound <= 1 {
            return 0;
        }
        let bound = bound as u64;
        let zone = (u64::MAX / bound) * bound;
        loop {
            let value = self.next_u64();
            if value < zone {
                return (value % bound) as u32;
            }
        }
    }

    /// Shuffle a slice in place using Fisher-Yates algorithm.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        let len = slice.len();
        for i in (1..len).rev() {
            let j = self.next_below((i + 1) as u32) as usize;
            slice.swap(i, j);
        }
    }
}

/// SplitMix64 for seed initialization.
/// Produces well-distributed values from sequential seeds.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive the combined shuffle seed for a round.
///
/// `SHA-256(s_house || s_player || cut)` with the cut as little-endian u32.
/// Unknown to either party until both secrets and the cut exist.
pub fn derive_combined_seed(house: &Secret, player: &Secret, cut: u32) -> HashValue {
    let mut hasher = ChainHasher::new();
    hasher.update_bytes(house.as_bytes());
    hasher.update_bytes(player.as_bytes());
    hasher.update_u32(cut);
    hasher.finalize()
}

// =============================================================================
// TESTS
// =============================================================================
