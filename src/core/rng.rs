//! Seedable Random Number Generator
//!
//! Uses Xorshift128+ for fast randomness that can be replayed from a seed.
//! Every draw in the play engine goes through [`RandomSource`], so tests can
//! swap in a fixed seed or a scripted sequence.

use serde::{Serialize, Deserialize};

/// Denominator for per-mille probabilities (1000 = 100%).
pub const PER_MILLE: u32 = 1000;

/// A uniform random source.
///
/// Only `next_u64` is required; the derived helpers are shared by every
/// implementation so a scripted source behaves exactly like the real one.
pub trait RandomSource {
    /// Next raw 64-bit value.
    fn next_u64(&mut self) -> u64;

    /// Random integer in `[0, max)`. Returns 0 when `max` is 0.
    fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        // Simple modulo - slight bias for very large max, but acceptable
        (self.next_u64() % max as u64) as u32
    }

    /// Random integer in `[min, max]`. Returns `min` when the range is empty.
    fn next_int_range(&mut self, min: u32, max: u32) -> u32 {
        if min >= max {
            return min;
        }
        // Span in u64 so the full u32 range does not overflow
        let span = u64::from(max - min) + 1;
        min + (self.next_u64() % span) as u32
    }

    /// Roll in `[0, PER_MILLE)`.
    fn roll_per_mille(&mut self) -> u32 {
        self.next_int(PER_MILLE)
    }

    /// True with probability `per_mille / 1000`.
    fn chance(&mut self, per_mille: u32) -> bool {
        self.roll_per_mille() < per_mille
    }
}

/// PRNG using the Xorshift128+ algorithm.
///
/// Given the same seed, this RNG produces the exact same sequence on any
/// platform.
///
/// # Example
///
/// ```
/// use cozy_casino::core::rng::{DeterministicRng, RandomSource};
///
/// let mut a = DeterministicRng::new(12345);
/// let mut b = DeterministicRng::new(12345);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
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

        // Ensure state is never all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Create an RNG seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self::new(rand::random::<u64>())
    }
}

impl RandomSource for DeterministicRng {
    #[inline]
    fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }
}

/// Select a random element from a slice.
pub fn choose<'a, T, R: RandomSource + ?Sized>(rng: &mut R, slice: &'a [T]) -> Option<&'a T> {
    if slice.is_empty() {
        None
    } else {
        let idx = rng.next_int(slice.len() as u32) as usize;
        Some(&slice[idx])
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

/// Replays a fixed list of raw values, cycling when exhausted.
///
/// Lets tests pin exact rolls: `next_int(max)` yields `value % max`.
#[derive(Clone, Debug)]
pub struct ScriptedRng {
    values: Vec<u64>,
    cursor: usize,
}

impl ScriptedRng {
    /// Create from the raw values to replay. An empty script always yields 0.
    pub fn new(values: Vec<u64>) -> Self {
        Self { values, cursor: 0 }
    }
}

impl RandomSource for ScriptedRng {
    fn next_u64(&mut self) -> u64 {
        if self.values.is_empty() {
            return 0;
        }
        let value = self.values[self.cursor % self.values.len()];
        self.cursor += 1;
        value
    }
}

// =============================================================================
// TESTS
// =============================================================================
