// Minimal PRNG (no external crates).
//
// This is NOT cryptographically secure.
// It feeds the chance gates of the plasticity rules and the random feed helpers.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::cortex::{Chance, TicksCount, MAX_CHANCE};

const ZERO_STATE_REPLACEMENT: u64 = 0x9E3779B97F4A7C15;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Prng {
    state: u64,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        // Avoid a zero state.
        let seed = if seed == 0 {
            ZERO_STATE_REPLACEMENT
        } else {
            seed
        };
        Self { state: seed }
    }

    /// Independent sub-stream for one cell during one tick.
    ///
    /// Every cell of every tick gets its own generator, so the draws a cell
    /// sees do not depend on how cells are scheduled across workers.
    pub fn for_cell(seed: u64, tick: TicksCount, index: usize) -> Self {
        let mut h = splitmix64(seed);
        h = splitmix64(h ^ u64::from(tick));
        h = splitmix64(h ^ index as u64);
        Self::new(h)
    }

    #[cfg(feature = "std")]
    pub(crate) fn from_state(state: u64) -> Self {
        Self::new(state)
    }

    #[cfg(feature = "std")]
    pub(crate) fn state(&self) -> u64 {
        self.state
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        // Marsaglia / Vigna family. Simple, fast, decent for simulation noise.
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// A draw in `[0, MAX_CHANCE)`, compared against chance thresholds.
    #[inline]
    pub fn next_chance(&mut self) -> Chance {
        self.next_u32() % MAX_CHANCE
    }
}

#[inline]
fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
