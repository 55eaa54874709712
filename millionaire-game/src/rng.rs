//! Seeded linear congruential generator for reproducible answer shuffles.
//!
//! The generator reproduces the classic Numerical Recipes LCG exactly so a
//! session persisted by any earlier build renders its options in the same
//! order after a reload.

use rand::RngCore;

use crate::constants::{LCG_INCREMENT, LCG_MODULUS, LCG_MULTIPLIER};
use crate::numbers::{floor_f64_to_i64, i64_to_f64};

/// Deterministic pseudo-random source seeded from a single 32-bit value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeededRandom {
    state: u64,
}

impl SeededRandom {
    #[must_use]
    pub fn new(seed: u32) -> Self {
        Self {
            state: u64::from(seed),
        }
    }

    fn step(&mut self) -> u32 {
        // state < 2^32, so the product stays well inside u64
        self.state = (LCG_MULTIPLIER * self.state + LCG_INCREMENT) % LCG_MODULUS;
        u32::try_from(self.state).unwrap_or(u32::MAX)
    }

    /// Next value in `[0, 1)`.
    pub fn next(&mut self) -> f64 {
        let raw = self.step();
        f64::from(raw) / i64_to_f64(1_i64 << 32)
    }

    /// Next integer in `min..max` (`max` exclusive).
    pub fn next_int(&mut self, min: i64, max: i64) -> i64 {
        let span = i64_to_f64(max - min);
        floor_f64_to_i64(self.next() * span) + min
    }

    /// Fisher-Yates shuffle into a new vector; the input is left untouched.
    pub fn shuffle<T: Clone>(&mut self, items: &[T]) -> Vec<T> {
        let mut result = items.to_vec();
        for i in (1..result.len()).rev() {
            let upper = i64::try_from(i + 1).unwrap_or(i64::MAX);
            let j = usize::try_from(self.next_int(0, upper)).unwrap_or(0);
            result.swap(i, j);
        }
        result
    }
}

impl RngCore for SeededRandom {
    fn next_u32(&mut self) -> u32 {
        self.step()
    }

    fn next_u64(&mut self) -> u64 {
        let high = u64::from(self.step());
        let low = u64::from(self.step());
        (high << 32) | low
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        fill_from_steps(self, dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        fill_from_steps(self, dest);
        Ok(())
    }
}

fn fill_from_steps(rng: &mut SeededRandom, dest: &mut [u8]) {
    for chunk in dest.chunks_mut(4) {
        let bytes = rng.step().to_le_bytes();
        chunk.copy_from_slice(&bytes[..chunk.len()]);
    }
}
