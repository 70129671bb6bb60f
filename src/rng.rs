//! Tie-break randomness, threaded explicitly instead of kept as process
//! global state so tree shape stays reproducible in tests.
//!
//! Backed by `rand_pcg::Pcg32`, seeded from `--random-seed`.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

pub struct TieBreakRng(Pcg32);

impl TieBreakRng {
    pub fn new(seed: u64) -> Self {
        Self(Pcg32::seed_from_u64(seed))
    }

    /// Uniform-randomly pick one of `candidates`.
    pub fn pick<T: Copy>(&mut self, candidates: &[T]) -> T {
        debug_assert!(!candidates.is_empty());
        let idx = self.0.gen_range(0..candidates.len());
        candidates[idx]
    }
}
