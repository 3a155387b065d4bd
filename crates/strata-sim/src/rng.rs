//! Deterministic random number generation.
//!
//! A thin facade over `ChaCha8Rng`: explicitly seeded, forkable into
//! independent per-node streams, and never backed by process-wide state.
//! Same seed, same draw sequence, same run.

use rand::{Rng as _, RngCore as _, SeedableRng as _};
use rand_chacha::ChaCha8Rng;

/// Seeded, forkable random number generator for simulation use.
#[derive(Debug, Clone)]
pub struct SimRng {
    inner: ChaCha8Rng,
}

impl SimRng {
    /// Creates a generator from a seed.
    pub fn new(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Generates a random `u64`.
    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    /// Generates a random `u64` in `[min, max)`.
    pub fn next_u64_range(&mut self, min: u64, max: u64) -> u64 {
        debug_assert!(min < max, "min must be < max");
        self.inner.gen_range(min..max)
    }

    /// Generates a random `usize` in `[0, max)`.
    pub fn next_usize(&mut self, max: usize) -> usize {
        debug_assert!(max > 0, "max must be positive");
        self.inner.gen_range(0..max)
    }

    /// Generates a random `bool`.
    pub fn next_bool(&mut self) -> bool {
        self.inner.r#gen()
    }

    /// Generates a random `f64` in `[0.0, 1.0)`.
    pub fn next_f64(&mut self) -> f64 {
        self.inner.r#gen()
    }

    /// Generates a random `bool` that is `true` with the given probability.
    pub fn next_bool_with_probability(&mut self, probability: f64) -> bool {
        self.next_f64() < probability
    }

    /// Forks an independent generator with a derived seed.
    ///
    /// Used to give each node its own stream: the fork order is fixed by the
    /// topology, so per-node randomness stays reproducible.
    pub fn fork(&mut self) -> SimRng {
        SimRng::new(self.next_u64())
    }
}
