//! Seeded randomness for a single simulation run.
//!
//! Nothing in the simulator touches a platform RNG. Every jitter, loss and
//! noise draw comes from the run's [`RandomStream`], in the order the
//! scheduler dispatches events, so a fixed seed replays bit for bit.
//!
//! Draws per primitive:
//! - asynchronous wake-up: 1, synchronous wake-up: 0
//! - channel signal: 1 loss draw, plus 1 delay draw when delivered
//! - gradient step: 1 noise draw per coordinate
//!
//! Exogenous arrivals (backpressure ingress) draw from a [`RandomStream::fork`]
//! of their own, so they stay the same whatever the channel loses.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Poisson, Uniform};

/// Source of uniform draws in `[0, 1)`.
///
/// The stochastic primitives only need this, which lets tests script the
/// exact draws a primitive sees.
pub trait UnitSource {
    fn next_unit(&mut self) -> f64;

    /// `next_unit() - 0.5`, a draw in `[-0.5, 0.5)`.
    fn centered(&mut self) -> f64 {
        self.next_unit() - 0.5
    }

    /// Bernoulli trial, true with probability `p`. One draw.
    fn chance(&mut self, p: f64) -> bool {
        self.next_unit() < p
    }
}

#[derive(Debug, Clone)]
pub struct RandomStream {
    seed: u64,
    inner: ChaCha8Rng,
    unit: Uniform<f64>,
    draws: u64,
}

impl RandomStream {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            inner: ChaCha8Rng::seed_from_u64(seed),
            unit: Uniform::new(0.0, 1.0),
            draws: 0,
        }
    }

    /// Independent stream derived from this stream's seed and a stable index.
    /// Forking does not advance `self`, and no index yields the parent seed.
    pub fn fork(&self, index: u64) -> Self {
        Self::new(self.seed ^ index.wrapping_add(1).wrapping_mul(0x9e37_79b9_7f4a_7c15))
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of draws taken so far.
    pub fn draws(&self) -> u64 {
        self.draws
    }

    pub fn uniform(&mut self) -> f64 {
        self.draws += 1;
        self.unit.sample(&mut self.inner)
    }

    /// Poisson count with the given mean; a non-positive mean yields 0
    /// without drawing.
    pub fn poisson(&mut self, mean: f64) -> f64 {
        if !(mean > 0.0) || !mean.is_finite() {
            return 0.0;
        }
        self.draws += 1;
        match Poisson::new(mean) {
            Ok(dist) => dist.sample(&mut self.inner),
            Err(_) => 0.0,
        }
    }

}

impl UnitSource for RandomStream {
    fn next_unit(&mut self) -> f64 {
        self.uniform()
    }
}

/// Replays a fixed list of draws, cycling when exhausted.
#[derive(Debug, Clone)]
pub struct ScriptedDraws {
    values: Vec<f64>,
    pos: usize,
}

impl ScriptedDraws {
    pub fn new(values: impl Into<Vec<f64>>) -> Self {
        let values = values.into();
        assert!(!values.is_empty(), "scripted draws need at least one value");
        Self { values, pos: 0 }
    }

    /// Every draw returns `value`.
    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }

    pub fn consumed(&self) -> usize {
        self.pos
    }
}

impl UnitSource for ScriptedDraws {
    fn next_unit(&mut self) -> f64 {
        let v = self.values[self.pos % self.values.len()];
        self.pos += 1;
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = RandomStream::new(42);
        let mut b = RandomStream::new(42);
        for _ in 0..100 {
            assert_eq!(a.uniform().to_bits(), b.uniform().to_bits());
        }
        assert_eq!(a.draws(), 100);
    }

    #[test]
    fn test_uniform_range() {
        let mut rng = RandomStream::new(7);
        for _ in 0..10_000 {
            let u = rng.uniform();
            assert!((0.0..1.0).contains(&u));
        }
    }

    #[test]
    fn test_fork_is_independent_of_parent_position() {
        let parent = RandomStream::new(9);
        let mut advanced = parent.clone();
        advanced.uniform();

        let mut f1 = parent.fork(3);
        let mut f2 = advanced.fork(3);
        assert_eq!(f1.uniform().to_bits(), f2.uniform().to_bits());

        let mut other = parent.fork(4);
        let mut f3 = parent.fork(3);
        assert_ne!(other.uniform().to_bits(), f3.uniform().to_bits());

        let mut first = parent.fork(0);
        let mut same = RandomStream::new(9);
        assert_ne!(first.uniform().to_bits(), same.uniform().to_bits());
    }

    #[test]
    fn test_poisson_non_positive_mean() {
        let mut rng = RandomStream::new(1);
        assert_eq!(rng.poisson(0.0), 0.0);
        assert_eq!(rng.poisson(-3.0), 0.0);
        assert_eq!(rng.draws(), 0);
        assert!(rng.poisson(4.0) >= 0.0);
    }

    #[test]
    fn test_scripted_draws_cycle() {
        let mut s = ScriptedDraws::new(vec![0.1, 0.9]);
        assert_eq!(s.next_unit(), 0.1);
        assert_eq!(s.next_unit(), 0.9);
        assert_eq!(s.next_unit(), 0.1);
        assert_eq!(s.consumed(), 3);
        assert!((ScriptedDraws::constant(0.75).centered() - 0.25).abs() < 1e-12);

        let mut s = ScriptedDraws::new(vec![0.2, 0.3]);
        assert!(s.chance(0.25));
        assert!(!s.chance(0.25));
        assert_eq!(s.consumed(), 2);
    }
}
