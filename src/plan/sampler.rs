//! Randomness seam for plan allocation
//!
//! The allocator only ever asks for "pick `count` distinct indices out of
//! `available`", so tests can swap in a scripted implementation.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Source of uniform sampling without replacement
pub trait Sampler: Send {
    /// Pick `count` distinct indices in `0..available`, uniformly at random.
    /// `count` must not exceed `available`.
    fn pick(&mut self, available: usize, count: usize) -> Vec<usize>;
}

/// Production sampler backed by a seedable RNG
pub struct RandomSampler {
    rng: StdRng,
}

impl RandomSampler {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for RandomSampler {
    fn pick(&mut self, available: usize, count: usize) -> Vec<usize> {
        rand::seq::index::sample(&mut self.rng, available, count).into_vec()
    }
}

/// Sampler that always takes the first `count` indices, for deterministic tests
#[cfg(test)]
pub struct FirstN;

#[cfg(test)]
impl Sampler for FirstN {
    fn pick(&mut self, _available: usize, count: usize) -> Vec<usize> {
        (0..count).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_picks_are_distinct_and_in_range() {
        let mut sampler = RandomSampler::seeded(7);
        let picks = sampler.pick(10, 4);
        assert_eq!(picks.len(), 4);
        let unique: HashSet<_> = picks.iter().collect();
        assert_eq!(unique.len(), 4);
        assert!(picks.iter().all(|&i| i < 10));
    }

    #[test]
    fn test_full_draw_covers_everything() {
        let mut sampler = RandomSampler::seeded(42);
        let mut picks = sampler.pick(5, 5);
        picks.sort_unstable();
        assert_eq!(picks, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_seeded_sampler_is_reproducible() {
        let mut first = RandomSampler::seeded(123);
        let mut second = RandomSampler::seeded(123);
        assert_eq!(first.pick(20, 6), second.pick(20, 6));
    }

    #[test]
    fn test_zero_count() {
        let mut sampler = RandomSampler::seeded(1);
        assert!(sampler.pick(10, 0).is_empty());
    }
}
