//! Deterministic utilities for reproducible training
//!
//! Provides an LCG-based RNG and tie-breaking logic so that identical
//! inputs and seeds produce identical trees, folds and samples.

use std::num::Wrapping;

/// Linear Congruential Generator for deterministic pseudo-randomness
/// Uses constants from Numerical Recipes (glibc)
#[derive(Clone, Debug)]
pub struct LcgRng {
    state: Wrapping<i64>,
}

impl LcgRng {
    // LCG constants (compatible with glibc)
    const MULTIPLIER: i64 = 1103515245;
    const INCREMENT: i64 = 12345;
    const MODULUS: i64 = 1 << 31;

    pub fn new(seed: u64) -> Self {
        Self {
            state: Wrapping((seed % Self::MODULUS as u64) as i64),
        }
    }

    /// Generate next random i64 in range [0, MODULUS)
    pub fn next_i64(&mut self) -> i64 {
        self.state = self.state * Wrapping(Self::MULTIPLIER) + Wrapping(Self::INCREMENT);
        (self.state.0 & (Self::MODULUS - 1)).abs()
    }

    /// Generate random value in range [0, max)
    ///
    /// Scales from the high bits; the low bits of a power-of-two LCG cycle
    /// with short periods.
    pub fn next_range(&mut self, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        ((self.next_f64() * max as f64) as usize).min(max - 1)
    }

    /// Uniform value in [0.0, 1.0)
    pub fn next_f64(&mut self) -> f64 {
        self.next_i64() as f64 / Self::MODULUS as f64
    }

    /// Fisher-Yates shuffle driven by this generator
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_range(i + 1);
            items.swap(i, j);
        }
    }

    /// Derive an independent generator for a sub-task (fold, tree, ...)
    pub fn fork(&mut self, salt: u64) -> Self {
        let base = self.next_i64() as u64;
        Self::new(base.wrapping_mul(31).wrapping_add(salt))
    }
}

/// Deterministic tie-breaker for split selection
/// Lower (feature_idx, bin) wins when two splits have the same gain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SplitTieBreaker {
    pub feature_idx: usize,
    pub bin: usize,
}

impl SplitTieBreaker {
    pub fn new(feature_idx: usize, bin: usize) -> Self {
        Self { feature_idx, bin }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcg_determinism() {
        let mut rng1 = LcgRng::new(42);
        let mut rng2 = LcgRng::new(42);

        for _ in 0..100 {
            assert_eq!(rng1.next_i64(), rng2.next_i64());
        }
    }

    #[test]
    fn test_lcg_range() {
        let mut rng = LcgRng::new(42);
        for _ in 0..100 {
            let val = rng.next_range(10);
            assert!(val < 10);
        }
    }

    #[test]
    fn test_small_ranges_do_not_alternate() {
        let mut rng = LcgRng::new(42);
        let coins: Vec<usize> = (0..64).map(|_| rng.next_range(2)).collect();
        assert!(coins.windows(2).any(|w| w[0] == w[1]));

        let mut counts = [0usize; 4];
        for _ in 0..4000 {
            counts[rng.next_range(4)] += 1;
        }
        assert!(counts.iter().all(|&c| (800..=1200).contains(&c)), "{counts:?}");
    }

    #[test]
    fn test_unit_interval() {
        let mut rng = LcgRng::new(7);
        for _ in 0..1000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut rng = LcgRng::new(3);
        let mut items: Vec<usize> = (0..50).collect();
        rng.shuffle(&mut items);

        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
        assert_ne!(items, sorted);
    }

    #[test]
    fn test_tie_breaker_ordering() {
        let t1 = SplitTieBreaker::new(0, 4);
        let t2 = SplitTieBreaker::new(0, 5);
        let t3 = SplitTieBreaker::new(1, 0);

        assert!(t1 < t2);
        assert!(t2 < t3);
    }
}
