use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;

use crate::constants::{POISSON_KNUTH_LIMIT, RNG_DERIVATION_PRIME};

/// Create a deterministic RNG from a seed.
pub fn create_rng(seed: u64) -> ChaCha12Rng {
    ChaCha12Rng::seed_from_u64(seed)
}

/// Stream for one organism, so its draws do not depend on how many other
/// organisms ran before it in an update.
pub fn derive_organism_rng(run_seed: u64, organism_id: u64) -> ChaCha12Rng {
    let offset = organism_id.wrapping_mul(RNG_DERIVATION_PRIME);
    create_rng(run_seed ^ offset.rotate_left(17))
}

/// Draws used by the cost ledger, the mutation operators and the fitness gate.
///
/// Binomial and Poisson sampling are implemented here rather than pulled from
/// `rand_distr`; genome lengths are bounded, so the simple samplers are exact
/// enough and cheap.
pub trait RandomExt: Rng {
    /// Bernoulli trial. Probabilities outside `(0, 1)` saturate instead of panicking.
    fn p(&mut self, prob: f64) -> bool {
        if !(prob > 0.0) {
            return false;
        }
        if prob >= 1.0 {
            return true;
        }
        self.random::<f64>() < prob
    }

    /// Uniform index in `0..n`; `0` when `n == 0`.
    fn index(&mut self, n: usize) -> usize {
        if n == 0 {
            0
        } else {
            self.random_range(0..n)
        }
    }

    /// Number of successes in `n` independent trials with probability `prob`.
    fn binomial(&mut self, n: usize, prob: f64) -> usize {
        if n == 0 || !(prob > 0.0) {
            return 0;
        }
        if prob >= 1.0 {
            return n;
        }
        if prob > 0.5 {
            return n - self.binomial(n, 1.0 - prob);
        }
        // Geometric skips between successes: O(n * prob) draws.
        let log_q = (1.0 - prob).ln();
        let mut count = 0;
        let mut position = 0usize;
        loop {
            let u: f64 = self.random::<f64>().max(f64::MIN_POSITIVE);
            let skip = (u.ln() / log_q).floor();
            if !skip.is_finite() || skip >= (n - position) as f64 {
                return count;
            }
            position += skip as usize + 1;
            count += 1;
            if position >= n {
                return count;
            }
        }
    }

    /// Poisson-distributed count with the given mean.
    fn poisson(&mut self, mean: f64) -> usize {
        if !(mean > 0.0) || !mean.is_finite() {
            return 0;
        }
        if mean > POISSON_KNUTH_LIMIT {
            // Box-Muller normal approximation for large means.
            let u1: f64 = self.random::<f64>().max(f64::EPSILON);
            let u2: f64 = self.random::<f64>();
            let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
            return (mean + z * mean.sqrt()).round().max(0.0) as usize;
        }
        let limit = (-mean).exp();
        let mut product: f64 = self.random::<f64>();
        let mut count = 0;
        while product > limit {
            product *= self.random::<f64>();
            count += 1;
        }
        count
    }
}

impl<R: Rng + ?Sized> RandomExt for R {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn organism_streams_are_distinct_and_reproducible() {
        let first: Vec<u64> = (0..3).map(|id| derive_organism_rng(42, id).random()).collect();
        let again: Vec<u64> = (0..3).map(|id| derive_organism_rng(42, id).random()).collect();
        assert_eq!(first, again);
        assert_ne!(first[0], first[1]);
        assert_ne!(first[1], first[2]);
        assert_ne!(derive_organism_rng(43, 1).random::<u64>(), first[1]);
    }

    #[test]
    fn p_saturates_at_bounds() {
        let mut rng = create_rng(1);
        assert!(!rng.p(0.0));
        assert!(!rng.p(-1.0));
        assert!(!rng.p(f64::NAN));
        assert!(rng.p(1.0));
        assert!(rng.p(3.0));
    }

    #[test]
    fn index_of_empty_range_is_zero() {
        let mut rng = create_rng(2);
        assert_eq!(rng.index(0), 0);
        for _ in 0..100 {
            assert!(rng.index(7) < 7);
        }
    }

    #[test]
    fn binomial_stays_within_trials_and_tracks_mean() {
        let mut rng = create_rng(3);
        assert_eq!(rng.binomial(100, 0.0), 0);
        assert_eq!(rng.binomial(100, 1.0), 100);
        let mut total = 0;
        for _ in 0..2000 {
            let draw = rng.binomial(200, 0.05);
            assert!(draw <= 200);
            total += draw;
        }
        let mean = total as f64 / 2000.0;
        assert!((mean - 10.0).abs() < 1.0, "mean was {mean}");
    }

    #[test]
    fn binomial_with_high_probability_uses_complement() {
        let mut rng = create_rng(4);
        let mut total = 0;
        for _ in 0..2000 {
            total += rng.binomial(50, 0.9);
        }
        let mean = total as f64 / 2000.0;
        assert!((mean - 45.0).abs() < 1.0, "mean was {mean}");
    }

    #[test]
    fn poisson_tracks_mean_for_small_and_large_means() {
        let mut rng = create_rng(5);
        for &mean in &[0.5, 4.0, 80.0] {
            let total: usize = (0..4000).map(|_| rng.poisson(mean)).sum();
            let observed = total as f64 / 4000.0;
            assert!(
                (observed - mean).abs() < mean.sqrt() * 0.2 + 0.1,
                "mean {mean} observed {observed}"
            );
        }
        assert_eq!(rng.poisson(0.0), 0);
    }
}
