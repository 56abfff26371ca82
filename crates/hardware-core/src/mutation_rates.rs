use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::rng::RandomExt;

/// Per-organism mutation probabilities.
///
/// `divide_*` rates apply at most one event per division, `div_*` rates are
/// per-site, `poisson_*` values are mean counts per division, `point_*` rates
/// act on the executing parent memory and `parent_*` rates on the parent at
/// division.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MutationRates {
    pub point_mut_prob: f64,
    pub point_ins_prob: f64,
    pub point_del_prob: f64,

    pub copy_mut_prob: f64,
    pub copy_uniform_prob: f64,

    pub divide_mut_prob: f64,
    pub divide_ins_prob: f64,
    pub divide_del_prob: f64,
    pub divide_uniform_prob: f64,
    pub divide_slip_prob: f64,
    pub divide_trans_prob: f64,
    pub divide_lgt_prob: f64,

    pub div_mut_prob: f64,
    pub div_ins_prob: f64,
    pub div_del_prob: f64,
    pub div_uniform_prob: f64,
    pub div_slip_prob: f64,
    pub div_trans_prob: f64,
    pub div_lgt_prob: f64,

    pub poisson_mut_mean: f64,
    pub poisson_ins_mean: f64,
    pub poisson_del_mean: f64,
    pub poisson_slip_mean: f64,
    pub poisson_trans_mean: f64,
    pub poisson_lgt_mean: f64,

    pub parent_mut_prob: f64,
    pub parent_ins_prob: f64,
    pub parent_del_prob: f64,
}

impl MutationRates {
    pub fn probabilities(&self) -> [(&'static str, f64); 22] {
        [
            ("point_mut_prob", self.point_mut_prob),
            ("point_ins_prob", self.point_ins_prob),
            ("point_del_prob", self.point_del_prob),
            ("copy_mut_prob", self.copy_mut_prob),
            ("copy_uniform_prob", self.copy_uniform_prob),
            ("divide_mut_prob", self.divide_mut_prob),
            ("divide_ins_prob", self.divide_ins_prob),
            ("divide_del_prob", self.divide_del_prob),
            ("divide_uniform_prob", self.divide_uniform_prob),
            ("divide_slip_prob", self.divide_slip_prob),
            ("divide_trans_prob", self.divide_trans_prob),
            ("divide_lgt_prob", self.divide_lgt_prob),
            ("div_mut_prob", self.div_mut_prob),
            ("div_ins_prob", self.div_ins_prob),
            ("div_del_prob", self.div_del_prob),
            ("div_uniform_prob", self.div_uniform_prob),
            ("div_slip_prob", self.div_slip_prob),
            ("div_trans_prob", self.div_trans_prob),
            ("div_lgt_prob", self.div_lgt_prob),
            ("parent_mut_prob", self.parent_mut_prob),
            ("parent_ins_prob", self.parent_ins_prob),
            ("parent_del_prob", self.parent_del_prob),
        ]
    }

    pub fn poisson_means(&self) -> [(&'static str, f64); 6] {
        [
            ("poisson_mut_mean", self.poisson_mut_mean),
            ("poisson_ins_mean", self.poisson_ins_mean),
            ("poisson_del_mean", self.poisson_del_mean),
            ("poisson_slip_mean", self.poisson_slip_mean),
            ("poisson_trans_mean", self.poisson_trans_mean),
            ("poisson_lgt_mean", self.poisson_lgt_mean),
        ]
    }

    pub fn test_copy_mut<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.p(self.copy_mut_prob)
    }

    pub fn test_copy_uniform<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.p(self.copy_uniform_prob)
    }

    pub fn test_divide_mut<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.p(self.divide_mut_prob)
    }

    pub fn test_divide_ins<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.p(self.divide_ins_prob)
    }

    pub fn test_divide_del<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.p(self.divide_del_prob)
    }

    pub fn test_divide_uniform<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.p(self.divide_uniform_prob)
    }

    pub fn test_divide_slip<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.p(self.divide_slip_prob)
    }

    pub fn test_divide_trans<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.p(self.divide_trans_prob)
    }

    pub fn test_divide_lgt<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.p(self.divide_lgt_prob)
    }

    pub fn num_poisson_mut<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        rng.poisson(self.poisson_mut_mean)
    }

    pub fn num_poisson_ins<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        rng.poisson(self.poisson_ins_mean)
    }

    pub fn num_poisson_del<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        rng.poisson(self.poisson_del_mean)
    }

    pub fn num_poisson_slip<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        rng.poisson(self.poisson_slip_mean)
    }

    pub fn num_poisson_trans<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        rng.poisson(self.poisson_trans_mean)
    }

    pub fn num_poisson_lgt<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        rng.poisson(self.poisson_lgt_mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    #[test]
    fn zero_rates_never_fire() {
        let rates = MutationRates::default();
        let mut rng = ChaCha12Rng::seed_from_u64(11);
        for _ in 0..100 {
            assert!(!rates.test_divide_mut(&mut rng));
            assert!(!rates.test_divide_slip(&mut rng));
            assert_eq!(rates.num_poisson_ins(&mut rng), 0);
        }
    }

    #[test]
    fn certain_rates_always_fire() {
        let rates = MutationRates {
            divide_lgt_prob: 1.0,
            copy_mut_prob: 1.0,
            ..MutationRates::default()
        };
        let mut rng = ChaCha12Rng::seed_from_u64(12);
        assert!(rates.test_divide_lgt(&mut rng));
        assert!(rates.test_copy_mut(&mut rng));
    }
}
