//! Trace sources.
//!
//! The builder never measures anything itself: it asks a [`TraceSource`] for
//! a batch of traces per hypothesis. [`GaussianLeakageSource`] is the
//! simulated source used by the experiment driver and the tests. Plain
//! closures with the right signature are sources too, which keeps
//! hand-crafted fixtures short.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

use crate::error::{Result, TemplarError};
use crate::trace::{Hypothesis, Trace, TraceSet};

/// Default leakage per unit of hypothesis value.
pub const DEFAULT_LEAKAGE_SCALE: f64 = 0.1;
/// Default standard deviation of the additive measurement noise.
pub const DEFAULT_NOISE_STD_DEV: f64 = 0.05;

/// Anything that can produce labeled traces for a hypothesis.
pub trait TraceSource {
    /// Produce `count` traces of `num_samples` samples each, captured while
    /// the device processed `hypothesis`.
    fn generate(
        &mut self,
        hypothesis: Hypothesis,
        count: usize,
        num_samples: usize,
    ) -> Result<TraceSet>;
}

impl<F> TraceSource for F
where
    F: FnMut(Hypothesis, usize, usize) -> Result<TraceSet>,
{
    fn generate(
        &mut self,
        hypothesis: Hypothesis,
        count: usize,
        num_samples: usize,
    ) -> Result<TraceSet> {
        self(hypothesis, count, num_samples)
    }
}

/// Simulated device: every sample leaks `hypothesis * leakage_scale` plus
/// independent Gaussian noise.
///
/// The RNG is owned by the source and injected by the caller, so a seeded
/// source always yields the same traces.
#[derive(Debug, Clone)]
pub struct GaussianLeakageSource<R> {
    rng: R,
    leakage_scale: f64,
    noise_std_dev: f64,
}

impl GaussianLeakageSource<StdRng> {
    /// Source backed by a `StdRng` seeded from `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Source backed by a `StdRng` seeded from OS entropy.
    pub fn from_os_rng() -> Self {
        Self::new(StdRng::from_os_rng())
    }
}

impl<R: Rng> GaussianLeakageSource<R> {
    /// Source with the default leakage model (scale 0.1, noise σ 0.05).
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            leakage_scale: DEFAULT_LEAKAGE_SCALE,
            noise_std_dev: DEFAULT_NOISE_STD_DEV,
        }
    }

    /// Override the leakage per unit of hypothesis value.
    pub fn with_leakage_scale(mut self, scale: f64) -> Result<Self> {
        if !scale.is_finite() {
            return Err(TemplarError::config(format!(
                "leakage scale must be finite, got {scale}"
            )));
        }
        self.leakage_scale = scale;
        Ok(self)
    }

    /// Override the noise standard deviation. Zero gives noiseless traces.
    pub fn with_noise_std_dev(mut self, std_dev: f64) -> Result<Self> {
        if !std_dev.is_finite() || std_dev < 0.0 {
            return Err(TemplarError::config(format!(
                "noise std-dev must be finite and >= 0, got {std_dev}"
            )));
        }
        self.noise_std_dev = std_dev;
        Ok(self)
    }

    pub fn leakage_scale(&self) -> f64 {
        self.leakage_scale
    }

    pub fn noise_std_dev(&self) -> f64 {
        self.noise_std_dev
    }

    /// Noise-free leakage for `hypothesis`.
    pub fn leakage(&self, hypothesis: Hypothesis) -> f64 {
        f64::from(hypothesis.value()) * self.leakage_scale
    }

    /// A single trace for `hypothesis`, e.g. the unknown trace of an attack.
    pub fn trace(&mut self, hypothesis: Hypothesis, num_samples: usize) -> Trace {
        let leakage = self.leakage(hypothesis);
        let samples = (0..num_samples)
            .map(|_| {
                let z: f64 = StandardNormal.sample(&mut self.rng);
                leakage + self.noise_std_dev * z
            })
            .collect();
        Trace::new(samples)
    }

    /// Mutable access to the RNG, for drivers that draw other values (such as
    /// random true keys) from the same reproducible stream.
    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }
}

impl<R: Rng> TraceSource for GaussianLeakageSource<R> {
    fn generate(
        &mut self,
        hypothesis: Hypothesis,
        count: usize,
        num_samples: usize,
    ) -> Result<TraceSet> {
        let traces = (0..count)
            .map(|_| self.trace(hypothesis, num_samples))
            .collect();
        TraceSet::new(hypothesis, traces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_sources_are_reproducible() {
        let mut a = GaussianLeakageSource::seeded(7);
        let mut b = GaussianLeakageSource::seeded(7);
        let sa = a.generate(Hypothesis(3), 4, 10).unwrap();
        let sb = b.generate(Hypothesis(3), 4, 10).unwrap();
        assert_eq!(sa, sb);
    }

    #[test]
    fn different_seeds_differ() {
        let mut a = GaussianLeakageSource::seeded(1);
        let mut b = GaussianLeakageSource::seeded(2);
        assert_ne!(a.trace(Hypothesis(0), 16), b.trace(Hypothesis(0), 16));
    }

    #[test]
    fn shape_matches_request() {
        let mut src = GaussianLeakageSource::seeded(0);
        let set = src.generate(Hypothesis(9), 6, 3).unwrap();
        assert_eq!(set.len(), 6);
        assert_eq!(set.num_samples(), 3);
        assert_eq!(set.hypothesis(), Hypothesis(9));
    }

    #[test]
    fn noiseless_source_emits_pure_leakage() {
        let mut src = GaussianLeakageSource::seeded(0)
            .with_leakage_scale(0.5)
            .unwrap()
            .with_noise_std_dev(0.0)
            .unwrap();
        let t = src.trace(Hypothesis(4), 5);
        assert!(t.samples().iter().all(|&s| s == 2.0));
    }

    #[test]
    fn noise_is_centered_on_leakage() {
        let mut src = GaussianLeakageSource::seeded(11);
        let t = src.trace(Hypothesis(200), 20_000);
        let mean = t.samples().iter().sum::<f64>() / t.len() as f64;
        assert!((mean - 20.0).abs() < 0.005, "mean {mean}");
    }

    #[test]
    fn rejects_bad_noise() {
        let src = GaussianLeakageSource::seeded(0);
        assert!(matches!(
            src.clone().with_noise_std_dev(-1.0),
            Err(TemplarError::InvalidConfiguration(_))
        ));
        assert!(src.with_noise_std_dev(f64::NAN).is_err());
    }

    #[test]
    fn closures_are_sources() {
        let mut src = |h: Hypothesis, count: usize, n: usize| {
            TraceSet::new(h, vec![Trace::new(vec![f64::from(h.value()); n]); count])
        };
        let set = src.generate(Hypothesis(2), 3, 4).unwrap();
        assert_eq!(set.traces()[0].samples(), &[2.0; 4]);
    }
}
