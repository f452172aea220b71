//! Beta-distributed draws for Thompson sampling.
//!
//! The native path builds a Beta variate from two independent Gamma variates
//! generated with the Marsaglia-Tsang squeeze. With the `rand-distr` feature
//! enabled, [`RandDistrBeta`] delegates to `rand_distr::Beta` instead; both
//! produce the same distribution, not the same bits.

use rand::Rng;
use rand_core::RngCore;
use thiserror::Error;

/// Pseudo-count added to both sides of every posterior built in this crate.
pub const PRIOR_PSEUDO_COUNT: f64 = 2.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SamplerError {
    /// A shape, scale, alpha or beta parameter was not strictly positive.
    #[error("Invalid distribution parameter {name} = {value}")]
    InvalidDistributionParameter { name: &'static str, value: f64 },
}

impl SamplerError {
    /// An invalid parameter means an upstream statistics bug.
    pub fn is_fatal(&self) -> bool {
        true
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<(), SamplerError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(SamplerError::InvalidDistributionParameter { name, value })
    }
}

/// Parameters of a Beta distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaDist {
    pub alpha: f64,
    pub beta: f64,
}

impl BetaDist {
    pub fn new(alpha: f64, beta: f64) -> Result<Self, SamplerError> {
        check_positive("alpha", alpha)?;
        check_positive("beta", beta)?;
        Ok(Self { alpha, beta })
    }

    /// Posterior after observing `successes` out of `trials` Bernoulli trials,
    /// starting from a symmetric prior of [`PRIOR_PSEUDO_COUNT`] on each side.
    pub fn from_counts(successes: u64, trials: u64) -> Self {
        let failures = trials.saturating_sub(successes);
        Self {
            alpha: successes as f64 + PRIOR_PSEUDO_COUNT,
            beta: failures as f64 + PRIOR_PSEUDO_COUNT,
        }
    }

    /// Point estimate of the success probability, `(a - 1) / (a + b - 2)`.
    ///
    /// Defined whenever `alpha + beta > 2`, which the pseudo-count prior
    /// guarantees for every posterior produced by `from_counts`.
    pub fn mode(&self) -> f64 {
        (self.alpha - 1.0) / (self.alpha + self.beta - 2.0)
    }

    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// Rescales a per-operator posterior against the entry-wide posterior.
    ///
    /// `alpha` is kept; the failure pseudo-count becomes
    /// `(beta - 2) * global.alpha / global.beta + 2`, which puts rarely and
    /// frequently tried operators on the same scale before they are compared.
    pub fn rescale_against(&self, global: &BetaDist) -> BetaDist {
        BetaDist {
            alpha: self.alpha,
            beta: (self.beta - PRIOR_PSEUDO_COUNT) * global.alpha / global.beta
                + PRIOR_PSEUDO_COUNT,
        }
    }
}

/// Uniform draw from `(0, 1]`, safe to take the log of.
fn open_unit<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    1.0 - rng.random::<f64>()
}

/// Standard normal variate via Box-Muller.
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1 = open_unit(rng);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Draws from `Gamma(shape, scale)`.
///
/// For `shape < 1` the draw is boosted through `Gamma(shape + 1) * U^(1/shape)`.
/// Otherwise candidates are generated by Marsaglia-Tsang until one passes the
/// squeeze or the log-domain test. There is no iteration cap: a generator that
/// never yields an acceptable candidate loops forever.
pub fn gamma_rand<R: Rng + ?Sized>(rng: &mut R, shape: f64, scale: f64) -> Result<f64, SamplerError> {
    check_positive("shape", shape)?;
    check_positive("scale", scale)?;

    if shape < 1.0 {
        let boosted = gamma_rand(rng, shape + 1.0, scale)?;
        return Ok(boosted * open_unit(rng).powf(1.0 / shape));
    }

    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let x = standard_normal(rng);
        let v = 1.0 + c * x;
        if v <= 0.0 {
            continue;
        }
        let v = v * v * v;
        let u = open_unit(rng);
        let x2 = x * x;
        if u < 1.0 - 0.0331 * x2 * x2 {
            return Ok(d * v * scale);
        }
        if u.ln() < 0.5 * x2 + d * (1.0 - v + v.ln()) {
            return Ok(d * v * scale);
        }
    }
}

/// `ln X` for `X ~ Gamma(shape, 1)`. Small shapes stay in the log domain,
/// where the boosted draw would otherwise underflow to zero.
fn ln_gamma_rand<R: Rng + ?Sized>(rng: &mut R, shape: f64) -> Result<f64, SamplerError> {
    if shape < 1.0 {
        let boosted = gamma_rand(rng, shape + 1.0, 1.0)?;
        return Ok(boosted.ln() + open_unit(rng).ln() / shape);
    }
    Ok(gamma_rand(rng, shape, 1.0)?.ln())
}

/// Draws from `Beta(alpha, beta)` as `X / (X + Y)` with independent
/// `X ~ Gamma(alpha, 1)` and `Y ~ Gamma(beta, 1)`, evaluated as the logistic
/// of `ln X - ln Y` so that tiny shapes never produce `0 / 0`.
pub fn beta_rand<R: Rng + ?Sized>(rng: &mut R, dist: &BetaDist) -> Result<f64, SamplerError> {
    check_positive("alpha", dist.alpha)?;
    check_positive("beta", dist.beta)?;
    let lx = ln_gamma_rand(rng, dist.alpha)?;
    let ly = ln_gamma_rand(rng, dist.beta)?;
    let d = ly - lx;
    if d > 0.0 {
        let e = (-d).exp();
        Ok(e / (1.0 + e))
    } else {
        Ok(1.0 / (1.0 + d.exp()))
    }
}

/// A source of Beta-distributed draws.
pub trait BetaSampler: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn sample(&self, rng: &mut dyn RngCore, dist: &BetaDist) -> Result<f64, SamplerError>;
}

/// The native Gamma-ratio sampler.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarsagliaTsang;

impl BetaSampler for MarsagliaTsang {
    fn name(&self) -> &'static str {
        "MarsagliaTsang"
    }

    fn sample(&self, rng: &mut dyn RngCore, dist: &BetaDist) -> Result<f64, SamplerError> {
        beta_rand(rng, dist)
    }
}

/// Delegates to `rand_distr::Beta`.
#[cfg(feature = "rand-distr")]
#[derive(Debug, Default, Clone, Copy)]
pub struct RandDistrBeta;

#[cfg(feature = "rand-distr")]
impl BetaSampler for RandDistrBeta {
    fn name(&self) -> &'static str {
        "RandDistrBeta"
    }

    fn sample(&self, rng: &mut dyn RngCore, dist: &BetaDist) -> Result<f64, SamplerError> {
        use rand_distr::Distribution;
        check_positive("alpha", dist.alpha)?;
        check_positive("beta", dist.beta)?;
        let beta = rand_distr::Beta::new(dist.alpha, dist.beta).map_err(|_| {
            SamplerError::InvalidDistributionParameter {
                name: "alpha",
                value: dist.alpha,
            }
        })?;
        Ok(beta.sample(rng))
    }
}

/// Thompson sampling: draws once from every arm and returns the index of the
/// largest draw, the lowest index winning ties. `None` when there are no arms.
pub fn thompson_select(
    arms: &[BetaDist],
    sampler: &dyn BetaSampler,
    rng: &mut dyn RngCore,
) -> Result<Option<usize>, SamplerError> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, arm) in arms.iter().enumerate() {
        let draw = sampler.sample(rng, arm)?;
        match best {
            Some((_, top)) if draw <= top => {}
            _ => best = Some((idx, draw)),
        }
    }
    Ok(best.map(|(idx, _)| idx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    fn sample_mean(sampler: &dyn BetaSampler, dist: BetaDist, draws: usize, seed: u64) -> f64 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut sum = 0.0;
        for _ in 0..draws {
            sum += sampler.sample(&mut rng, &dist).unwrap();
        }
        sum / draws as f64
    }

    #[test]
    fn fresh_prior_is_beta_two_two_with_mode_half() {
        let dist = BetaDist::from_counts(0, 0);
        assert_eq!(dist, BetaDist { alpha: 2.0, beta: 2.0 });
        assert_eq!(dist.mode(), 0.5);
        assert_eq!(dist.mean(), 0.5);
    }

    #[test]
    fn from_counts_adds_pseudo_counts() {
        let dist = BetaDist::from_counts(3, 10);
        assert_eq!(dist.alpha, 5.0);
        assert_eq!(dist.beta, 9.0);
        assert!((dist.mode() - 4.0 / 12.0).abs() < 1e-12);
    }

    #[test]
    fn rescale_keeps_alpha_and_scales_failures() {
        let local = BetaDist { alpha: 4.0, beta: 12.0 };
        let global = BetaDist { alpha: 6.0, beta: 3.0 };
        let rescaled = local.rescale_against(&global);
        assert_eq!(rescaled.alpha, 4.0);
        assert_eq!(rescaled.beta, 10.0 * 2.0 + 2.0);
    }

    #[test]
    fn rescale_of_untried_operator_is_unchanged_prior() {
        let local = BetaDist::from_counts(0, 0);
        let global = BetaDist::from_counts(10, 500);
        assert_eq!(local.rescale_against(&global), local);
    }

    #[test]
    fn new_rejects_non_positive_parameters() {
        assert!(BetaDist::new(0.0, 1.0).is_err());
        assert!(BetaDist::new(1.0, -2.0).is_err());
        assert!(BetaDist::new(f64::NAN, 1.0).is_err());
        assert!(BetaDist::new(0.5, 0.5).is_ok());
    }

    #[test]
    fn gamma_rejects_invalid_shape_and_scale() {
        let mut rng = ChaCha8Rng::from_seed([0; 32]);
        let err = gamma_rand(&mut rng, 0.0, 1.0).unwrap_err();
        assert_eq!(
            err,
            SamplerError::InvalidDistributionParameter {
                name: "shape",
                value: 0.0
            }
        );
        assert!(err.is_fatal());
        assert!(gamma_rand(&mut rng, 1.0, -1.0).is_err());
    }

    #[test]
    fn gamma_mean_matches_shape_times_scale() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for (shape, scale) in [(0.4, 1.0), (1.0, 2.0), (3.5, 0.5), (9.0, 1.0)] {
            let draws = 50_000;
            let mut sum = 0.0;
            for _ in 0..draws {
                let x = gamma_rand(&mut rng, shape, scale).unwrap();
                assert!(x >= 0.0);
                sum += x;
            }
            let mean = sum / draws as f64;
            let expected = shape * scale;
            assert!(
                (mean - expected).abs() < 0.05 * expected.max(1.0),
                "Gamma({shape}, {scale}) mean {mean} too far from {expected}"
            );
        }
    }

    #[test]
    fn beta_five_five_mean_converges() {
        let mean = sample_mean(&MarsagliaTsang, BetaDist { alpha: 5.0, beta: 5.0 }, 100_000, 42);
        assert!((mean - 0.5).abs() < 0.01, "sample mean {mean}");
    }

    #[test]
    fn skewed_beta_mean_converges() {
        let dist = BetaDist { alpha: 2.0, beta: 8.0 };
        let mean = sample_mean(&MarsagliaTsang, dist, 100_000, 7);
        assert!((mean - dist.mean()).abs() < 0.01, "sample mean {mean}");
    }

    #[test]
    fn beta_draws_stay_in_unit_interval() {
        let mut rng = ChaCha8Rng::from_seed([3; 32]);
        let dist = BetaDist { alpha: 0.3, beta: 0.7 };
        for _ in 0..10_000 {
            let x = beta_rand(&mut rng, &dist).unwrap();
            assert!((0.0..=1.0).contains(&x));
        }
    }

    #[test]
    fn tiny_shape_beta_draws_are_never_nan() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let dist = BetaDist { alpha: 0.001, beta: 0.001 };
        let mut sum = 0.0;
        for _ in 0..10_000 {
            let v = beta_rand(&mut rng, &dist).unwrap();
            assert!(!v.is_nan());
            assert!((0.0..=1.0).contains(&v), "draw {v} outside [0, 1]");
            sum += v;
        }
        let mean = sum / 10_000.0;
        assert!((mean - 0.5).abs() < 0.02, "sample mean {mean}");
    }

    #[test]
    fn beta_rand_rejects_zero_alpha() {
        let mut rng = ChaCha8Rng::from_seed([0; 32]);
        let dist = BetaDist { alpha: 0.0, beta: 2.0 };
        assert!(beta_rand(&mut rng, &dist).is_err());
    }

    #[test]
    fn thompson_prefers_clearly_better_arm() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let arms = [
            BetaDist::from_counts(1, 200),
            BetaDist::from_counts(150, 200),
            BetaDist::from_counts(2, 200),
        ];
        let mut wins = [0usize; 3];
        for _ in 0..500 {
            let idx = thompson_select(&arms, &MarsagliaTsang, &mut rng)
                .unwrap()
                .unwrap();
            wins[idx] += 1;
        }
        assert_eq!(wins[1], 500);
    }

    #[test]
    fn thompson_on_no_arms_is_none() {
        let mut rng = ChaCha8Rng::from_seed([0; 32]);
        assert_eq!(thompson_select(&[], &MarsagliaTsang, &mut rng).unwrap(), None);
    }

    #[cfg(feature = "rand-distr")]
    #[test]
    fn rand_distr_backend_matches_native_moments() {
        let dist = BetaDist { alpha: 5.0, beta: 5.0 };
        let native = sample_mean(&MarsagliaTsang, dist, 100_000, 1);
        let external = sample_mean(&RandDistrBeta, dist, 100_000, 2);
        assert!((native - external).abs() < 0.01);
    }
}
