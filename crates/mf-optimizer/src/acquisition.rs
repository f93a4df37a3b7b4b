//! Acquisition functions and the partial (pinned) adapter used to optimize
//! one subspace while the other is held fixed.

use ndarray::{concatenate, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_1_SQRT_2, PI};

use mf_types::{internal_error, validation_error, MfResult, SearchSpaceError};

use crate::surrogate::Surrogate;

/// A scalar score over a q-batch of candidates in computational representation.
pub trait AcquisitionFunction: Send + Sync {
    fn name(&self) -> &str;

    /// Monte Carlo functions score batches jointly; analytical ones only
    /// accept a single point.
    fn is_monte_carlo(&self) -> bool;

    /// Joint score of the rows of `candidates` (`q × d`). Larger is better.
    fn evaluate(&self, candidates: ArrayView2<'_, f64>) -> MfResult<f64>;
}

/// Which acquisition function a Bayesian recommender builds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AcquisitionKind {
    PosteriorMean,
    ExpectedImprovement,
    UpperConfidenceBound { beta: f64 },
    QExpectedImprovement,
    QUpperConfidenceBound { beta: f64 },
    QProbabilityOfImprovement,
}

impl Default for AcquisitionKind {
    fn default() -> Self {
        Self::QExpectedImprovement
    }
}

impl AcquisitionKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PosteriorMean => "PM",
            Self::ExpectedImprovement => "EI",
            Self::UpperConfidenceBound { .. } => "UCB",
            Self::QExpectedImprovement => "qEI",
            Self::QUpperConfidenceBound { .. } => "qUCB",
            Self::QProbabilityOfImprovement => "qPI",
        }
    }

    pub fn is_monte_carlo(&self) -> bool {
        matches!(
            self,
            Self::QExpectedImprovement
                | Self::QUpperConfidenceBound { .. }
                | Self::QProbabilityOfImprovement
        )
    }

    /// Attach this acquisition function to a fitted surrogate.
    pub fn build(self, surrogate: Box<dyn Surrogate>) -> Box<dyn AcquisitionFunction> {
        Box::new(SurrogateAcquisition {
            kind: self,
            surrogate,
            mc_samples: SurrogateAcquisition::MC_SAMPLES,
        })
    }
}

/// Acquisition function computed from a surrogate's posterior.
#[derive(Debug)]
pub struct SurrogateAcquisition {
    kind: AcquisitionKind,
    surrogate: Box<dyn Surrogate>,
    mc_samples: usize,
}

impl SurrogateAcquisition {
    pub const MC_SAMPLES: usize = 256;
    const MC_SEED: u64 = 0x5eed;
    const PI_TEMPERATURE: f64 = 1e-3;

    /// Fixed standard-normal base samples (`mc_samples × q`), so repeated
    /// evaluations of the same batch give the same score.
    fn base_samples(&self, q: usize) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(Self::MC_SEED);
        Array2::from_shape_simple_fn((self.mc_samples, q), || StandardNormal.sample(&mut rng))
    }

    fn monte_carlo(&self, mean: &[f64], std: &[f64], best: f64) -> f64 {
        let z = self.base_samples(mean.len());
        let per_sample = z.axis_iter(Axis(0)).map(|zs| {
            let draws = mean
                .iter()
                .zip(std)
                .zip(zs.iter())
                .map(|((m, s), z)| (m, s, z));
            match self.kind {
                AcquisitionKind::QExpectedImprovement => draws
                    .map(|(m, s, z)| (m + s * z - best).max(0.0))
                    .fold(f64::NEG_INFINITY, f64::max),
                AcquisitionKind::QUpperConfidenceBound { beta } => {
                    let scale = (beta * PI / 2.0).sqrt();
                    draws
                        .map(|(m, s, z)| m + scale * (s * z).abs())
                        .fold(f64::NEG_INFINITY, f64::max)
                }
                _ => draws
                    .map(|(m, s, z)| sigmoid((m + s * z - best) / Self::PI_TEMPERATURE))
                    .fold(f64::NEG_INFINITY, f64::max),
            }
        });
        per_sample.sum::<f64>() / self.mc_samples as f64
    }
}

impl AcquisitionFunction for SurrogateAcquisition {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn is_monte_carlo(&self) -> bool {
        self.kind.is_monte_carlo()
    }

    fn evaluate(&self, candidates: ArrayView2<'_, f64>) -> MfResult<f64> {
        let q = candidates.nrows();
        if q == 0 {
            return Err(validation_error!("acquisition function evaluated on an empty batch"));
        }
        if q > 1 && !self.is_monte_carlo() {
            return Err(validation_error!(
                "analytical acquisition function {} evaluates single points, got {q}",
                self.name()
            ));
        }

        let posterior = self.surrogate.posterior(candidates)?;
        let best = self.surrogate.incumbent().unwrap_or(0.0);
        let mean = posterior.mean.to_vec();
        let std: Vec<f64> = posterior.variance.iter().map(|v| v.sqrt()).collect();

        let score = match self.kind {
            AcquisitionKind::PosteriorMean => mean[0],
            AcquisitionKind::ExpectedImprovement => {
                let z = (mean[0] - best) / std[0];
                std[0] * (z * normal_cdf(z) + normal_pdf(z))
            }
            AcquisitionKind::UpperConfidenceBound { beta } => mean[0] + beta.sqrt() * std[0],
            _ => self.monte_carlo(&mean, &std, best),
        };
        Ok(score)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn normal_pdf(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * PI).sqrt()
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z * FRAC_1_SQRT_2))
}

// Abramowitz & Stegun 7.1.26, |error| < 1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = x.signum();
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    sign * (1.0 - poly * (-x * x).exp())
}

// ---------------------------------------------------------------------------
// Partial acquisition function
// ---------------------------------------------------------------------------

/// Scores candidates over the free dimensions only, with the other block of
/// dimensions pinned to a single row.
///
/// The pinned row is broadcast to every row of the free batch and joined
/// column-wise: pinned first when `pin_discrete` is set (discrete pinned,
/// continuous free), free first otherwise. The joined batch is forwarded to
/// the base function unchanged.
pub struct PartialAcquisitionFunction<'a> {
    base: &'a dyn AcquisitionFunction,
    pinned: Array2<f64>,
    pin_discrete: bool,
    name: String,
}

impl<'a> PartialAcquisitionFunction<'a> {
    pub fn new(
        base: &'a dyn AcquisitionFunction,
        pinned: Array2<f64>,
        pin_discrete: bool,
    ) -> MfResult<Self> {
        if pinned.nrows() != 1 {
            return Err(validation_error!(
                "pinned block must be a single row, got {}",
                pinned.nrows()
            ));
        }
        Ok(Self {
            name: format!("partial({})", base.name()),
            base,
            pinned,
            pin_discrete,
        })
    }

    pub fn pinned(&self) -> ArrayView2<'_, f64> {
        self.pinned.view()
    }

    pub fn pin_discrete(&self) -> bool {
        self.pin_discrete
    }

    /// The full-dimensional batch forwarded to the base function.
    pub fn expand(&self, free: ArrayView2<'_, f64>) -> MfResult<Array2<f64>> {
        let pinned = self
            .pinned
            .broadcast((free.nrows(), self.pinned.ncols()))
            .ok_or_else(|| internal_error!("pinned block cannot be broadcast to the batch"))?;
        let blocks = if self.pin_discrete {
            [pinned.view(), free.view()]
        } else {
            [free.view(), pinned.view()]
        };
        concatenate(Axis(1), &blocks).map_err(|_| {
            SearchSpaceError::DimensionMismatch {
                expected: self.pinned.ncols(),
                actual: free.ncols(),
            }
            .into()
        })
    }
}

impl AcquisitionFunction for PartialAcquisitionFunction<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_monte_carlo(&self) -> bool {
        self.base.is_monte_carlo()
    }

    fn evaluate(&self, candidates: ArrayView2<'_, f64>) -> MfResult<f64> {
        let full = self.expand(candidates)?;
        self.base.evaluate(full.view())
    }
}
