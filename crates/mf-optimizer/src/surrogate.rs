//! Surrogate models producing predictive distributions over the
//! computational representation of a search space.

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use std::fmt;

use mf_types::{MfResult, SearchSpace, SearchSpaceError, TrainingData};

/// Predictive mean and variance per input row, in standardized target units.
#[derive(Debug, Clone, PartialEq)]
pub struct Posterior {
    pub mean: Array1<f64>,
    pub variance: Array1<f64>,
}

/// A fitted probabilistic model of the objective.
pub trait Surrogate: Send + Sync + fmt::Debug {
    /// Posterior at every row of `x`.
    fn posterior(&self, x: ArrayView2<'_, f64>) -> MfResult<Posterior>;

    /// Best standardized target seen during fitting, if any.
    fn incumbent(&self) -> Option<f64>;
}

/// RBF kernel regression that shrinks towards a zero-mean, unit-variance
/// prior away from the training data.
#[derive(Debug, Clone)]
pub struct KernelSurrogate {
    x: ndarray::Array2<f64>,
    y: Array1<f64>,
    scales: Array1<f64>,
    lengthscale: f64,
    prior_weight: f64,
}

impl KernelSurrogate {
    pub const DEFAULT_LENGTHSCALE: f64 = 0.2;
    pub const DEFAULT_PRIOR_WEIGHT: f64 = 0.1;

    /// Fit to `data`. `scales` holds the range of every computational column
    /// and is used to normalize distances.
    pub fn fit(data: &TrainingData, scales: Array1<f64>) -> MfResult<Self> {
        if scales.len() != data.dim() {
            return Err(SearchSpaceError::DimensionMismatch {
                expected: scales.len(),
                actual: data.dim(),
            }
            .into());
        }

        let y = if data.is_empty() {
            Array1::zeros(0)
        } else {
            let mean = data.y.mean().unwrap_or(0.0);
            let std = data.y.std(0.0);
            let std = if std > f64::EPSILON { std } else { 1.0 };
            data.y.mapv(|v| (v - mean) / std)
        };

        Ok(Self {
            x: data.x.clone(),
            y,
            scales: scales.mapv(|s| if s > f64::EPSILON { s } else { 1.0 }),
            lengthscale: Self::DEFAULT_LENGTHSCALE,
            prior_weight: Self::DEFAULT_PRIOR_WEIGHT,
        })
    }

    pub fn with_lengthscale(mut self, lengthscale: f64) -> Self {
        self.lengthscale = lengthscale.max(1e-6);
        self
    }

    fn predict_one(&self, point: ArrayView1<'_, f64>) -> (f64, f64) {
        let two_l2 = 2.0 * self.lengthscale * self.lengthscale;
        let mut total_weight = 0.0;
        let mut weighted_y = 0.0;
        for (row, y) in self.x.axis_iter(Axis(0)).zip(self.y.iter()) {
            let d2: f64 = row
                .iter()
                .zip(point.iter())
                .zip(self.scales.iter())
                .map(|((a, b), s)| ((a - b) / s).powi(2))
                .sum();
            let w = (-d2 / two_l2).exp();
            total_weight += w;
            weighted_y += w * y;
        }
        let denom = total_weight + self.prior_weight;
        let mean = weighted_y / denom;
        let variance = (self.prior_weight / denom).max(1e-9);
        (mean, variance)
    }
}

impl Surrogate for KernelSurrogate {
    fn posterior(&self, x: ArrayView2<'_, f64>) -> MfResult<Posterior> {
        if x.ncols() != self.scales.len() {
            return Err(SearchSpaceError::DimensionMismatch {
                expected: self.scales.len(),
                actual: x.ncols(),
            }
            .into());
        }
        let (mean, variance): (Vec<f64>, Vec<f64>) =
            x.axis_iter(Axis(0)).map(|row| self.predict_one(row)).unzip();
        Ok(Posterior {
            mean: Array1::from(mean),
            variance: Array1::from(variance),
        })
    }

    fn incumbent(&self) -> Option<f64> {
        self.y.iter().copied().reduce(f64::max)
    }
}

/// Range of every computational column of `space`, discrete first.
pub fn column_scales(space: &SearchSpace) -> Array1<f64> {
    let comp = space.discrete().comp_rep();
    let discrete = comp.axis_iter(Axis(1)).map(|col| {
        let lo = col.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = col.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if hi > lo {
            hi - lo
        } else {
            1.0
        }
    });
    let continuous = space.continuous().bounds().into_iter().map(|(lo, hi)| hi - lo);
    discrete.chain(continuous).collect()
}
