//! Sequential greedy Bayesian recommender.
//!
//! Batches are assembled one point at a time: each new point maximizes the
//! joint acquisition value of the points already chosen plus itself. Discrete
//! candidates are scored exhaustively (in parallel), continuous points are
//! found by random restarts followed by a shrinking coordinate search.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::seq::index;
use rand::RngCore;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use mf_types::{
    internal_error, validation_error, CandidateId, CandidatePool, ContinuousSubspace,
    DiscreteSubspace, Frame, MfResult, SearchSpace, SearchSpaceError, SpaceKind, TrainingData,
};

use crate::acquisition::{AcquisitionFunction, AcquisitionKind};
use crate::flags::RecommendationFlags;
use crate::nonpredictive::farthest_point_sampling;
use crate::recommender::{
    append_row, check_compatibility, ensure_batch_capable, ensure_batch_size, ensure_candidates,
    join_hybrid, BayesianRecommender, Capability, Recommender,
};
use crate::surrogate::{column_scales, KernelSurrogate};

/// How discrete candidates are thinned out before a joint hybrid search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HybridSampler {
    /// Use every candidate.
    #[default]
    None,
    Farthest,
    Random,
}

#[derive(Debug, Clone)]
pub struct SequentialGreedyRecommender {
    flags: RecommendationFlags,
    acquisition: AcquisitionKind,
    hybrid_sampler: HybridSampler,
    sampling_percentage: f64,
    num_restarts: usize,
    raw_samples: usize,
    lengthscale: f64,
}

impl Default for SequentialGreedyRecommender {
    fn default() -> Self {
        Self {
            flags: RecommendationFlags::default(),
            acquisition: AcquisitionKind::default(),
            hybrid_sampler: HybridSampler::None,
            sampling_percentage: 1.0,
            num_restarts: 5,
            raw_samples: 10,
            lengthscale: KernelSurrogate::DEFAULT_LENGTHSCALE,
        }
    }
}

impl SequentialGreedyRecommender {
    /// Coordinate-search sweeps per restart.
    const LOCAL_SWEEPS: usize = 40;
    /// Initial step as a fraction of each parameter's range.
    const INITIAL_STEP: f64 = 0.1;
    const MIN_STEP: f64 = 1e-4;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flags(mut self, flags: RecommendationFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_acquisition(mut self, acquisition: AcquisitionKind) -> Self {
        self.acquisition = acquisition;
        self
    }

    /// Configure candidate thinning for hybrid spaces. `percentage` must lie
    /// in `[0, 1]`.
    pub fn with_hybrid_sampling(mut self, sampler: HybridSampler, percentage: f64) -> MfResult<Self> {
        if !(0.0..=1.0).contains(&percentage) {
            return Err(validation_error!(
                "Hybrid sampling percentage needs to be between 0 and 1 but is {percentage}"
            ));
        }
        self.hybrid_sampler = sampler;
        self.sampling_percentage = percentage;
        Ok(self)
    }

    pub fn with_restarts(mut self, num_restarts: usize, raw_samples: usize) -> Self {
        self.num_restarts = num_restarts.max(1);
        self.raw_samples = raw_samples.max(self.num_restarts);
        self
    }

    pub fn with_lengthscale(mut self, lengthscale: f64) -> Self {
        self.lengthscale = lengthscale;
        self
    }

    pub fn acquisition(&self) -> AcquisitionKind {
        self.acquisition
    }

    /// Greedy selection of `batch_size` rows of `comp` (positions).
    fn select_greedy(
        &self,
        acqf: &dyn AcquisitionFunction,
        comp: ArrayView2<'_, f64>,
        batch_size: usize,
    ) -> MfResult<Vec<usize>> {
        let mut selected: Vec<usize> = Vec::with_capacity(batch_size);
        let mut batch = Array2::zeros((0, comp.ncols()));

        for _ in 0..batch_size {
            let scores = (0..comp.nrows())
                .into_par_iter()
                .filter(|i| !selected.contains(i))
                .map(|i| {
                    let trial = append_row(batch.view(), comp.row(i))?;
                    Ok((i, acqf.evaluate(trial.view())?))
                })
                .collect::<MfResult<Vec<(usize, f64)>>>()?;

            let (best, score) = best_of(scores).ok_or_else(|| {
                internal_error!("no candidate left during greedy selection")
            })?;
            debug!(position = best, score, "greedy discrete pick");
            batch = append_row(batch.view(), comp.row(best))?;
            selected.push(best);
        }
        Ok(selected)
    }

    /// Maximize `objective` over `subspace` from random restarts.
    fn optimize_point<F>(
        &self,
        subspace: &ContinuousSubspace,
        objective: F,
        rng: &mut dyn RngCore,
    ) -> MfResult<(Array1<f64>, f64)>
    where
        F: Fn(ArrayView1<'_, f64>) -> MfResult<f64>,
    {
        let raw = subspace.sample_random(self.raw_samples, rng);
        let mut starts = raw
            .rows()
            .into_iter()
            .map(|row| Ok((row.to_owned(), objective(row)?)))
            .collect::<MfResult<Vec<(Array1<f64>, f64)>>>()?;
        starts.sort_by(|a, b| b.1.total_cmp(&a.1));
        starts.truncate(self.num_restarts);

        let bounds = subspace.bounds();
        let mut best: Option<(Array1<f64>, f64)> = None;
        for (start, start_score) in starts {
            let (point, score) = self.coordinate_search(&bounds, start, start_score, &objective)?;
            if best.as_ref().map_or(true, |(_, s)| score > *s) {
                best = Some((point, score));
            }
        }
        best.ok_or_else(|| internal_error!("continuous search produced no point"))
    }

    fn coordinate_search<F>(
        &self,
        bounds: &[(f64, f64)],
        mut point: Array1<f64>,
        mut score: f64,
        objective: &F,
    ) -> MfResult<(Array1<f64>, f64)>
    where
        F: Fn(ArrayView1<'_, f64>) -> MfResult<f64>,
    {
        let mut step = Self::INITIAL_STEP;
        for _ in 0..Self::LOCAL_SWEEPS {
            let mut improved = false;
            for (j, (low, high)) in bounds.iter().enumerate() {
                let width = high - low;
                if width <= 0.0 {
                    continue;
                }
                for direction in [1.0, -1.0] {
                    let mut candidate = point.clone();
                    candidate[j] = (candidate[j] + direction * step * width).clamp(*low, *high);
                    let candidate_score = objective(candidate.view())?;
                    if candidate_score > score {
                        point = candidate;
                        score = candidate_score;
                        improved = true;
                        break;
                    }
                }
            }
            if !improved {
                step /= 2.0;
                if step < Self::MIN_STEP {
                    break;
                }
            }
        }
        Ok((point, score))
    }

    /// Joint search over a hybrid space: the continuous part is optimized for
    /// every (possibly thinned) discrete candidate and the best pair is added
    /// to the batch.
    fn recommend_hybrid(
        &self,
        acqf: &dyn AcquisitionFunction,
        space: &SearchSpace,
        batch_size: usize,
        rng: &mut dyn RngCore,
    ) -> MfResult<Frame> {
        let disc = space.discrete();
        let cont = space.continuous();
        let pool = disc.candidate_pool(self.flags.candidate_policy());
        ensure_candidates(pool.len(), batch_size)?;
        ensure_batch_capable(self.name(), acqf, batch_size)?;

        let mut positions: Vec<usize> = match self.hybrid_sampler {
            HybridSampler::None => (0..pool.len()).collect(),
            HybridSampler::Farthest => {
                farthest_point_sampling(pool.comp.view(), self.sample_count(pool.len()))
            }
            HybridSampler::Random => {
                index::sample(rng, pool.len(), self.sample_count(pool.len())).into_vec()
            }
        };
        ensure_candidates(positions.len(), batch_size)?;

        let mut batch = Array2::zeros((0, space.comp_dim()));
        let mut ids: Vec<CandidateId> = Vec::with_capacity(batch_size);
        let mut points = Array2::zeros((0, cont.dim()));
        for _ in 0..batch_size {
            let mut best: Option<(usize, Array1<f64>, f64)> = None;
            for (slot, &pos) in positions.iter().enumerate() {
                let fixed = pool.comp.row(pos);
                let objective = |x: ArrayView1<'_, f64>| {
                    let joint: Array1<f64> = fixed.iter().chain(x.iter()).copied().collect();
                    let trial = append_row(batch.view(), joint.view())?;
                    acqf.evaluate(trial.view())
                };
                let (point, score) = self.optimize_point(cont, objective, rng)?;
                if best.as_ref().map_or(true, |(_, _, s)| score > *s) {
                    best = Some((slot, point, score));
                }
            }

            let (slot, point, score) = best.ok_or_else(|| {
                internal_error!("no discrete candidate left during hybrid search")
            })?;
            let pos = positions.remove(slot);
            debug!(candidate = pool.ids[pos], score, "greedy hybrid pick");
            let joint: Array1<f64> = pool.comp.row(pos).iter().chain(point.iter()).copied().collect();
            batch = append_row(batch.view(), joint.view())?;
            points = append_row(points.view(), point.view())?;
            ids.push(pool.ids[pos]);
        }

        join_hybrid(space, &ids, points.view())
    }

    fn sample_count(&self, available: usize) -> usize {
        (self.sampling_percentage * available as f64) as usize
    }
}

/// Highest score, first position on ties.
fn best_of(scores: Vec<(usize, f64)>) -> Option<(usize, f64)> {
    scores.into_iter().fold(None, |best, (i, s)| match best {
        Some((_, b)) if s <= b => best,
        _ => Some((i, s)),
    })
}

impl Recommender for SequentialGreedyRecommender {
    fn name(&self) -> &str {
        "sequential_greedy"
    }

    fn compatibility(&self) -> SpaceKind {
        SpaceKind::Hybrid
    }

    fn flags(&self) -> RecommendationFlags {
        self.flags
    }

    fn set_flags(&mut self, flags: RecommendationFlags) {
        self.flags = flags;
    }

    fn capability(&self) -> Option<Capability<'_>> {
        Some(Capability::Bayesian(self))
    }

    fn recommend(
        &self,
        space: &SearchSpace,
        batch_size: usize,
        history: Option<&TrainingData>,
        rng: &mut dyn RngCore,
    ) -> MfResult<Frame> {
        check_compatibility(self, space)?;
        info!(
            recommender = self.name(),
            kind = %space.kind(),
            batch_size,
            acquisition = self.acquisition.name(),
            "recommending"
        );

        let acqf = self.setup_acquisition_function(space, history)?;
        match space.kind() {
            SpaceKind::Discrete => {
                let disc = space.discrete();
                let pool = disc.candidate_pool(self.flags.candidate_policy());
                let ids = self.recommend_discrete(acqf.as_ref(), disc, &pool, batch_size)?;
                disc.experimental_frame(&ids)
            }
            SpaceKind::Continuous => {
                let cont = space.continuous();
                let points = self.recommend_continuous(acqf.as_ref(), cont, batch_size, rng)?;
                cont.to_frame(points.view())
            }
            SpaceKind::Hybrid | SpaceKind::Either => {
                self.recommend_hybrid(acqf.as_ref(), space, batch_size, rng)
            }
        }
    }
}

impl BayesianRecommender for SequentialGreedyRecommender {
    fn setup_acquisition_function(
        &self,
        space: &SearchSpace,
        history: Option<&TrainingData>,
    ) -> MfResult<Box<dyn AcquisitionFunction>> {
        let empty;
        let data = match history {
            Some(data) => data,
            None => {
                empty = TrainingData::empty(space.comp_dim());
                &empty
            }
        };
        if data.dim() != space.comp_dim() {
            return Err(SearchSpaceError::DimensionMismatch {
                expected: space.comp_dim(),
                actual: data.dim(),
            }
            .into());
        }

        let surrogate =
            KernelSurrogate::fit(data, column_scales(space))?.with_lengthscale(self.lengthscale);
        Ok(self.acquisition.build(Box::new(surrogate)))
    }

    fn recommend_discrete(
        &self,
        acqf: &dyn AcquisitionFunction,
        _subspace: &DiscreteSubspace,
        pool: &CandidatePool,
        batch_size: usize,
    ) -> MfResult<Vec<CandidateId>> {
        ensure_candidates(pool.len(), batch_size)?;
        ensure_batch_capable(self.name(), acqf, batch_size)?;
        let positions = self.select_greedy(acqf, pool.comp.view(), batch_size)?;
        Ok(positions.into_iter().map(|pos| pool.ids[pos]).collect())
    }

    fn recommend_continuous(
        &self,
        acqf: &dyn AcquisitionFunction,
        subspace: &ContinuousSubspace,
        batch_size: usize,
        rng: &mut dyn RngCore,
    ) -> MfResult<Array2<f64>> {
        ensure_batch_size(batch_size)?;
        ensure_batch_capable(self.name(), acqf, batch_size)?;

        let mut batch = Array2::zeros((0, subspace.dim()));
        for _ in 0..batch_size {
            let objective = |x: ArrayView1<'_, f64>| {
                let trial = append_row(batch.view(), x)?;
                acqf.evaluate(trial.view())
            };
            let (point, score) = self.optimize_point(subspace, objective, rng)?;
            debug!(?point, score, "greedy continuous pick");
            batch = append_row(batch.view(), point.view())?;
        }
        Ok(batch)
    }
}
