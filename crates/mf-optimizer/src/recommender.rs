//! The recommender contract and its two capability sets.

use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::RngCore;
use std::fmt;

use mf_types::{
    internal_error, CandidateId, CandidatePool, ContinuousSubspace, DiscreteSubspace, Frame,
    MfResult, RecommendError, SearchSpace, SearchSpaceError, SpaceKind, TrainingData,
};

use crate::acquisition::AcquisitionFunction;
use crate::flags::RecommendationFlags;

/// Common interface of every recommender.
pub trait Recommender: Send + Sync + fmt::Debug {
    /// Human-readable recommender name.
    fn name(&self) -> &str;

    /// Space topologies this recommender handles.
    fn compatibility(&self) -> SpaceKind;

    fn flags(&self) -> RecommendationFlags;

    fn set_flags(&mut self, flags: RecommendationFlags);

    /// The capability set the recommender belongs to, if any.
    fn capability(&self) -> Option<Capability<'_>> {
        None
    }

    /// Propose `batch_size` configurations in experimental representation.
    fn recommend(
        &self,
        space: &SearchSpace,
        batch_size: usize,
        history: Option<&TrainingData>,
        rng: &mut dyn RngCore,
    ) -> MfResult<Frame>;
}

/// Recommenders that score candidates through a surrogate-backed
/// acquisition function.
pub trait BayesianRecommender: Recommender {
    /// Fit the surrogate to `history` and build a fresh acquisition function
    /// over the full computational representation of `space`.
    fn setup_acquisition_function(
        &self,
        space: &SearchSpace,
        history: Option<&TrainingData>,
    ) -> MfResult<Box<dyn AcquisitionFunction>>;

    /// Select `batch_size` rows of `pool` maximizing `acqf`.
    fn recommend_discrete(
        &self,
        acqf: &dyn AcquisitionFunction,
        subspace: &DiscreteSubspace,
        pool: &CandidatePool,
        batch_size: usize,
    ) -> MfResult<Vec<CandidateId>>;

    /// Find `batch_size` points of `subspace` maximizing `acqf`.
    fn recommend_continuous(
        &self,
        acqf: &dyn AcquisitionFunction,
        subspace: &ContinuousSubspace,
        batch_size: usize,
        rng: &mut dyn RngCore,
    ) -> MfResult<Array2<f64>>;
}

/// Recommenders that choose candidates without a surrogate.
pub trait NonPredictiveRecommender: Recommender {
    fn recommend_discrete(
        &self,
        subspace: &DiscreteSubspace,
        pool: &CandidatePool,
        batch_size: usize,
        rng: &mut dyn RngCore,
    ) -> MfResult<Vec<CandidateId>>;

    fn recommend_continuous(
        &self,
        subspace: &ContinuousSubspace,
        batch_size: usize,
        rng: &mut dyn RngCore,
    ) -> MfResult<Array2<f64>>;
}

/// The two capability sets a recommender can expose to an orchestrator.
#[derive(Clone, Copy)]
pub enum Capability<'a> {
    Bayesian(&'a dyn BayesianRecommender),
    NonPredictive(&'a dyn NonPredictiveRecommender),
}

impl fmt::Debug for Capability<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bayesian(r) => write!(f, "Bayesian({})", r.name()),
            Self::NonPredictive(r) => write!(f, "NonPredictive({})", r.name()),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared checks and helpers
// ---------------------------------------------------------------------------

pub(crate) fn check_compatibility(recommender: &dyn Recommender, space: &SearchSpace) -> MfResult<()> {
    let kind = space.kind();
    if recommender.compatibility().supports(kind) {
        Ok(())
    } else {
        Err(SearchSpaceError::Incompatible {
            recommender: recommender.name().to_string(),
            compatibility: recommender.compatibility(),
            kind,
        }
        .into())
    }
}

/// A batch can be drawn from `available` distinct candidates.
pub(crate) fn ensure_candidates(available: usize, batch_size: usize) -> MfResult<()> {
    if batch_size == 0 || available < batch_size {
        return Err(RecommendError::InsufficientCandidates {
            requested: batch_size,
            available,
        }
        .into());
    }
    Ok(())
}

pub(crate) fn ensure_batch_size(batch_size: usize) -> MfResult<()> {
    if batch_size == 0 {
        return Err(RecommendError::InvalidBatchSize { batch_size }.into());
    }
    Ok(())
}

/// Batches of more than one point need a Monte Carlo acquisition function.
pub(crate) fn ensure_batch_capable(
    recommender: &str,
    acqf: &dyn AcquisitionFunction,
    batch_size: usize,
) -> MfResult<()> {
    if batch_size > 1 && !acqf.is_monte_carlo() {
        return Err(RecommendError::AnalyticalAcquisitionUnsupported {
            recommender: recommender.to_string(),
            acquisition: acqf.name().to_string(),
        }
        .into());
    }
    Ok(())
}

/// `batch` with `row` appended at the bottom.
pub(crate) fn append_row(batch: ArrayView2<'_, f64>, row: ArrayView1<'_, f64>) -> MfResult<Array2<f64>> {
    let mut out = batch.to_owned();
    out.push_row(row)
        .map_err(|e| internal_error!("cannot extend batch: {e}"))?;
    Ok(out)
}

/// Join discrete rows (experimental representation) with continuous points
/// row by row.
pub(crate) fn join_hybrid(
    space: &SearchSpace,
    discrete_ids: &[CandidateId],
    continuous: ArrayView2<'_, f64>,
) -> MfResult<Frame> {
    let disc = space.discrete().experimental_frame(discrete_ids)?;
    let cont = space
        .continuous()
        .to_frame(continuous)?
        .with_index(disc.index().to_vec())?;
    disc.hconcat(&cont)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use serde_json::json;

    #[test]
    fn insufficient_candidates_for_empty_batch_or_pool() {
        assert!(ensure_candidates(3, 2).is_ok());
        assert!(ensure_candidates(3, 0).unwrap_err().is_insufficient_candidates());
        assert!(ensure_candidates(1, 2).unwrap_err().is_insufficient_candidates());
        assert!(ensure_candidates(0, 1).unwrap_err().is_insufficient_candidates());
    }

    #[test]
    fn append_row_grows_batch() {
        let empty = Array2::<f64>::zeros((0, 2));
        let one = append_row(empty.view(), array![1.0, 2.0].view()).unwrap();
        let two = append_row(one.view(), array![3.0, 4.0].view()).unwrap();
        assert_eq!(two, array![[1.0, 2.0], [3.0, 4.0]]);
        assert!(append_row(two.view(), array![1.0].view()).is_err());
    }

    #[test]
    fn join_hybrid_orders_discrete_first() {
        let space = SearchSpace::builder()
            .add_float("x", 0.0, 1.0)
            .add_choice("c", vec![json!("a"), json!("b")])
            .build()
            .unwrap();
        let frame = join_hybrid(&space, &[1, 0], array![[0.25], [0.75]].view()).unwrap();
        assert_eq!(frame.columns(), &["c", "x"]);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.index(), &[0, 1]);
        assert_eq!(frame.row(0).unwrap()[0], mf_types::ParameterValue::from("b"));
    }
}
