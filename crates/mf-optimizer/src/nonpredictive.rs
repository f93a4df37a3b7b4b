//! Recommenders that do not use a surrogate model.

use ndarray::{Array2, ArrayView2, Axis};
use rand::seq::index;
use rand::RngCore;
use tracing::debug;

use mf_types::{
    CandidateId, CandidatePool, ContinuousSubspace, DiscreteSubspace, Frame, MfResult,
    SearchSpace, SearchSpaceError, SpaceKind, TrainingData,
};

use crate::flags::RecommendationFlags;
use crate::recommender::{
    check_compatibility, ensure_batch_size, ensure_candidates, join_hybrid, Capability,
    NonPredictiveRecommender, Recommender,
};

// ---- Random ----

/// Uniform random recommendations in any kind of space.
#[derive(Debug, Clone, Default)]
pub struct RandomRecommender {
    flags: RecommendationFlags,
}

impl RandomRecommender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flags(mut self, flags: RecommendationFlags) -> Self {
        self.flags = flags;
        self
    }
}

impl Recommender for RandomRecommender {
    fn name(&self) -> &str {
        "random"
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
        Some(Capability::NonPredictive(self))
    }

    fn recommend(
        &self,
        space: &SearchSpace,
        batch_size: usize,
        _history: Option<&TrainingData>,
        rng: &mut dyn RngCore,
    ) -> MfResult<Frame> {
        check_compatibility(self, space)?;
        let disc = space.discrete();
        let cont = space.continuous();

        match space.kind() {
            SpaceKind::Discrete => {
                let pool = disc.candidate_pool(self.flags.candidate_policy());
                let ids = NonPredictiveRecommender::recommend_discrete(self, disc, &pool, batch_size, rng)?;
                disc.experimental_frame(&ids)
            }
            SpaceKind::Continuous => {
                let points = NonPredictiveRecommender::recommend_continuous(self, cont, batch_size, rng)?;
                cont.to_frame(points.view())
            }
            SpaceKind::Hybrid | SpaceKind::Either => {
                let pool = disc.candidate_pool(self.flags.candidate_policy());
                let ids = NonPredictiveRecommender::recommend_discrete(self, disc, &pool, batch_size, rng)?;
                let points = NonPredictiveRecommender::recommend_continuous(self, cont, batch_size, rng)?;
                join_hybrid(space, &ids, points.view())
            }
        }
    }
}

impl NonPredictiveRecommender for RandomRecommender {
    fn recommend_discrete(
        &self,
        _subspace: &DiscreteSubspace,
        pool: &CandidatePool,
        batch_size: usize,
        rng: &mut dyn RngCore,
    ) -> MfResult<Vec<CandidateId>> {
        ensure_candidates(pool.len(), batch_size)?;
        Ok(index::sample(rng, pool.len(), batch_size)
            .into_iter()
            .map(|pos| pool.ids[pos])
            .collect())
    }

    fn recommend_continuous(
        &self,
        subspace: &ContinuousSubspace,
        batch_size: usize,
        rng: &mut dyn RngCore,
    ) -> MfResult<Array2<f64>> {
        ensure_batch_size(batch_size)?;
        Ok(subspace.sample_random(batch_size, rng))
    }
}

// ---- Farthest point ----

/// Space-filling selection of discrete candidates by farthest-point sampling
/// in computational representation.
#[derive(Debug, Clone, Default)]
pub struct FarthestPointRecommender {
    flags: RecommendationFlags,
}

impl FarthestPointRecommender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flags(mut self, flags: RecommendationFlags) -> Self {
        self.flags = flags;
        self
    }
}

impl Recommender for FarthestPointRecommender {
    fn name(&self) -> &str {
        "farthest_point"
    }

    fn compatibility(&self) -> SpaceKind {
        SpaceKind::Discrete
    }

    fn flags(&self) -> RecommendationFlags {
        self.flags
    }

    fn set_flags(&mut self, flags: RecommendationFlags) {
        self.flags = flags;
    }

    fn capability(&self) -> Option<Capability<'_>> {
        Some(Capability::NonPredictive(self))
    }

    fn recommend(
        &self,
        space: &SearchSpace,
        batch_size: usize,
        _history: Option<&TrainingData>,
        rng: &mut dyn RngCore,
    ) -> MfResult<Frame> {
        check_compatibility(self, space)?;
        let disc = space.discrete();
        let pool = disc.candidate_pool(self.flags.candidate_policy());
        let ids = NonPredictiveRecommender::recommend_discrete(self, disc, &pool, batch_size, rng)?;
        disc.experimental_frame(&ids)
    }
}

impl NonPredictiveRecommender for FarthestPointRecommender {
    fn recommend_discrete(
        &self,
        _subspace: &DiscreteSubspace,
        pool: &CandidatePool,
        batch_size: usize,
        _rng: &mut dyn RngCore,
    ) -> MfResult<Vec<CandidateId>> {
        ensure_candidates(pool.len(), batch_size)?;
        let picked = farthest_point_sampling(pool.comp.view(), batch_size);
        debug!(?picked, "farthest point selection");
        Ok(picked.into_iter().map(|pos| pool.ids[pos]).collect())
    }

    fn recommend_continuous(
        &self,
        _subspace: &ContinuousSubspace,
        _batch_size: usize,
        _rng: &mut dyn RngCore,
    ) -> MfResult<Array2<f64>> {
        Err(SearchSpaceError::Incompatible {
            recommender: self.name().to_string(),
            compatibility: self.compatibility(),
            kind: SpaceKind::Continuous,
        }
        .into())
    }
}

/// Pick `n` row positions of `points`, starting from the row farthest from
/// the centroid and repeatedly adding the row farthest from those chosen.
/// Ties resolve to the lowest position.
pub fn farthest_point_sampling(points: ArrayView2<'_, f64>, n: usize) -> Vec<usize> {
    let m = points.nrows();
    let n = n.min(m);
    if n == 0 {
        return Vec::new();
    }

    let sq_dist = |a: usize, b: ndarray::ArrayView1<'_, f64>| -> f64 {
        points
            .row(a)
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).powi(2))
            .sum()
    };

    let first = match points.mean_axis(Axis(0)) {
        Some(centroid) => argmax((0..m).map(|i| sq_dist(i, centroid.view()))),
        None => 0,
    };

    let mut chosen = vec![first];
    let mut min_dist: Vec<f64> = (0..m).map(|i| sq_dist(i, points.row(first))).collect();
    while chosen.len() < n {
        let next = argmax(
            min_dist
                .iter()
                .enumerate()
                .map(|(i, d)| if chosen.contains(&i) { f64::NEG_INFINITY } else { *d }),
        );
        chosen.push(next);
        for (i, d) in min_dist.iter_mut().enumerate() {
            *d = d.min(sq_dist(i, points.row(next)));
        }
    }
    chosen
}

fn argmax(values: impl Iterator<Item = f64>) -> usize {
    let mut best = (0, f64::NEG_INFINITY);
    for (i, v) in values.enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use mf_types::CandidatePolicy;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use std::collections::HashSet;

    fn discrete_space() -> SearchSpace {
        SearchSpace::builder()
            .add_int("n", 0, 9)
            .build()
            .unwrap()
    }

    #[test]
    fn fps_spreads_points() {
        let points = array![[0.0], [1.0], [2.0], [9.0], [10.0]];
        let picked = farthest_point_sampling(points.view(), 3);
        // centroid 4.4: farthest is 10, then 0, then 2 (min dist to {0, 10} is 2)
        assert_eq!(picked, vec![4, 0, 2]);
    }

    #[test]
    fn fps_caps_at_population() {
        let points = array![[0.0, 0.0], [1.0, 1.0]];
        assert_eq!(farthest_point_sampling(points.view(), 5).len(), 2);
        assert!(farthest_point_sampling(points.view(), 0).is_empty());
    }

    #[test]
    fn random_discrete_recommendations_are_distinct() {
        let space = discrete_space();
        let mut rng = StdRng::seed_from_u64(1);
        let frame = RandomRecommender::new()
            .recommend(&space, 5, None, &mut rng)
            .unwrap();
        assert_eq!(frame.len(), 5);
        let distinct: HashSet<String> = frame.rows().iter().map(|r| r[0].to_string()).collect();
        assert_eq!(distinct.len(), 5);
    }

    #[test]
    fn random_respects_policy() {
        let mut space = discrete_space();
        space.discrete_mut().mark_recommended(&[0, 1, 2, 3, 4, 5, 6, 7]).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let rec = RandomRecommender::new();
        assert!(rec
            .recommend(&space, 3, None, &mut rng)
            .unwrap_err()
            .is_insufficient_candidates());

        let lenient = RandomRecommender::new().with_flags(RecommendationFlags::new(true, true));
        assert_eq!(lenient.recommend(&space, 3, None, &mut rng).unwrap().len(), 3);
    }

    #[test]
    fn random_hybrid_batch() {
        let space = SearchSpace::builder()
            .add_choice("c", vec![json!("a"), json!("b")])
            .add_float("x", -1.0, 1.0)
            .build()
            .unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let frame = RandomRecommender::new()
            .recommend(&space, 2, None, &mut rng)
            .unwrap();
        assert_eq!(frame.width(), 2);
        for x in frame.column("x").unwrap() {
            let v = x.as_f64().unwrap();
            assert!((-1.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn farthest_point_is_discrete_only() {
        let space = SearchSpace::builder().add_float("x", 0.0, 1.0).build().unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        let err = FarthestPointRecommender::new()
            .recommend(&space, 1, None, &mut rng)
            .unwrap_err();
        assert!(matches!(
            err,
            mf_types::MfError::SearchSpace(SearchSpaceError::Incompatible { .. })
        ));
    }

    #[test]
    fn farthest_point_picks_extremes_first() {
        let space = discrete_space();
        let pool = space.discrete().candidate_pool(CandidatePolicy::unrestricted());
        let mut rng = StdRng::seed_from_u64(5);
        let ids = NonPredictiveRecommender::recommend_discrete(
            &FarthestPointRecommender::new(),
            space.discrete(),
            &pool,
            2,
            &mut rng,
        )
        .unwrap();
        assert_eq!(ids, vec![0, 9]);
    }
}
