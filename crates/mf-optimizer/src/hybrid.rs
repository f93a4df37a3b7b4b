//! Naive hybrid-space recommender.
//!
//! Splits a hybrid search space into its discrete and continuous subspaces and
//! optimizes each with its own recommender. The two halves are coupled once:
//! the discrete search sees a random continuous point pinned to every
//! candidate, and the continuous search sees one of the chosen discrete rows
//! pinned to every point. On purely discrete or purely continuous spaces the
//! matching sub-recommender is called directly.

use rand::seq::IndexedRandom;
use rand::RngCore;
use tracing::{debug, info, warn};

use mf_types::{
    internal_error, CandidatePolicy, Frame, MfResult, RecommendError, SearchSpace, SpaceKind,
    TrainingData,
};

use crate::acquisition::PartialAcquisitionFunction;
use crate::flags::{synchronize_flags, FlagConflict, RecommendationFlags};
use crate::greedy::SequentialGreedyRecommender;
use crate::recommender::{join_hybrid, BayesianRecommender, Capability, Recommender};

#[derive(Debug)]
pub struct NaiveHybridRecommender {
    disc_recommender: Box<dyn Recommender>,
    cont_recommender: Box<dyn BayesianRecommender>,
    flags: RecommendationFlags,
}

/// A discrete recommender after its flags were brought in line with the
/// orchestrator's, plus every disagreement that was overridden.
#[derive(Debug)]
pub struct Reconciled {
    pub recommender: Box<dyn Recommender>,
    pub conflicts: Vec<FlagConflict>,
}

impl Default for NaiveHybridRecommender {
    fn default() -> Self {
        Self::new(
            Box::new(SequentialGreedyRecommender::new()),
            Box::new(SequentialGreedyRecommender::new()),
            RecommendationFlags::default(),
        )
    }
}

impl NaiveHybridRecommender {
    /// Build the orchestrator. The discrete recommender's flags are replaced
    /// by `flags`; each overridden value is logged.
    pub fn new(
        disc_recommender: Box<dyn Recommender>,
        cont_recommender: Box<dyn BayesianRecommender>,
        flags: RecommendationFlags,
    ) -> Self {
        let Reconciled {
            recommender,
            conflicts,
        } = Self::reconcile(disc_recommender, flags);
        for conflict in &conflicts {
            warn!(flag = %conflict.flag, kept = conflict.kept, ignored = conflict.ignored, "{conflict}");
        }
        Self {
            disc_recommender: recommender,
            cont_recommender,
            flags,
        }
    }

    /// Apply `flags` to `disc_recommender` and report what changed. Running
    /// it again on the result reports nothing.
    pub fn reconcile(
        mut disc_recommender: Box<dyn Recommender>,
        flags: RecommendationFlags,
    ) -> Reconciled {
        let sync = synchronize_flags(flags, disc_recommender.flags());
        disc_recommender.set_flags(sync.flags);
        Reconciled {
            recommender: disc_recommender,
            conflicts: sync.conflicts,
        }
    }

    pub fn disc_recommender(&self) -> &dyn Recommender {
        self.disc_recommender.as_ref()
    }

    pub fn cont_recommender(&self) -> &dyn BayesianRecommender {
        self.cont_recommender.as_ref()
    }

    /// The discrete recommender's capability set. Fails before anything else
    /// happens when it has none.
    fn disc_capability(&self) -> MfResult<Capability<'_>> {
        self.disc_recommender.capability().ok_or_else(|| {
            RecommendError::NotImplemented {
                message: format!(
                    "The discrete recommender should be either a Bayesian or a non-predictive \
                     recommender, but {} is neither.",
                    self.disc_recommender.name()
                ),
            }
            .into()
        })
    }

    fn recommend_hybrid(
        &self,
        capability: Capability<'_>,
        space: &SearchSpace,
        batch_size: usize,
        history: Option<&TrainingData>,
        rng: &mut dyn RngCore,
    ) -> MfResult<Frame> {
        let disc = space.discrete();
        let cont = space.continuous();

        // One continuous point is attached to every discrete candidate.
        let cont_part = cont.sample_random(1, rng);
        debug!(pin = ?cont_part.row(0), "continuous pin for discrete search");

        // Repeat and measurement markers are waived in hybrid spaces.
        // Excluded rows stay out.
        let pool = disc.candidate_pool(CandidatePolicy::new(true, true));

        let disc_ids = match capability {
            Capability::Bayesian(recommender) => {
                let acqf = recommender.setup_acquisition_function(space, history)?;
                let partial = PartialAcquisitionFunction::new(acqf.as_ref(), cont_part, false)?;
                recommender.recommend_discrete(&partial, disc, &pool, batch_size)?
            }
            Capability::NonPredictive(recommender) => {
                recommender.recommend_discrete(disc, &pool, batch_size, rng)?
            }
        };
        debug!(ids = ?disc_ids, "discrete selection");

        let disc_pick = disc_ids.choose(rng).copied().ok_or_else(|| {
            internal_error!("discrete recommender returned an empty selection")
        })?;
        let disc_part = disc.comp_rows(&[disc_pick])?;
        debug!(candidate = disc_pick, "discrete pin for continuous search");

        let acqf = self.cont_recommender.setup_acquisition_function(space, history)?;
        let partial = PartialAcquisitionFunction::new(acqf.as_ref(), disc_part, true)?;
        let points = self
            .cont_recommender
            .recommend_continuous(&partial, cont, batch_size, rng)?;

        join_hybrid(space, &disc_ids, points.view())
    }
}

impl Recommender for NaiveHybridRecommender {
    fn name(&self) -> &str {
        "naive_hybrid"
    }

    fn compatibility(&self) -> SpaceKind {
        SpaceKind::Hybrid
    }

    fn flags(&self) -> RecommendationFlags {
        self.flags
    }

    fn set_flags(&mut self, flags: RecommendationFlags) {
        self.flags = flags;
        self.disc_recommender.set_flags(flags);
    }

    fn recommend(
        &self,
        space: &SearchSpace,
        batch_size: usize,
        history: Option<&TrainingData>,
        rng: &mut dyn RngCore,
    ) -> MfResult<Frame> {
        let kind = space.kind();
        info!(
            recommender = self.name(),
            kind = %kind,
            batch_size,
            discrete = self.disc_recommender.name(),
            continuous = self.cont_recommender.name(),
            "recommending"
        );

        match kind {
            SpaceKind::Continuous => {
                self.cont_recommender.recommend(space, batch_size, history, rng)
            }
            SpaceKind::Discrete => {
                self.disc_capability()?;
                self.disc_recommender.recommend(space, batch_size, history, rng)
            }
            SpaceKind::Hybrid | SpaceKind::Either => {
                let capability = self.disc_capability()?;
                self.recommend_hybrid(capability, space, batch_size, history, rng)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{AcquisitionFunction, AcquisitionKind};
    use crate::nonpredictive::{FarthestPointRecommender, RandomRecommender};
    use mf_types::{
        CandidateId, CandidatePool, ContinuousSubspace, DiscreteSubspace, MfError, ParameterValue,
    };
    use ndarray::{s, Array2, ArrayView1, ArrayView2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// Counts every draw taken from the wrapped generator.
    struct CountingRng {
        inner: StdRng,
        calls: usize,
    }

    impl CountingRng {
        fn new(seed: u64) -> Self {
            Self {
                inner: StdRng::seed_from_u64(seed),
                calls: 0,
            }
        }
    }

    impl RngCore for CountingRng {
        fn next_u32(&mut self) -> u32 {
            self.calls += 1;
            self.inner.next_u32()
        }

        fn next_u64(&mut self) -> u64 {
            self.calls += 1;
            self.inner.next_u64()
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            self.calls += 1;
            self.inner.fill_bytes(dest)
        }
    }

    /// A recommender outside both capability sets.
    #[derive(Debug, Default)]
    struct Opaque {
        flags: RecommendationFlags,
    }

    impl Recommender for Opaque {
        fn name(&self) -> &str {
            "opaque"
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

        fn recommend(
            &self,
            _space: &SearchSpace,
            _batch_size: usize,
            _history: Option<&TrainingData>,
            rng: &mut dyn RngCore,
        ) -> MfResult<Frame> {
            rng.next_u64();
            Err(MfError::Internal("opaque recommender called".to_string()))
        }
    }

    fn hybrid_space() -> SearchSpace {
        SearchSpace::builder()
            .add_choice("color", vec![json!("red"), json!("green"), json!("blue")])
            .add_float("temperature", 0.0, 1.0)
            .build()
            .unwrap()
    }

    fn orchestrator(disc: Box<dyn Recommender>) -> NaiveHybridRecommender {
        NaiveHybridRecommender::new(
            disc,
            Box::new(SequentialGreedyRecommender::new()),
            RecommendationFlags::default(),
        )
    }

    type BatchLog = Arc<Mutex<Vec<Array2<f64>>>>;

    /// Scores nothing; keeps a copy of every batch it is shown.
    struct Recording {
        log: BatchLog,
    }

    impl AcquisitionFunction for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn is_monte_carlo(&self) -> bool {
            true
        }

        fn evaluate(&self, candidates: ArrayView2<'_, f64>) -> MfResult<f64> {
            self.log.lock().unwrap().push(candidates.to_owned());
            Ok(0.0)
        }
    }

    /// Bayesian recommender that scores each pool row once and keeps the
    /// first ones, and proposes `FREE` for every continuous coordinate.
    #[derive(Debug)]
    struct Scripted {
        flags: RecommendationFlags,
        log: BatchLog,
    }

    impl Scripted {
        const FREE: f64 = 0.25;

        fn new(log: &BatchLog) -> Self {
            Self {
                flags: RecommendationFlags::default(),
                log: Arc::clone(log),
            }
        }
    }

    impl Recommender for Scripted {
        fn name(&self) -> &str {
            "scripted"
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
            _space: &SearchSpace,
            _batch_size: usize,
            _history: Option<&TrainingData>,
            _rng: &mut dyn RngCore,
        ) -> MfResult<Frame> {
            Err(MfError::Internal("scripted recommender is orchestrated only".to_string()))
        }
    }

    impl BayesianRecommender for Scripted {
        fn setup_acquisition_function(
            &self,
            _space: &SearchSpace,
            _history: Option<&TrainingData>,
        ) -> MfResult<Box<dyn AcquisitionFunction>> {
            Ok(Box::new(Recording {
                log: Arc::clone(&self.log),
            }))
        }

        fn recommend_discrete(
            &self,
            acqf: &dyn AcquisitionFunction,
            _subspace: &DiscreteSubspace,
            pool: &CandidatePool,
            batch_size: usize,
        ) -> MfResult<Vec<CandidateId>> {
            for pos in 0..pool.len() {
                acqf.evaluate(pool.comp.slice(s![pos..pos + 1, ..]))?;
            }
            Ok(pool.ids.iter().take(batch_size).copied().collect())
        }

        fn recommend_continuous(
            &self,
            acqf: &dyn AcquisitionFunction,
            subspace: &ContinuousSubspace,
            batch_size: usize,
            _rng: &mut dyn RngCore,
        ) -> MfResult<Array2<f64>> {
            let points = Array2::from_elem((batch_size, subspace.dim()), Self::FREE);
            acqf.evaluate(points.view())?;
            Ok(points)
        }
    }

    fn is_one_hot(row: ArrayView1<'_, f64>) -> bool {
        row.iter().all(|v| *v == 0.0 || *v == 1.0) && row.sum() == 1.0
    }

    /// In-memory sink for formatted log lines.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn with_captured_warnings<T>(f: impl FnOnce() -> T) -> (T, String) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let out = tracing::subscriber::with_default(subscriber, f);
        (out, logs.text())
    }

    #[test]
    fn discrete_space_delegates_unchanged() {
        let space = SearchSpace::builder().add_int("n", 0, 9).build().unwrap();
        let naive = orchestrator(Box::new(RandomRecommender::new()));

        let via_naive = naive
            .recommend(&space, 4, None, &mut StdRng::seed_from_u64(7))
            .unwrap();
        let direct = RandomRecommender::new()
            .recommend(&space, 4, None, &mut StdRng::seed_from_u64(7))
            .unwrap();
        assert_eq!(via_naive, direct);
    }

    #[test]
    fn continuous_space_delegates_unchanged() {
        let space = SearchSpace::builder()
            .add_float("x", -1.0, 1.0)
            .add_float("y", 0.0, 2.0)
            .build()
            .unwrap();
        let naive = NaiveHybridRecommender::default();

        let via_naive = naive
            .recommend(&space, 3, None, &mut StdRng::seed_from_u64(8))
            .unwrap();
        let direct = SequentialGreedyRecommender::new()
            .recommend(&space, 3, None, &mut StdRng::seed_from_u64(8))
            .unwrap();
        assert_eq!(via_naive, direct);
        assert_eq!(via_naive.len(), 3);
    }

    #[test]
    fn hybrid_batch_has_valid_rows() {
        let space = hybrid_space();
        let naive = NaiveHybridRecommender::default();
        let frame = naive
            .recommend(&space, 2, None, &mut StdRng::seed_from_u64(9))
            .unwrap();

        assert_eq!(frame.len(), 2);
        assert_eq!(frame.columns(), &["color", "temperature"]);
        assert_eq!(frame.index(), &[0, 1]);
        assert!(!frame.has_missing());

        let levels = [
            ParameterValue::from("red"),
            ParameterValue::from("green"),
            ParameterValue::from("blue"),
        ];
        for color in frame.column("color").unwrap() {
            assert!(levels.contains(color));
        }
        for t in frame.column("temperature").unwrap() {
            assert!((0.0..=1.0).contains(&t.as_f64().unwrap()));
        }
    }

    #[test]
    fn hybrid_with_non_predictive_discrete_part() {
        let space = hybrid_space();
        let discrete: Vec<Box<dyn Recommender>> = vec![
            Box::new(RandomRecommender::new()),
            Box::new(FarthestPointRecommender::new()),
        ];
        for disc in discrete {
            let frame = orchestrator(disc)
                .recommend(&space, 3, None, &mut StdRng::seed_from_u64(10))
                .unwrap();
            assert_eq!(frame.len(), 3);
            assert_eq!(frame.width(), 2);
        }
    }

    #[test]
    fn hybrid_is_seed_reproducible() {
        let space = hybrid_space();
        let naive = orchestrator(Box::new(RandomRecommender::new()));
        let a = naive
            .recommend(&space, 2, None, &mut StdRng::seed_from_u64(11))
            .unwrap();
        let b = naive
            .recommend(&space, 2, None, &mut StdRng::seed_from_u64(11))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn hybrid_pool_waives_markers_but_keeps_exclusions() {
        let mut space = hybrid_space();
        space.discrete_mut().mark_recommended(&[0, 1, 2]).unwrap();
        space.discrete_mut().mark_measured(&[1]).unwrap();
        space.discrete_mut().exclude(&[0]).unwrap();
        let naive = orchestrator(Box::new(RandomRecommender::new()));

        let red = ParameterValue::from("red");
        for seed in 0..20 {
            let frame = naive
                .recommend(&space, 2, None, &mut StdRng::seed_from_u64(seed))
                .unwrap();
            assert_eq!(frame.len(), 2);
            assert!(frame.column("color").unwrap().iter().all(|c| **c != red));
        }

        let err = naive
            .recommend(&space, 3, None, &mut StdRng::seed_from_u64(12))
            .unwrap_err();
        assert!(err.is_insufficient_candidates());
    }

    #[test]
    fn hybrid_batch_larger_than_pool() {
        let space = hybrid_space();
        let naive = orchestrator(Box::new(RandomRecommender::new()));
        let err = naive
            .recommend(&space, 4, None, &mut StdRng::seed_from_u64(13))
            .unwrap_err();
        assert!(err.is_insufficient_candidates());
        let err = naive
            .recommend(&space, 0, None, &mut StdRng::seed_from_u64(13))
            .unwrap_err();
        assert!(err.is_insufficient_candidates());
    }

    #[test]
    fn analytical_continuous_part_rejects_batches() {
        let space = hybrid_space();
        let cont = SequentialGreedyRecommender::new()
            .with_acquisition(AcquisitionKind::UpperConfidenceBound { beta: 0.2 });
        let naive = NaiveHybridRecommender::new(
            Box::new(RandomRecommender::new()),
            Box::new(cont),
            RecommendationFlags::default(),
        );
        let err = naive
            .recommend(&space, 2, None, &mut StdRng::seed_from_u64(14))
            .unwrap_err();
        assert!(matches!(
            err,
            MfError::Recommend(RecommendError::AnalyticalAcquisitionUnsupported { .. })
        ));
    }

    #[test]
    fn capability_missing_fails_before_sampling() {
        let naive = orchestrator(Box::new(Opaque::default()));
        let discrete = SearchSpace::builder().add_int("n", 0, 3).build().unwrap();

        for space in [hybrid_space(), discrete] {
            let mut rng = CountingRng::new(15);
            let err = naive.recommend(&space, 1, None, &mut rng).unwrap_err();
            assert!(matches!(
                err,
                MfError::Recommend(RecommendError::NotImplemented { .. })
            ));
            assert_eq!(rng.calls, 0);
        }
    }

    #[test]
    fn continuous_space_skips_capability_check() {
        let naive = orchestrator(Box::new(Opaque::default()));
        let space = SearchSpace::builder().add_float("x", 0.0, 1.0).build().unwrap();
        let frame = naive
            .recommend(&space, 1, None, &mut StdRng::seed_from_u64(16))
            .unwrap();
        assert_eq!(frame.len(), 1);
    }

    #[test]
    fn flag_conflicts_resolved_in_favour_of_orchestrator() {
        let disc = RandomRecommender::new().with_flags(RecommendationFlags::new(true, false));
        let Reconciled {
            recommender,
            conflicts,
        } = NaiveHybridRecommender::reconcile(Box::new(disc), RecommendationFlags::default());
        assert_eq!(conflicts.len(), 2);
        assert_eq!(recommender.flags(), RecommendationFlags::default());

        let again = NaiveHybridRecommender::reconcile(recommender, RecommendationFlags::default());
        assert!(again.conflicts.is_empty());
    }

    #[test]
    fn constructor_overrides_discrete_flags() {
        let own = RecommendationFlags::new(true, true);
        let naive = NaiveHybridRecommender::new(
            Box::new(RandomRecommender::new()),
            Box::new(SequentialGreedyRecommender::new()),
            own,
        );
        assert_eq!(naive.flags(), own);
        assert_eq!(naive.disc_recommender().flags(), own);
        // the continuous recommender is left alone
        assert_eq!(
            naive.cont_recommender().flags(),
            RecommendationFlags::default()
        );
    }

    #[test]
    fn orchestrator_has_no_capability_of_its_own() {
        let naive = NaiveHybridRecommender::default();
        assert!(naive.capability().is_none());
        let nested = orchestrator(Box::new(NaiveHybridRecommender::default()));
        let err = nested
            .recommend(&hybrid_space(), 1, None, &mut StdRng::seed_from_u64(17))
            .unwrap_err();
        assert!(matches!(
            err,
            MfError::Recommend(RecommendError::NotImplemented { .. })
        ));
    }

    #[test]
    fn constructor_warns_once_per_overridden_flag() {
        let disc = RandomRecommender::new().with_flags(RecommendationFlags::new(true, false));
        let (naive, logs) = with_captured_warnings(|| {
            NaiveHybridRecommender::new(
                Box::new(disc),
                Box::new(SequentialGreedyRecommender::new()),
                RecommendationFlags::default(),
            )
        });
        assert_eq!(naive.disc_recommender().flags(), RecommendationFlags::default());
        assert_eq!(logs.matches("WARN").count(), 2, "{logs}");
        assert!(logs.contains("allow_repeated_recommendations"));
        assert!(logs.contains("allow_recommending_already_measured"));

        let (_, quiet) = with_captured_warnings(NaiveHybridRecommender::default);
        assert!(quiet.is_empty(), "{quiet}");
    }

    #[test]
    fn pins_join_on_the_correct_side() {
        let disc_log = BatchLog::default();
        let cont_log = BatchLog::default();
        let naive = NaiveHybridRecommender::new(
            Box::new(Scripted::new(&disc_log)),
            Box::new(Scripted::new(&cont_log)),
            RecommendationFlags::default(),
        );
        let frame = naive
            .recommend(&hybrid_space(), 2, None, &mut StdRng::seed_from_u64(18))
            .unwrap();

        // discrete search: one-hot candidate first, continuous pin last
        let disc_batches = disc_log.lock().unwrap();
        assert_eq!(disc_batches.len(), 3);
        let pin = disc_batches[0][[0, 3]];
        assert!((0.0..=1.0).contains(&pin));
        for batch in disc_batches.iter() {
            assert_eq!(batch.dim(), (1, 4));
            assert!(is_one_hot(batch.slice(s![0, ..3])));
            assert_eq!(batch[[0, 3]], pin);
        }

        // continuous search: discrete pin first, free point last
        let cont_batches = cont_log.lock().unwrap();
        assert_eq!(cont_batches.len(), 1);
        let batch = &cont_batches[0];
        assert_eq!(batch.dim(), (2, 4));
        for row in batch.rows() {
            assert!(is_one_hot(row.slice(s![..3])));
            assert_eq!(row.slice(s![..3]), batch.row(0).slice(s![..3]));
            assert_eq!(row[3], Scripted::FREE);
        }

        for t in frame.column("temperature").unwrap() {
            assert_eq!(t.as_f64(), Some(Scripted::FREE));
        }
    }
}
