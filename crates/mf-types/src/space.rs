//! Search spaces: a discrete subspace crossed with a continuous one.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::errors::{MfResult, SearchSpaceError};
use crate::frame::Frame;
use crate::parameter::{ParameterDef, ParameterValue};
use crate::{internal_error, validation_error};

/// Identifier of a row of the discrete subspace.
pub type CandidateId = usize;

/// Topology of a search space, or the set of topologies a recommender accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpaceKind {
    Discrete,
    Continuous,
    Hybrid,
    /// Compatible with purely discrete or purely continuous spaces.
    Either,
}

impl SpaceKind {
    /// Whether a recommender declaring `self` can handle a space of `kind`.
    pub fn supports(self, kind: SpaceKind) -> bool {
        match self {
            SpaceKind::Hybrid => true,
            SpaceKind::Either => matches!(kind, SpaceKind::Discrete | SpaceKind::Continuous),
            own => own == kind,
        }
    }
}

impl fmt::Display for SpaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpaceKind::Discrete => "DISCRETE",
            SpaceKind::Continuous => "CONTINUOUS",
            SpaceKind::Hybrid => "HYBRID",
            SpaceKind::Either => "EITHER",
        };
        f.write_str(name)
    }
}

/// Bookkeeping attached to every discrete configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateMetadata {
    pub was_recommended: bool,
    pub was_measured: bool,
    /// Excluded by the user; never offered again.
    pub dont_recommend: bool,
}

/// Which discrete rows may enter a candidate pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePolicy {
    pub allow_repeated: bool,
    pub allow_already_measured: bool,
    /// Also return rows flagged `dont_recommend`.
    pub include_excluded: bool,
}

impl CandidatePolicy {
    pub fn new(allow_repeated: bool, allow_already_measured: bool) -> Self {
        Self {
            allow_repeated,
            allow_already_measured,
            include_excluded: false,
        }
    }

    /// Every row, regardless of metadata.
    pub fn unrestricted() -> Self {
        Self {
            allow_repeated: true,
            allow_already_measured: true,
            include_excluded: true,
        }
    }

    fn admits(&self, meta: &CandidateMetadata) -> bool {
        (self.include_excluded || !meta.dont_recommend)
            && (self.allow_repeated || !meta.was_recommended)
            && (self.allow_already_measured || !meta.was_measured)
    }
}

/// Discrete rows eligible for recommendation, in computational representation.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePool {
    pub ids: Vec<CandidateId>,
    /// One row per id, same order.
    pub comp: Array2<f64>,
}

impl CandidatePool {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Discrete subspace
// ---------------------------------------------------------------------------

/// The finite set of discrete configurations: the Cartesian product of the
/// levels of every discrete parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteSubspace {
    parameters: Vec<ParameterDef>,
    comp_columns: Vec<String>,
    exp_rep: Vec<Vec<ParameterValue>>,
    comp_rep: Array2<f64>,
    metadata: Vec<CandidateMetadata>,
}

impl DiscreteSubspace {
    pub fn empty() -> Self {
        Self {
            parameters: Vec::new(),
            comp_columns: Vec::new(),
            exp_rep: Vec::new(),
            comp_rep: Array2::zeros((0, 0)),
            metadata: Vec::new(),
        }
    }

    pub fn from_parameters(parameters: Vec<ParameterDef>) -> MfResult<Self> {
        if parameters.is_empty() {
            return Ok(Self::empty());
        }

        let mut axes: Vec<Vec<(ParameterValue, Vec<f64>)>> = Vec::with_capacity(parameters.len());
        for param in &parameters {
            param.validate()?;
            let levels = param.levels().ok_or_else(|| SearchSpaceError::InvalidParameter {
                name: param.name.clone(),
                message: "continuous parameter in discrete subspace".to_string(),
            })?;
            let encoded = levels
                .into_iter()
                .map(|level| {
                    let comp = param.encode(&level)?;
                    Ok((level, comp))
                })
                .collect::<MfResult<Vec<_>>>()?;
            axes.push(encoded);
        }

        // Cartesian product
        let mut exp_rep: Vec<Vec<ParameterValue>> = vec![Vec::new()];
        let mut comp_flat: Vec<Vec<f64>> = vec![Vec::new()];
        for axis in &axes {
            let mut next_exp = Vec::with_capacity(exp_rep.len() * axis.len());
            let mut next_comp = Vec::with_capacity(exp_rep.len() * axis.len());
            for (exp, comp) in exp_rep.iter().zip(&comp_flat) {
                for (level, encoded) in axis {
                    let mut e = exp.clone();
                    e.push(level.clone());
                    next_exp.push(e);
                    let mut c = comp.clone();
                    c.extend_from_slice(encoded);
                    next_comp.push(c);
                }
            }
            exp_rep = next_exp;
            comp_flat = next_comp;
        }

        let comp_columns: Vec<String> = parameters.iter().flat_map(|p| p.comp_columns()).collect();
        let n_rows = exp_rep.len();
        let comp_rep = Array2::from_shape_vec(
            (n_rows, comp_columns.len()),
            comp_flat.into_iter().flatten().collect(),
        )
        .map_err(|e| internal_error!("discrete comp rep: {e}"))?;

        Ok(Self {
            parameters,
            comp_columns,
            exp_rep,
            comp_rep,
            metadata: vec![CandidateMetadata::default(); n_rows],
        })
    }

    /// True when the subspace has no parameters.
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Number of configurations.
    pub fn len(&self) -> usize {
        self.exp_rep.len()
    }

    pub fn parameters(&self) -> &[ParameterDef] {
        &self.parameters
    }

    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    pub fn comp_columns(&self) -> &[String] {
        &self.comp_columns
    }

    pub fn comp_rep(&self) -> ArrayView2<'_, f64> {
        self.comp_rep.view()
    }

    pub fn exp_row(&self, id: CandidateId) -> Option<&[ParameterValue]> {
        self.exp_rep.get(id).map(Vec::as_slice)
    }

    pub fn metadata(&self, id: CandidateId) -> Option<&CandidateMetadata> {
        self.metadata.get(id)
    }

    /// Rows admitted by `policy`, with their computational representation.
    pub fn candidate_pool(&self, policy: CandidatePolicy) -> CandidatePool {
        let ids: Vec<CandidateId> = self
            .metadata
            .iter()
            .enumerate()
            .filter(|(_, meta)| policy.admits(meta))
            .map(|(id, _)| id)
            .collect();
        let comp = self.comp_rep.select(Axis(0), &ids);
        CandidatePool { ids, comp }
    }

    /// Computational representation of the given rows, in order.
    pub fn comp_rows(&self, ids: &[CandidateId]) -> MfResult<Array2<f64>> {
        self.check_ids(ids)?;
        Ok(self.comp_rep.select(Axis(0), ids))
    }

    /// Experimental representation of the given rows, labelled `0..ids.len()`.
    pub fn experimental_frame(&self, ids: &[CandidateId]) -> MfResult<Frame> {
        self.check_ids(ids)?;
        let rows = ids.iter().map(|&id| self.exp_rep[id].clone()).collect();
        Frame::from_rows(self.parameter_names(), rows)
    }

    /// Row whose experimental values equal `values` (in parameter order).
    pub fn find_row(&self, values: &[ParameterValue]) -> Option<CandidateId> {
        if values.len() != self.parameters.len() {
            return None;
        }
        self.exp_rep.iter().position(|row| {
            row.iter().zip(values).all(|(level, v)| {
                level == v
                    || matches!((level.as_f64(), v.as_f64()), (Some(a), Some(b)) if a == b)
            })
        })
    }

    pub fn mark_recommended(&mut self, ids: &[CandidateId]) -> MfResult<()> {
        self.update_metadata(ids, |m| m.was_recommended = true)
    }

    pub fn mark_measured(&mut self, ids: &[CandidateId]) -> MfResult<()> {
        self.update_metadata(ids, |m| m.was_measured = true)
    }

    /// Exclude rows from all future candidate pools.
    pub fn exclude(&mut self, ids: &[CandidateId]) -> MfResult<()> {
        self.update_metadata(ids, |m| m.dont_recommend = true)
    }

    fn update_metadata(
        &mut self,
        ids: &[CandidateId],
        f: impl Fn(&mut CandidateMetadata),
    ) -> MfResult<()> {
        self.check_ids(ids)?;
        for &id in ids {
            f(&mut self.metadata[id]);
        }
        Ok(())
    }

    fn check_ids(&self, ids: &[CandidateId]) -> MfResult<()> {
        match ids.iter().find(|&&id| id >= self.len()) {
            Some(&id) => Err(SearchSpaceError::CandidateOutOfRange { id, len: self.len() }.into()),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Continuous subspace
// ---------------------------------------------------------------------------

/// A box-bounded region of real-valued parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousSubspace {
    parameters: Vec<ParameterDef>,
}

impl ContinuousSubspace {
    pub fn empty() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn from_parameters(parameters: Vec<ParameterDef>) -> MfResult<Self> {
        for param in &parameters {
            param.validate()?;
            if param.is_discrete() {
                return Err(SearchSpaceError::InvalidParameter {
                    name: param.name.clone(),
                    message: "discrete parameter in continuous subspace".to_string(),
                }
                .into());
            }
        }
        Ok(Self { parameters })
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.parameters.len()
    }

    pub fn parameters(&self) -> &[ParameterDef] {
        &self.parameters
    }

    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    /// `(low, high)` per parameter.
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.parameters
            .iter()
            .filter_map(ParameterDef::bounds)
            .collect()
    }

    /// `n` points drawn uniformly from the box, one per row.
    pub fn sample_random<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Array2<f64> {
        let bounds = self.bounds();
        Array2::from_shape_fn((n, bounds.len()), |(_, j)| {
            let (low, high) = bounds[j];
            rng.random_range(low..=high)
        })
    }

    /// Whether a point lies inside the bounds.
    pub fn contains(&self, point: &[f64]) -> bool {
        point.len() == self.dim()
            && self
                .bounds()
                .iter()
                .zip(point)
                .all(|((low, high), v)| v >= low && v <= high)
    }

    /// Project a point onto the box.
    pub fn clamp(&self, point: &mut [f64]) {
        for ((low, high), v) in self.bounds().iter().zip(point.iter_mut()) {
            *v = v.clamp(*low, *high);
        }
    }

    /// Experimental representation of continuous points, labelled `0..n`.
    pub fn to_frame(&self, points: ArrayView2<'_, f64>) -> MfResult<Frame> {
        if points.ncols() != self.dim() {
            return Err(SearchSpaceError::DimensionMismatch {
                expected: self.dim(),
                actual: points.ncols(),
            }
            .into());
        }
        Frame::from_matrix(self.parameter_names(), points)
    }
}

// ---------------------------------------------------------------------------
// Composite space
// ---------------------------------------------------------------------------

/// The full search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    discrete: DiscreteSubspace,
    continuous: ContinuousSubspace,
}

impl SearchSpace {
    pub fn builder() -> SearchSpaceBuilder {
        SearchSpaceBuilder::default()
    }

    /// Split `parameters` into subspaces. Fails when there are none.
    pub fn from_parameters(parameters: Vec<ParameterDef>) -> MfResult<Self> {
        if parameters.is_empty() {
            return Err(SearchSpaceError::Empty.into());
        }
        for (i, param) in parameters.iter().enumerate() {
            if parameters[..i].iter().any(|p| p.name == param.name) {
                return Err(SearchSpaceError::DuplicateParameter {
                    name: param.name.clone(),
                }
                .into());
            }
        }

        let (discrete, continuous): (Vec<_>, Vec<_>) =
            parameters.into_iter().partition(ParameterDef::is_discrete);
        Ok(Self {
            discrete: DiscreteSubspace::from_parameters(discrete)?,
            continuous: ContinuousSubspace::from_parameters(continuous)?,
        })
    }

    /// Topology derived from which subspaces are populated.
    pub fn kind(&self) -> SpaceKind {
        match (self.discrete.is_empty(), self.continuous.is_empty()) {
            (false, true) => SpaceKind::Discrete,
            (true, false) => SpaceKind::Continuous,
            _ => SpaceKind::Hybrid,
        }
    }

    pub fn discrete(&self) -> &DiscreteSubspace {
        &self.discrete
    }

    pub fn discrete_mut(&mut self) -> &mut DiscreteSubspace {
        &mut self.discrete
    }

    pub fn continuous(&self) -> &ContinuousSubspace {
        &self.continuous
    }

    /// All parameters, discrete first.
    pub fn parameters(&self) -> impl Iterator<Item = &ParameterDef> {
        self.discrete
            .parameters()
            .iter()
            .chain(self.continuous.parameters())
    }

    /// Experimental column names, discrete first.
    pub fn exp_columns(&self) -> Vec<String> {
        self.parameters().map(|p| p.name.clone()).collect()
    }

    /// Computational column names, discrete first.
    pub fn comp_columns(&self) -> Vec<String> {
        let mut columns = self.discrete.comp_columns().to_vec();
        columns.extend(self.continuous.parameter_names());
        columns
    }

    pub fn comp_dim(&self) -> usize {
        self.discrete.comp_columns().len() + self.continuous.dim()
    }

    /// Computational representation of one configuration given by name.
    pub fn encode(&self, config: &HashMap<String, ParameterValue>) -> MfResult<Vec<f64>> {
        if let Some(name) = config
            .keys()
            .find(|k| !self.parameters().any(|p| &p.name == *k))
        {
            return Err(SearchSpaceError::UnknownParameter { name: name.clone() }.into());
        }

        let mut row = Vec::with_capacity(self.comp_dim());
        for param in self.parameters() {
            let value = config
                .get(&param.name)
                .ok_or_else(|| validation_error!("missing parameter {}", param.name))?;
            row.extend(param.encode(value)?);
        }
        Ok(row)
    }

    /// Discrete row matching the discrete part of `config`.
    pub fn discrete_row_of(&self, config: &HashMap<String, ParameterValue>) -> Option<CandidateId> {
        if self.discrete.is_empty() {
            return None;
        }
        let values: Option<Vec<ParameterValue>> = self
            .discrete
            .parameters()
            .iter()
            .map(|p| config.get(&p.name).cloned())
            .collect();
        self.discrete.find_row(&values?)
    }
}

/// Fluent construction of a [`SearchSpace`].
#[derive(Debug, Clone, Default)]
pub struct SearchSpaceBuilder {
    parameters: Vec<ParameterDef>,
}

impl SearchSpaceBuilder {
    pub fn add(mut self, param: ParameterDef) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn add_float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(ParameterDef::float(name, low, high))
    }

    pub fn add_int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(ParameterDef::int(name, low, high))
    }

    pub fn add_numerical(self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.add(ParameterDef::numerical(name, values))
    }

    pub fn add_choice(self, name: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        self.add(ParameterDef::choice(name, values))
    }

    pub fn build(self) -> MfResult<SearchSpace> {
        SearchSpace::from_parameters(self.parameters)
    }
}

// ---------------------------------------------------------------------------
// Training data
// ---------------------------------------------------------------------------

/// Observation history in computational representation.
///
/// `y` is oriented so that larger is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingData {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
}

impl TrainingData {
    pub fn new(x: Array2<f64>, y: Array1<f64>) -> MfResult<Self> {
        if x.nrows() != y.len() {
            return Err(validation_error!(
                "{} inputs but {} targets",
                x.nrows(),
                y.len()
            ));
        }
        Ok(Self { x, y })
    }

    pub fn empty(dim: usize) -> Self {
        Self {
            x: Array2::zeros((0, dim)),
            y: Array1::zeros(0),
        }
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.x.ncols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MfError;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn hybrid_space() -> SearchSpace {
        SearchSpace::builder()
            .add_choice("solvent", vec![json!("water"), json!("ethanol"), json!("dmso")])
            .add_int("stage", 1, 2)
            .add_float("temperature", 20.0, 80.0)
            .build()
            .unwrap()
    }

    #[test]
    fn empty_space_rejected() {
        let err = SearchSpace::from_parameters(vec![]).unwrap_err();
        assert!(matches!(err, MfError::SearchSpace(SearchSpaceError::Empty)));
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = SearchSpace::builder()
            .add_float("x", 0.0, 1.0)
            .add_int("x", 0, 1)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            MfError::SearchSpace(SearchSpaceError::DuplicateParameter { .. })
        ));
    }

    #[test]
    fn kind_follows_populated_subspaces() {
        assert_eq!(hybrid_space().kind(), SpaceKind::Hybrid);
        let disc = SearchSpace::builder().add_int("n", 0, 3).build().unwrap();
        assert_eq!(disc.kind(), SpaceKind::Discrete);
        let cont = SearchSpace::builder().add_float("x", 0.0, 1.0).build().unwrap();
        assert_eq!(cont.kind(), SpaceKind::Continuous);
    }

    #[test]
    fn compatibility_matrix() {
        assert!(SpaceKind::Hybrid.supports(SpaceKind::Discrete));
        assert!(SpaceKind::Hybrid.supports(SpaceKind::Hybrid));
        assert!(SpaceKind::Either.supports(SpaceKind::Continuous));
        assert!(!SpaceKind::Either.supports(SpaceKind::Hybrid));
        assert!(!SpaceKind::Discrete.supports(SpaceKind::Continuous));
    }

    #[test]
    fn discrete_product_and_encoding() {
        let space = hybrid_space();
        let disc = space.discrete();
        assert_eq!(disc.len(), 6);
        assert_eq!(
            disc.comp_columns(),
            &["solvent_water", "solvent_ethanol", "solvent_dmso", "stage"]
        );
        assert_eq!(disc.comp_rep().row(0).to_vec(), vec![1.0, 0.0, 0.0, 1.0]);
        assert_eq!(space.comp_dim(), 5);
        assert_eq!(
            space.exp_columns(),
            vec!["solvent", "stage", "temperature"]
        );
    }

    #[test]
    fn candidate_pool_honours_policy() {
        let mut space = hybrid_space();
        let disc = space.discrete_mut();
        disc.mark_recommended(&[0]).unwrap();
        disc.mark_measured(&[1]).unwrap();
        disc.exclude(&[2]).unwrap();

        let strict = disc.candidate_pool(CandidatePolicy::new(false, false));
        assert_eq!(strict.ids, vec![3, 4, 5]);
        assert_eq!(strict.comp.nrows(), 3);

        let lenient = disc.candidate_pool(CandidatePolicy::new(true, true));
        assert_eq!(lenient.ids, vec![0, 1, 3, 4, 5]);

        let all = disc.candidate_pool(CandidatePolicy::unrestricted());
        assert_eq!(all.len(), 6);
    }

    #[test]
    fn out_of_range_ids_rejected() {
        let space = hybrid_space();
        assert!(space.discrete().comp_rows(&[6]).is_err());
        assert!(space.discrete().experimental_frame(&[0, 99]).is_err());
    }

    #[test]
    fn continuous_samples_stay_in_bounds() {
        let space = hybrid_space();
        let mut rng = StdRng::seed_from_u64(7);
        let points = space.continuous().sample_random(100, &mut rng);
        assert_eq!(points.dim(), (100, 1));
        for row in points.rows() {
            assert!(space.continuous().contains(row.as_slice().unwrap()));
        }
    }

    #[test]
    fn encode_full_configuration() {
        let space = hybrid_space();
        let mut config = HashMap::new();
        config.insert("solvent".to_string(), ParameterValue::from("dmso"));
        config.insert("stage".to_string(), ParameterValue::Int(2));
        config.insert("temperature".to_string(), ParameterValue::Float(50.0));
        assert_eq!(space.encode(&config).unwrap(), vec![0.0, 0.0, 1.0, 2.0, 50.0]);
        assert_eq!(space.discrete_row_of(&config), Some(5));

        config.insert("pressure".to_string(), ParameterValue::Float(1.0));
        assert!(space.encode(&config).is_err());
    }

    #[test]
    fn experimental_frame_relabels_rows() {
        let space = hybrid_space();
        let frame = space.discrete().experimental_frame(&[4, 1]).unwrap();
        assert_eq!(frame.index(), &[0, 1]);
        assert_eq!(frame.row(0).unwrap(), space.discrete().exp_row(4).unwrap());
    }
}
