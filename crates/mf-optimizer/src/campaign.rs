//! Campaign tracking: a search space, a recommender and the measurements
//! gathered so far.

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use mf_types::{
    internal_error, validation_error, CandidateId, Frame, MfResult, ParameterValue, SearchSpace,
    TrainingData,
};

use crate::recommender::Recommender;

/// Unique campaign identifier.
pub type CampaignId = Uuid;

/// Whether we are maximizing or minimizing the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveDirection {
    Maximize,
    Minimize,
}

impl Default for ObjectiveDirection {
    fn default() -> Self {
        Self::Maximize
    }
}

impl ObjectiveDirection {
    /// Target value oriented so that larger is better.
    pub fn orient(self, target: f64) -> f64 {
        match self {
            Self::Maximize => target,
            Self::Minimize => -target,
        }
    }

    pub fn is_better(self, candidate: f64, current: f64) -> bool {
        self.orient(candidate) > self.orient(current)
    }
}

/// One evaluated configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: Uuid,
    /// Number of recommendation batches issued before this measurement.
    pub batch: usize,
    pub parameters: HashMap<String, ParameterValue>,
    pub target: f64,
    pub measured_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    space: SearchSpace,
    recommender: Box<dyn Recommender>,
    direction: ObjectiveDirection,
    measurements: Vec<Measurement>,
    batches_recommended: usize,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(name: impl Into<String>, space: SearchSpace, recommender: Box<dyn Recommender>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            space,
            recommender,
            direction: ObjectiveDirection::Maximize,
            measurements: Vec::new(),
            batches_recommended: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_direction(mut self, direction: ObjectiveDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn space_mut(&mut self) -> &mut SearchSpace {
        &mut self.space
    }

    pub fn recommender(&self) -> &dyn Recommender {
        self.recommender.as_ref()
    }

    pub fn direction(&self) -> ObjectiveDirection {
        self.direction
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn batches_recommended(&self) -> usize {
        self.batches_recommended
    }

    /// Measurements in computational representation, `None` before the first
    /// measurement.
    pub fn training_data(&self) -> MfResult<Option<TrainingData>> {
        if self.measurements.is_empty() {
            return Ok(None);
        }
        let dim = self.space.comp_dim();
        let mut flat = Vec::with_capacity(self.measurements.len() * dim);
        for m in &self.measurements {
            flat.extend(self.space.encode(&m.parameters)?);
        }
        let x = Array2::from_shape_vec((self.measurements.len(), dim), flat)
            .map_err(|e| internal_error!("cannot shape training inputs: {e}"))?;
        let y: Array1<f64> = self
            .measurements
            .iter()
            .map(|m| self.direction.orient(m.target))
            .collect();
        TrainingData::new(x, y).map(Some)
    }

    /// Ask the recommender for the next batch. Discrete rows of the batch are
    /// marked as recommended.
    pub fn recommend(&mut self, batch_size: usize, rng: &mut dyn RngCore) -> MfResult<Frame> {
        let history = self.training_data()?;
        let frame = self
            .recommender
            .recommend(&self.space, batch_size, history.as_ref(), rng)?;

        let ids: Vec<CandidateId> = frame
            .records()
            .iter()
            .filter_map(|record| self.space.discrete_row_of(record))
            .collect();
        self.space.discrete_mut().mark_recommended(&ids)?;
        self.batches_recommended += 1;

        info!(
            campaign = %self.name,
            batch = self.batches_recommended,
            rows = frame.len(),
            "batch recommended"
        );
        Ok(frame)
    }

    /// Record measured configurations. Every row is checked before any is
    /// stored: names must belong to the space, values must be valid levels or
    /// lie within bounds, and targets must be finite.
    pub fn add_measurements(
        &mut self,
        rows: Vec<(HashMap<String, ParameterValue>, f64)>,
    ) -> MfResult<()> {
        for (parameters, target) in &rows {
            if !target.is_finite() {
                return Err(validation_error!(
                    "target must be finite, got {target}"
                ));
            }
            self.space.encode(parameters)?;
        }

        let added = rows.len();
        let now = Utc::now();
        let mut measured = Vec::new();
        for (parameters, target) in rows {
            if let Some(id) = self.space.discrete_row_of(&parameters) {
                measured.push(id);
            }
            self.measurements.push(Measurement {
                id: Uuid::new_v4(),
                batch: self.batches_recommended,
                parameters,
                target,
                measured_at: now,
            });
        }
        self.space.discrete_mut().mark_measured(&measured)?;

        info!(
            campaign = %self.name,
            added,
            total = self.measurements.len(),
            "measurements added"
        );
        Ok(())
    }

    /// Best measurement according to the objective direction.
    pub fn best_measurement(&self) -> Option<&Measurement> {
        self.measurements.iter().fold(None, |best, m| match best {
            Some(b) if !self.direction.is_better(m.target, b.target) => Some(b),
            _ => Some(m),
        })
    }
}
