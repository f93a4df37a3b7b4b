//! Closed-loop simulation of a campaign against a lookup function.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

use mf_types::{MfResult, ParameterValue, RecommendError, SpaceKind};

use crate::campaign::Campaign;

/// Outcome of one simulated batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub batch: usize,
    pub targets: Vec<f64>,
    /// Best target measured so far, in the campaign's direction.
    pub best_so_far: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationTrace {
    pub batches: Vec<BatchRecord>,
    /// The run ended before `n_batches` because candidates ran out.
    pub stopped_early: bool,
}

impl SimulationTrace {
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn best(&self) -> Option<f64> {
        self.batches.last().map(|b| b.best_so_far)
    }
}

/// Run up to `n_batches` rounds of recommend, look up, measure.
///
/// A purely discrete space whose candidate pool is already empty under the
/// recommender's flags has nothing to simulate. Running out of candidates
/// after at least one batch ends the run early.
pub fn simulate_campaign<F>(
    campaign: &mut Campaign,
    mut lookup: F,
    n_batches: usize,
    batch_size: usize,
    rng: &mut dyn RngCore,
) -> MfResult<SimulationTrace>
where
    F: FnMut(&HashMap<String, ParameterValue>) -> MfResult<f64>,
{
    let space = campaign.space();
    if space.kind() == SpaceKind::Discrete {
        let policy = campaign.recommender().flags().candidate_policy();
        if space.discrete().candidate_pool(policy).is_empty() {
            return Err(RecommendError::NothingToSimulate.into());
        }
    }

    let mut trace = SimulationTrace::default();
    for batch in 0..n_batches {
        let frame = match campaign.recommend(batch_size, rng) {
            Ok(frame) => frame,
            Err(e) if e.is_insufficient_candidates() && !trace.is_empty() => {
                warn!(campaign = %campaign.name, batch, error = %e, "simulation stopped early");
                trace.stopped_early = true;
                break;
            }
            Err(e) => return Err(e),
        };

        let rows = frame
            .records()
            .into_iter()
            .map(|record| {
                let target = lookup(&record)?;
                Ok((record, target))
            })
            .collect::<MfResult<Vec<_>>>()?;
        let targets: Vec<f64> = rows.iter().map(|(_, t)| *t).collect();
        campaign.add_measurements(rows)?;

        let best_so_far = campaign
            .best_measurement()
            .map(|m| m.target)
            .unwrap_or(f64::NAN);
        trace.batches.push(BatchRecord {
            batch,
            targets,
            best_so_far,
        });
    }

    info!(
        campaign = %campaign.name,
        batches = trace.len(),
        stopped_early = trace.stopped_early,
        "simulation finished"
    );
    Ok(trace)
}
