//! # mf-optimizer
//!
//! Recommenders and hybrid-space recommendation orchestration for Mixfold.
//!
//! Provides a kernel surrogate with analytical and Monte Carlo acquisition
//! functions, a sequential greedy Bayesian recommender, random and
//! farthest-point recommenders, the naive hybrid recommender that combines a
//! discrete and a continuous recommender through pinned acquisition
//! functions, and campaign tracking with closed-loop simulation.

mod acquisition;
mod campaign;
mod config;
mod flags;
mod greedy;
mod hybrid;
mod nonpredictive;
mod recommender;
mod simulation;
mod surrogate;

pub use acquisition::{AcquisitionFunction, AcquisitionKind, PartialAcquisitionFunction};
pub use campaign::{Campaign, CampaignId, Measurement, ObjectiveDirection};
pub use config::{CampaignConfig, RecommenderConfig, SequentialGreedyConfig};
pub use flags::{synchronize_flags, FlagConflict, FlagName, FlagSync, RecommendationFlags};
pub use greedy::{HybridSampler, SequentialGreedyRecommender};
pub use hybrid::{NaiveHybridRecommender, Reconciled};
pub use nonpredictive::{farthest_point_sampling, FarthestPointRecommender, RandomRecommender};
pub use recommender::{BayesianRecommender, Capability, NonPredictiveRecommender, Recommender};
pub use simulation::{simulate_campaign, BatchRecord, SimulationTrace};
pub use surrogate::{column_scales, KernelSurrogate, Posterior, Surrogate};
