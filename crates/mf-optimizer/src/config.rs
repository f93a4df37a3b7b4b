//! Serializable configuration for recommenders and campaigns.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use mf_types::{config_error, validation_error, MfResult, ParameterDef, SearchSpace};

use crate::acquisition::AcquisitionKind;
use crate::campaign::{Campaign, ObjectiveDirection};
use crate::flags::RecommendationFlags;
use crate::greedy::{HybridSampler, SequentialGreedyRecommender};
use crate::hybrid::NaiveHybridRecommender;
use crate::nonpredictive::{FarthestPointRecommender, RandomRecommender};
use crate::recommender::{BayesianRecommender, Recommender};
use crate::surrogate::KernelSurrogate;

/// Settings of the sequential greedy recommender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequentialGreedyConfig {
    pub flags: RecommendationFlags,
    pub acquisition: AcquisitionKind,
    pub hybrid_sampler: HybridSampler,
    pub sampling_percentage: f64,
    pub num_restarts: usize,
    pub raw_samples: usize,
    pub lengthscale: f64,
}

impl Default for SequentialGreedyConfig {
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

impl SequentialGreedyConfig {
    pub fn build(&self) -> MfResult<SequentialGreedyRecommender> {
        if self.lengthscale.is_nan() || self.lengthscale <= 0.0 {
            return Err(validation_error!(
                "lengthscale must be positive, got {}",
                self.lengthscale
            ));
        }
        Ok(SequentialGreedyRecommender::new()
            .with_flags(self.flags)
            .with_acquisition(self.acquisition)
            .with_hybrid_sampling(self.hybrid_sampler, self.sampling_percentage)?
            .with_restarts(self.num_restarts, self.raw_samples)
            .with_lengthscale(self.lengthscale))
    }
}

/// Which recommender to build, tagged by `"type"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecommenderConfig {
    SequentialGreedy(SequentialGreedyConfig),
    Random {
        #[serde(default)]
        flags: RecommendationFlags,
    },
    FarthestPoint {
        #[serde(default)]
        flags: RecommendationFlags,
    },
    NaiveHybrid {
        #[serde(default)]
        flags: RecommendationFlags,
        #[serde(default = "default_sub_recommender")]
        discrete: Box<RecommenderConfig>,
        #[serde(default = "default_sub_recommender")]
        continuous: Box<RecommenderConfig>,
    },
}

fn default_sub_recommender() -> Box<RecommenderConfig> {
    Box::new(RecommenderConfig::SequentialGreedy(SequentialGreedyConfig::default()))
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self::NaiveHybrid {
            flags: RecommendationFlags::default(),
            discrete: default_sub_recommender(),
            continuous: default_sub_recommender(),
        }
    }
}

impl RecommenderConfig {
    pub fn build(&self) -> MfResult<Box<dyn Recommender>> {
        Ok(match self {
            Self::SequentialGreedy(config) => Box::new(config.build()?),
            Self::Random { flags } => Box::new(RandomRecommender::new().with_flags(*flags)),
            Self::FarthestPoint { flags } => {
                Box::new(FarthestPointRecommender::new().with_flags(*flags))
            }
            Self::NaiveHybrid {
                flags,
                discrete,
                continuous,
            } => Box::new(NaiveHybridRecommender::new(
                discrete.build()?,
                continuous.build_bayesian()?,
                *flags,
            )),
        })
    }

    /// Build a recommender that can serve as the continuous part of a naive
    /// hybrid recommender.
    pub fn build_bayesian(&self) -> MfResult<Box<dyn BayesianRecommender>> {
        match self {
            Self::SequentialGreedy(config) => Ok(Box::new(config.build()?)),
            other => Err(config_error!(
                "continuous recommender must be Bayesian, got {}",
                other.type_name()
            )),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SequentialGreedy(_) => "sequential_greedy",
            Self::Random { .. } => "random",
            Self::FarthestPoint { .. } => "farthest_point",
            Self::NaiveHybrid { .. } => "naive_hybrid",
        }
    }
}

/// Everything needed to start a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parameters: Vec<ParameterDef>,
    #[serde(default)]
    pub recommender: RecommenderConfig,
    #[serde(default)]
    pub direction: ObjectiveDirection,
    /// Seed for reproducible recommendations. Unseeded runs draw from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl CampaignConfig {
    pub fn new(name: impl Into<String>, parameters: Vec<ParameterDef>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            parameters,
            recommender: RecommenderConfig::default(),
            direction: ObjectiveDirection::Maximize,
            seed: None,
        }
    }

    pub fn with_recommender(mut self, recommender: RecommenderConfig) -> Self {
        self.recommender = recommender;
        self
    }

    pub fn with_direction(mut self, direction: ObjectiveDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn from_json_str(json: &str) -> MfResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> MfResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn build(&self) -> MfResult<Campaign> {
        let space = SearchSpace::from_parameters(self.parameters.clone())?;
        let recommender = self.recommender.build()?;
        Ok(Campaign::new(self.name.clone(), space, recommender).with_direction(self.direction))
    }

    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}
