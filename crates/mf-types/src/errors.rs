use thiserror::Error;

use crate::space::SpaceKind;

/// Main error type for the Mixfold system
#[derive(Error, Debug)]
pub enum MfError {
    #[error("Search space error: {0}")]
    SearchSpace(#[from] SearchSpaceError),

    #[error("Recommendation error: {0}")]
    Recommend(#[from] RecommendError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Search-space related errors
#[derive(Error, Debug)]
pub enum SearchSpaceError {
    #[error("Search space contains no parameters")]
    Empty,

    #[error(
        "Recommender {recommender} supports {compatibility} search spaces, got a {kind} space"
    )]
    Incompatible {
        recommender: String,
        compatibility: SpaceKind,
        kind: SpaceKind,
    },

    #[error("Unknown parameter: {name}")]
    UnknownParameter { name: String },

    #[error("Invalid value for parameter {name}: {value}")]
    InvalidValue { name: String, value: String },

    #[error("Invalid parameter definition for {name}: {message}")]
    InvalidParameter { name: String, message: String },

    #[error("Duplicate parameter name: {name}")]
    DuplicateParameter { name: String },

    #[error("Dimension mismatch: expected {expected} columns, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Candidate id {id} out of range for a subspace of {len} rows")]
    CandidateOutOfRange { id: usize, len: usize },
}

/// Recommendation-related errors
#[derive(Error, Debug)]
pub enum RecommendError {
    #[error(
        "Insufficient candidates: requested {requested} recommendations, only {available} viable configurations left"
    )]
    InsufficientCandidates { requested: usize, available: usize },

    #[error(
        "Recommender {recommender} needs a Monte Carlo acquisition function for batch operations, but {acquisition} is analytical"
    )]
    AnalyticalAcquisitionUnsupported {
        recommender: String,
        acquisition: String,
    },

    #[error("Nothing to simulate: the search space has no testable configurations")]
    NothingToSimulate,

    #[error("Not implemented: {message}")]
    NotImplemented { message: String },

    #[error("Invalid batch size {batch_size}: at least one recommendation is required")]
    InvalidBatchSize { batch_size: usize },
}

/// Result type alias for Mixfold operations
pub type MfResult<T> = Result<T, MfError>;

impl MfError {
    /// True when the error signals that the discrete candidate pool ran dry.
    pub fn is_insufficient_candidates(&self) -> bool {
        matches!(
            self,
            MfError::Recommend(RecommendError::InsufficientCandidates { .. })
        )
    }
}

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::MfError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::MfError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::MfError::Config(format!($($arg)*))
    };
}
