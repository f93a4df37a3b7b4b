//! Recommendation policy flags and their reconciliation between an
//! orchestrating recommender and a delegate.

use serde::{Deserialize, Serialize};
use std::fmt;

use mf_types::CandidatePolicy;

/// Policy flags every recommender carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationFlags {
    /// May a configuration be recommended again in a later call.
    pub allow_repeated_recommendations: bool,
    /// May a configuration that is already in the measurement history be
    /// recommended.
    pub allow_recommending_already_measured: bool,
}

impl Default for RecommendationFlags {
    fn default() -> Self {
        Self {
            allow_repeated_recommendations: false,
            allow_recommending_already_measured: true,
        }
    }
}

impl RecommendationFlags {
    pub fn new(allow_repeated: bool, allow_already_measured: bool) -> Self {
        Self {
            allow_repeated_recommendations: allow_repeated,
            allow_recommending_already_measured: allow_already_measured,
        }
    }

    /// Candidate filter implied by the flags.
    pub fn candidate_policy(&self) -> CandidatePolicy {
        CandidatePolicy::new(
            self.allow_repeated_recommendations,
            self.allow_recommending_already_measured,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagName {
    AllowRepeatedRecommendations,
    AllowRecommendingAlreadyMeasured,
}

impl fmt::Display for FlagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AllowRepeatedRecommendations => "allow_repeated_recommendations",
            Self::AllowRecommendingAlreadyMeasured => "allow_recommending_already_measured",
        })
    }
}

/// A flag on which the delegate disagreed and was overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagConflict {
    pub flag: FlagName,
    /// Value kept (the orchestrator's).
    pub kept: bool,
    /// Value the delegate had declared.
    pub ignored: bool,
}

impl fmt::Display for FlagConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "The value of '{}' ({}) differs from what is specified in the discrete recommender ({}). \
             The value of the discrete recommender will be ignored.",
            self.flag, self.kept, self.ignored
        )
    }
}

/// Outcome of [`synchronize_flags`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSync {
    /// Flags the delegate must carry.
    pub flags: RecommendationFlags,
    pub conflicts: Vec<FlagConflict>,
}

impl FlagSync {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Reconcile `delegate` with `authoritative`. The authoritative flags always
/// win; every disagreement is reported.
pub fn synchronize_flags(
    authoritative: RecommendationFlags,
    delegate: RecommendationFlags,
) -> FlagSync {
    let mut conflicts = Vec::new();
    if authoritative.allow_recommending_already_measured
        != delegate.allow_recommending_already_measured
    {
        conflicts.push(FlagConflict {
            flag: FlagName::AllowRecommendingAlreadyMeasured,
            kept: authoritative.allow_recommending_already_measured,
            ignored: delegate.allow_recommending_already_measured,
        });
    }
    if authoritative.allow_repeated_recommendations != delegate.allow_repeated_recommendations {
        conflicts.push(FlagConflict {
            flag: FlagName::AllowRepeatedRecommendations,
            kept: authoritative.allow_repeated_recommendations,
            ignored: delegate.allow_repeated_recommendations,
        });
    }
    FlagSync {
        flags: authoritative,
        conflicts,
    }
}
