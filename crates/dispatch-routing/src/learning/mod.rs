//! Adaptive learning from routing outcomes.

mod learner;
mod model;
mod weights;

pub use learner::{AdaptiveLearner, LearnerHandle, LearnerStats, PendingRouting};
pub use model::{
    FEATURE_COUNT, FEATURE_NAMES, FeatureVector, LinearModelConfig, LinearScoringModel,
    ScoringModel, TrainingSample,
};
pub use weights::WeightStore;
