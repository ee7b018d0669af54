//! Success prediction behind a swappable interface.

use crate::error::{Result, RoutingError};
use dispatch_core::{ConfidenceComponents, LearnerConfig};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Number of features fed to a scoring model.
pub const FEATURE_COUNT: usize = 8;

/// Names of the features, in vector order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "complexity",
    "domain_count",
    "pattern_match",
    "historical_success",
    "context_completeness",
    "resource_availability",
    "cache_hit",
    "description_length",
];

const DOMAIN_COUNT_SCALE: f64 = 5.0;
const LENGTH_SCALE: f64 = 50.0;

/// Model input describing one routed task, every feature in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    /// Builds a vector from pipeline outputs.
    pub fn new(
        complexity: f64,
        domain_count: usize,
        components: ConfidenceComponents,
        cache_hit: bool,
        token_count: usize,
    ) -> Self {
        Self([
            complexity.clamp(0.0, 1.0),
            (domain_count as f64 / DOMAIN_COUNT_SCALE).min(1.0),
            components.pattern_match,
            components.historical_success,
            components.context_completeness,
            components.resource_availability,
            if cache_hit { 1.0 } else { 0.0 },
            (token_count as f64 / LENGTH_SCALE).min(1.0),
        ])
    }

    /// Feature values.
    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }
}

/// Features of a routed task with its observed result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    /// Inputs
    pub features: FeatureVector,
    /// `1.0` on success, `0.0` on failure
    pub label: f64,
}

/// Predicts the probability that a routing succeeds.
pub trait ScoringModel: Send + Sync {
    /// Short model name for logs and stats.
    fn name(&self) -> &str;

    /// Success probability in `[0, 1]`.
    fn predict(&self, features: &FeatureVector) -> f64;

    /// Refits the model. On error the previous model stays in effect.
    ///
    /// # Errors
    /// Returns `LearnerRetrainFailure` when the samples are insufficient or
    /// training diverges
    fn train(&self, samples: &[TrainingSample]) -> Result<()>;
}

/// Hyperparameters of [`LinearScoringModel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearModelConfig {
    /// SGD step size
    pub learning_rate: f64,
    /// Passes over the samples
    pub epochs: usize,
    /// L2 weight decay
    pub l2_decay: f64,
    /// Samples required to train
    pub min_samples: usize,
}

impl Default for LinearModelConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            epochs: 25,
            l2_decay: 0.001,
            min_samples: 10,
        }
    }
}

impl From<&LearnerConfig> for LinearModelConfig {
    fn from(config: &LearnerConfig) -> Self {
        Self {
            learning_rate: config.learning_rate,
            epochs: config.epochs,
            l2_decay: config.l2_decay,
            min_samples: config.min_training_samples,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct LinearWeights {
    bias: f64,
    weights: [f64; FEATURE_COUNT],
}

impl LinearWeights {
    fn initial() -> Self {
        Self {
            bias: 0.5,
            weights: [-1.5, -0.5, 1.0, 1.0, 0.5, 0.5, 0.0, -0.3],
        }
    }

    fn predict(&self, features: &FeatureVector) -> f64 {
        let logit = self
            .weights
            .iter()
            .zip(features.values())
            .fold(self.bias, |sum, (weight, value)| weight.mul_add(*value, sum));
        sigmoid(logit)
    }

    fn is_finite(&self) -> bool {
        self.bias.is_finite() && self.weights.iter().all(|weight| weight.is_finite())
    }
}

/// Logistic regression trained by stochastic gradient descent.
pub struct LinearScoringModel {
    config: LinearModelConfig,
    state: RwLock<LinearWeights>,
}

impl Default for LinearScoringModel {
    fn default() -> Self {
        Self::new(LinearModelConfig::default())
    }
}

impl LinearScoringModel {
    /// Creates a model with the hand-tuned starting weights.
    pub fn new(config: LinearModelConfig) -> Self {
        Self {
            config,
            state: RwLock::new(LinearWeights::initial()),
        }
    }

    /// Current bias and feature weights.
    pub fn coefficients(&self) -> (f64, [f64; FEATURE_COUNT]) {
        let state = self.state.read();
        (state.bias, state.weights)
    }
}

impl ScoringModel for LinearScoringModel {
    fn name(&self) -> &str {
        "linear"
    }

    fn predict(&self, features: &FeatureVector) -> f64 {
        self.state.read().predict(features)
    }

    fn train(&self, samples: &[TrainingSample]) -> Result<()> {
        if samples.len() < self.config.min_samples {
            return Err(RoutingError::LearnerRetrainFailure(format!(
                "{} samples, need at least {}",
                samples.len(),
                self.config.min_samples
            )));
        }

        let mut candidate = *self.state.read();
        let rate = self.config.learning_rate;
        let decay = self.config.l2_decay;
        for _ in 0..self.config.epochs {
            for sample in samples {
                let error = candidate.predict(&sample.features) - sample.label;
                candidate.bias -= rate * error;
                for (weight, value) in candidate.weights.iter_mut().zip(sample.features.values()) {
                    *weight -= rate * error.mul_add(*value, decay * *weight);
                }
            }
        }

        if !candidate.is_finite() {
            return Err(RoutingError::LearnerRetrainFailure(
                "training produced non-finite weights".to_owned(),
            ));
        }
        *self.state.write() = candidate;
        Ok(())
    }
}

fn sigmoid(logit: f64) -> f64 {
    1.0 / (1.0 + (-logit).exp())
}
