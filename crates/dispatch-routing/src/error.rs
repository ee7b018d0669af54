//! Routing error taxonomy.

use dispatch_core::Error as CoreError;
use std::result::Result as StdResult;
use thiserror::Error;

/// Result type for routing operations.
pub type Result<T> = StdResult<T, RoutingError>;

/// Failures raised inside the routing pipeline.
///
/// Most of these never reach a caller of [`crate::RoutingEngine::route`]:
/// they are absorbed and turned into degraded or fallback decisions.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Error from the core library
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// Input could not be classified
    #[error("Classification failed: {0}")]
    Classification(String),

    /// A domain processor failed or ran over budget
    #[error("Domain processor '{domain}' failed: {reason}")]
    DomainProcessorFailure {
        /// Domain id of the processor
        domain: String,
        /// What went wrong
        reason: String,
    },

    /// A cache tier lock could not be taken in time
    #[error("Cache tier '{tier}' unavailable")]
    CacheUnavailable {
        /// Tier name
        tier: &'static str,
    },

    /// The circuit breaker rejected the request
    #[error("Circuit breaker is open")]
    CircuitOpen,

    /// Retraining was refused; the previous model stays active
    #[error("Learner retrain failed: {0}")]
    LearnerRetrainFailure(String),

    /// The soft deadline elapsed
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// No capacity left to accept the request
    #[error("Resources exhausted: {0}")]
    ResourceExhausted(String),

    /// A collaborator could not be reached
    #[error("Collaborator unavailable: {0}")]
    Collaborator(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl RoutingError {
    /// Errors the engine turns into a degraded result instead of a failure.
    #[must_use]
    pub fn is_absorbed(&self) -> bool {
        matches!(
            self,
            Self::Classification(_)
                | Self::DomainProcessorFailure { .. }
                | Self::CacheUnavailable { .. }
                | Self::LearnerRetrainFailure(_)
        )
    }

    /// Errors worth retrying on a later request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::CacheUnavailable { .. } | Self::Collaborator(_) => true,
            Self::Core(core) => core.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorbed_errors() {
        assert!(RoutingError::CacheUnavailable { tier: "pattern" }.is_absorbed());
        assert!(
            RoutingError::DomainProcessorFailure {
                domain: "security".to_owned(),
                reason: "timed out".to_owned(),
            }
            .is_absorbed()
        );
        assert!(!RoutingError::CircuitOpen.is_absorbed());
        assert!(!RoutingError::ResourceExhausted("no permits".to_owned()).is_absorbed());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(RoutingError::Timeout(100).is_retryable());
        assert!(RoutingError::Core(CoreError::Collaborator("down".to_owned())).is_retryable());
        assert!(!RoutingError::CircuitOpen.is_retryable());
    }

    #[test]
    fn test_display_names_domain() {
        let error = RoutingError::DomainProcessorFailure {
            domain: "frontend".to_owned(),
            reason: "panicked".to_owned(),
        };
        assert_eq!(error.to_string(), "Domain processor 'frontend' failed: panicked");
    }
}
