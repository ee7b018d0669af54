use async_trait::async_trait;

use crate::{EscalationPackage, HandlerCapability, Result, TaskSignature};

/// Source of candidate handlers and their capability descriptions.
#[async_trait]
pub trait CapabilityRegistry: Send + Sync {
    /// Returns every handler currently eligible for dispatch.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be reached.
    async fn candidates(&self) -> Result<Vec<HandlerCapability>>;
}

/// Prior success rates keyed by task signature.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    /// Returns the recorded success rate for a signature, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    async fn success_rate(&self, signature: TaskSignature) -> Result<Option<f64>>;

    /// Folds a new observation in `[0, 1]` into the signature's success rate.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be updated.
    async fn record(&self, signature: TaskSignature, observation: f64) -> Result<()>;
}

/// Receiver of escalated tasks.
#[async_trait]
pub trait StrategicPlanner: Send + Sync {
    /// Identifier used as the decision target for escalations.
    fn id(&self) -> &str;

    /// Accepts an escalation package for planning.
    ///
    /// # Errors
    ///
    /// Returns an error if the planner rejects or cannot receive the package.
    async fn submit(&self, package: EscalationPackage) -> Result<()>;
}
