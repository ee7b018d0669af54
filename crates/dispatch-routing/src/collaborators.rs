//! In-process collaborator implementations.
//!
//! Hosts normally supply their own registry, outcome store and planner;
//! these defaults make the engine usable on its own and in tests.

use crate::analyzer::Rulebook;
use async_trait::async_trait;
use dashmap::DashMap;
use dispatch_core::{
    CapabilityRegistry, EscalationPackage, HandlerCapability, OutcomeStore, Result,
    StrategicPlanner, TaskSignature,
};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Fixed handler catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticCapabilityRegistry {
    handlers: Vec<HandlerCapability>,
}

impl StaticCapabilityRegistry {
    /// Creates a registry serving `handlers`.
    pub fn new(handlers: Vec<HandlerCapability>) -> Self {
        Self { handlers }
    }

    /// Serves the handler catalog shipped with a rule set.
    pub fn from_rules(rules: &Rulebook) -> Self {
        Self::new(rules.handlers().to_vec())
    }
}

#[async_trait]
impl CapabilityRegistry for StaticCapabilityRegistry {
    async fn candidates(&self) -> Result<Vec<HandlerCapability>> {
        Ok(self.handlers.clone())
    }
}

/// Success rates kept in memory as exponential moving averages.
#[derive(Debug)]
pub struct InMemoryOutcomeStore {
    rates: DashMap<TaskSignature, f64>,
    retain: f64,
}

impl Default for InMemoryOutcomeStore {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl InMemoryOutcomeStore {
    /// Creates a store keeping `retain` of the old rate on each update.
    pub fn new(retain: f64) -> Self {
        Self {
            rates: DashMap::new(),
            retain: retain.clamp(0.0, 1.0),
        }
    }

    /// Sets a rate directly.
    pub fn seed(&self, signature: TaskSignature, rate: f64) {
        self.rates.insert(signature, rate.clamp(0.0, 1.0));
    }

    /// Signatures with a recorded rate.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Whether no rate is recorded.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

#[async_trait]
impl OutcomeStore for InMemoryOutcomeStore {
    async fn success_rate(&self, signature: TaskSignature) -> Result<Option<f64>> {
        Ok(self.rates.get(&signature).map(|rate| *rate))
    }

    async fn record(&self, signature: TaskSignature, observation: f64) -> Result<()> {
        let observation = observation.clamp(0.0, 1.0);
        let retain = self.retain;
        self.rates
            .entry(signature)
            .and_modify(|rate| *rate = retain.mul_add(*rate, (1.0 - retain) * observation))
            .or_insert(observation);
        Ok(())
    }
}

/// Planner that logs escalation packages and counts them.
#[derive(Debug)]
pub struct LoggingPlanner {
    id: String,
    submitted: AtomicU64,
}

impl Default for LoggingPlanner {
    fn default() -> Self {
        Self::new("strategic-planner")
    }
}

impl LoggingPlanner {
    /// Creates a planner answering to `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            submitted: AtomicU64::new(0),
        }
    }

    /// Packages received so far.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl StrategicPlanner for LoggingPlanner {
    fn id(&self) -> &str {
        &self.id
    }

    async fn submit(&self, package: EscalationPackage) -> Result<()> {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        info!(
            routing_id = %package.routing_id,
            domains = package.domains.len(),
            triggers = package.triggers.len(),
            "escalation package received: {}",
            package.recommended_approach
        );
        Ok(())
    }
}
