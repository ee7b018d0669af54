//! Task routing engine.
//!
//! Classifies a free-form task description, detects the functional domains
//! it touches, scores how confident the router is, and decides whether to
//! dispatch it to one handler, orchestrate several, or escalate it to a
//! strategic planner. Outcomes reported back tune the weights the next
//! decisions use.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::float_cmp,
        reason = "Allow for tests"
    )
)]

pub mod analyzer;
pub mod cache;
pub mod circuit;
pub mod collaborators;
pub mod confidence;
pub mod domain;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod learning;
pub mod metrics;
pub mod router;

pub use analyzer::{HierarchicalClassifier, Rulebook, TaskText};
pub use cache::{RoutingCache, RoutingCacheStats, TtlCache};
pub use circuit::{
    CircuitBreaker, CircuitBreakerError, CircuitPhase, CircuitSnapshot, Permit, PermitKind,
};
pub use collaborators::{InMemoryOutcomeStore, LoggingPlanner, StaticCapabilityRegistry};
pub use confidence::{CandidateSimilarity, ConfidenceEngine, ConfidenceScore};
pub use domain::{DomainDetector, DomainProcessor, DomainReport, DomainScore, RuleDomainProcessor};
pub use engine::{EngineStats, RoutingEngine, RoutingEngineBuilder};
pub use error::{Result, RoutingError};
pub use escalation::{EscalationEngine, EscalationInput, EscalationOutcome};
pub use learning::{
    AdaptiveLearner, FeatureVector, LearnerStats, LinearScoringModel, ScoringModel, WeightStore,
};
pub use metrics::{HealthStatus, MonitorReport, PerformanceMonitor};
pub use router::OrchestrationRouter;
