//! Core types and traits for the dispatch task router.
//!
//! This crate provides the data model shared by every routing stage, the
//! configuration and rule-table formats, and the contracts of the external
//! collaborators the router consults.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        reason = "Allow for tests"
    )
)]

/// Configuration sections and file helpers.
pub mod config;
/// Routing decisions and escalation packages.
pub mod decision;
/// Error types and result definitions.
pub mod error;
/// Outcome feedback and learned pattern weights.
pub mod outcome;
/// Versioned, data-driven rule tables.
pub mod rules;
/// Collaborator contracts.
pub mod traits;
/// Request and analysis types.
pub mod types;

pub use config::{
    CacheConfig, CacheTierConfig, CircuitConfig, ClassifierConfig, ConfidenceConfig,
    DOMAIN_CONFIDENCE_CEILING, DOMAIN_CONFIDENCE_FLOOR,
    ConfidenceWeights, DomainConfig, DomainWeights, EngineConfig, EscalationConfig,
    EscalationWeights, FactorWeights, LearnerConfig, MonitorConfig, RoutingConfig, TierConfig,
};
pub use decision::{
    CacheHits, ConfidenceBreakdown, ConfidenceComponents, EscalationPackage, EscalationTrigger,
    FallbackReason, OrchestrationTier, RoutingAction, RoutingDecision, StrategicRequirements,
    TaskAnalysisSummary,
};
pub use error::{Error, Result};
pub use outcome::{MAX_PATTERN_WEIGHT, MIN_PATTERN_WEIGHT, OutcomeRecord, PatternWeight, WeightTable};
pub use rules::{ClassifierRules, DomainRule, EscalationRules, HandlerRule, RuleSet};
pub use traits::{CapabilityRegistry, OutcomeStore, StrategicPlanner};
pub use types::{
    ClassificationLevel, ComplexityLabel, ComplexityScore, DomainMatch, HandlerCapability,
    TaskRequest, TaskSignature,
};
