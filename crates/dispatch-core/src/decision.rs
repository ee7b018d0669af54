//! Routing decisions and the context package handed to the strategic planner.

use crate::types::{ComplexityLabel, ComplexityScore, DomainMatch};
use chrono::{DateTime, Utc};
use core::fmt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// What the router decided to do with a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoutingAction {
    /// Hand the task to a single handler (or back to the caller when no target)
    Direct,
    /// Coordinate several handlers through an orchestration tier
    Orchestrate,
    /// Hand the task to the external strategic planner
    Escalate,
    /// Routing could not run at all; manual intervention required
    Error,
}

impl fmt::Display for RoutingAction {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Direct => "direct",
            Self::Orchestrate => "orchestrate",
            Self::Escalate => "escalate",
            Self::Error => "error",
        };
        write!(formatter, "{name}")
    }
}

/// Scale of multi-handler coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OrchestrationTier {
    /// One domain, light coordination
    Single,
    /// Two or three domains
    Standard,
    /// Four or more domains, or very complex work
    Advanced,
}

impl fmt::Display for OrchestrationTier {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Single => "single",
            Self::Standard => "standard",
            Self::Advanced => "advanced",
        };
        write!(formatter, "{name}")
    }
}

/// Why a degraded-mode decision was returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// The circuit breaker rejected the request
    CircuitOpen,
    /// The pipeline missed its soft deadline
    BudgetExceeded,
    /// The pipeline returned an error
    PipelineFailure,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CircuitOpen => "circuit_open",
            Self::BudgetExceeded => "budget_exceeded",
            Self::PipelineFailure => "pipeline_failure",
        };
        write!(formatter, "{name}")
    }
}

/// Which cache tiers served this decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(
    clippy::struct_excessive_bools,
    reason = "One flag per cache tier"
)]
pub struct CacheHits {
    /// Pattern-match tier hit
    pub pattern: bool,
    /// Domain-detection tier hit
    pub domain: bool,
    /// Complexity tier hit
    pub complexity: bool,
}

impl CacheHits {
    /// True when any tier served a stored value.
    pub fn any(self) -> bool {
        self.pattern || self.domain || self.complexity
    }
}

/// The four weighted inputs of the confidence score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceComponents {
    /// Best similarity between the task and a candidate capability
    pub pattern_match: f64,
    /// Prior success rate for the task signature
    pub historical_success: f64,
    /// How much required information the description carries
    pub context_completeness: f64,
    /// Headroom against the estimated cost
    pub resource_availability: f64,
}

impl ConfidenceComponents {
    /// Components as an array, in declaration order.
    pub fn as_array(self) -> [f64; 4] {
        [
            self.pattern_match,
            self.historical_success,
            self.context_completeness,
            self.resource_availability,
        ]
    }
}

/// Confidence score with its breakdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    /// Weighted total in `[0, 1]`
    pub total: f64,
    /// Individual components
    pub components: ConfidenceComponents,
    /// Population variance across components
    pub variance: f64,
    /// Candidate handler with the best pattern match
    pub best_candidate: Option<String>,
    /// Estimated token cost of the task
    pub estimated_tokens: u64,
}

/// A reason recorded for escalation review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTrigger {
    /// Confidence below the low-confidence trigger
    LowConfidence,
    /// Complexity above the high-complexity trigger
    HighComplexity,
    /// More domains than the multi-domain trigger
    MultiDomain,
    /// Explicit enterprise-scope wording
    EnterpriseScope,
    /// Architectural decisions are required
    ArchitecturalDecisions,
    /// The requirements read as ambiguous
    AmbiguousRequirements,
}

impl fmt::Display for EscalationTrigger {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LowConfidence => "low_confidence",
            Self::HighComplexity => "high_complexity",
            Self::MultiDomain => "multi_domain",
            Self::EnterpriseScope => "enterprise_scope",
            Self::ArchitecturalDecisions => "architectural_decisions",
            Self::AmbiguousRequirements => "ambiguous_requirements",
        };
        write!(formatter, "{name}")
    }
}

/// Strategic needs the planner should account for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(
    clippy::struct_excessive_bools,
    reason = "Independent requirement flags"
)]
pub struct StrategicRequirements {
    /// Organization-wide scope
    pub enterprise_scope: bool,
    /// System design decisions involved
    pub architectural_decisions: bool,
    /// Several domains must be coordinated
    pub multi_domain_coordination: bool,
    /// Work is in the complex band
    pub high_complexity: bool,
}

/// Task analysis section of the escalation package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAnalysisSummary {
    /// Complexity value
    pub complexity: f64,
    /// Complexity label
    pub label: ComplexityLabel,
    /// Estimated token cost
    pub estimated_tokens: u64,
    /// Rough effort estimate in minutes
    pub estimated_minutes: u32,
}

/// Everything the strategic planner needs to pick up an escalated task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationPackage {
    /// Decision this package belongs to
    pub routing_id: Uuid,
    /// Description as submitted
    pub original_request: String,
    /// Complexity and cost estimates
    pub task_analysis: TaskAnalysisSummary,
    /// Detected domains, strongest first
    pub domains: Vec<DomainMatch>,
    /// Strongest domain, if any
    pub primary_domain: Option<String>,
    /// Confidence breakdown
    pub confidence: ConfidenceBreakdown,
    /// Triggers that fired
    pub triggers: Vec<EscalationTrigger>,
    /// Weighted escalation score before hysteresis
    pub raw_escalation_score: f64,
    /// Escalation score the decision used
    pub escalation_score: f64,
    /// Strategic requirement flags
    pub requirements: StrategicRequirements,
    /// Caller context hints
    pub context: BTreeMap<String, String>,
    /// Suggested approach for the planner
    pub recommended_approach: String,
    /// When the package was assembled
    pub created_at: DateTime<Utc>,
}

/// Immutable result of routing one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Identifier referenced by outcome records
    pub routing_id: Uuid,
    /// Chosen action
    pub action: RoutingAction,
    /// Handler id, orchestration tier id or planner id
    pub target: Option<String>,
    /// Orchestration tier, set for `Orchestrate`
    pub tier: Option<OrchestrationTier>,
    /// Decision confidence in `[0, 1]`
    pub confidence: f64,
    /// Human-readable explanation
    pub reasoning: String,
    /// Wall-clock time spent deciding
    pub decision_time_ms: f64,
    /// Detected domains
    pub domains: Vec<DomainMatch>,
    /// Classifier output, absent for degraded decisions
    pub complexity: Option<ComplexityScore>,
    /// Escalation score the decision used
    pub escalation_score: f64,
    /// Package for the planner, set for `Escalate`
    pub escalation_package: Option<EscalationPackage>,
    /// Cache tiers that served this decision
    pub cache_hits: CacheHits,
    /// Set on degraded-mode decisions
    pub fallback: bool,
    /// Why the fallback was taken
    pub fallback_reason: Option<FallbackReason>,
}

impl RoutingDecision {
    /// Number of detected domains.
    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    /// Whether a domain with the given id was detected.
    pub fn has_domain(&self, domain_id: &str) -> bool {
        self.domains.iter().any(|domain| domain.domain_id == domain_id)
    }
}
