//! Escalation decisions.
//!
//! A weighted trigger score picks between direct dispatch, orchestration and
//! escalation to the strategic planner. Structurally similar tasks that
//! escalated recently have their score lowered by a hysteresis margin so
//! repeated near-identical requests do not flip between outcomes.

use crate::analyzer::{Rulebook, TaskText, hash_parts};
use crate::domain::DomainReport;
use crate::router::OrchestrationRouter;
use chrono::Utc;
use dashmap::DashMap;
use dispatch_core::{
    ComplexityLabel, ComplexityScore, ConfidenceBreakdown, EscalationConfig, EscalationPackage,
    EscalationTrigger, HandlerCapability, OrchestrationTier, RoutingAction,
    StrategicRequirements, TaskAnalysisSummary, TaskRequest,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

const HYSTERESIS_PRUNE_AT: usize = 4096;
const AMBIGUOUS_REQUIREMENT_MATCHES: usize = 2;
const MINUTES_PER_COMPLEXITY: f64 = 30.0;

/// Everything the escalation decision looks at.
#[derive(Debug, Clone, Copy)]
pub struct EscalationInput<'input> {
    /// Normalized description
    pub text: &'input TaskText,
    /// Classifier output
    pub complexity: &'input ComplexityScore,
    /// Detected domains
    pub domains: &'input DomainReport,
    /// Confidence breakdown
    pub confidence: &'input ConfidenceBreakdown,
    /// Handlers available for direct dispatch
    pub candidates: &'input [HandlerCapability],
    /// Predicted failure probability in `[0, 1]`
    pub failure_risk: f64,
}

/// Result of the escalation decision.
#[derive(Debug, Clone, PartialEq)]
pub struct EscalationOutcome {
    /// Chosen action
    pub action: RoutingAction,
    /// Handler, tier or planner id
    pub target: Option<String>,
    /// Orchestration tier when orchestrating
    pub tier: Option<OrchestrationTier>,
    /// Weighted score before hysteresis
    pub raw_score: f64,
    /// Score the decision used
    pub score: f64,
    /// Whether the hysteresis margin was applied
    pub hysteresis_applied: bool,
    /// Triggers that fired
    pub triggers: Vec<EscalationTrigger>,
    /// Strategic requirement flags
    pub requirements: StrategicRequirements,
    /// Enterprise indicators present in the description
    pub enterprise_indicators: Vec<String>,
    /// Human-readable explanation
    pub reasoning: String,
}

/// Chooses between direct dispatch, orchestration and escalation.
pub struct EscalationEngine {
    config: EscalationConfig,
    rules: Arc<Rulebook>,
    router: OrchestrationRouter,
    planner_id: String,
    recent: DashMap<u64, Instant>,
}

impl EscalationEngine {
    /// Creates an engine that escalates to `planner_id`.
    pub fn new(
        config: EscalationConfig,
        rules: Arc<Rulebook>,
        router: OrchestrationRouter,
        planner_id: impl Into<String>,
    ) -> Self {
        Self {
            config,
            rules,
            router,
            planner_id: planner_id.into(),
            recent: DashMap::new(),
        }
    }

    /// Decides what to do with a classified task.
    pub fn decide(&self, input: &EscalationInput<'_>) -> EscalationOutcome {
        let ambiguity_matches = self.rules.ambiguity_count(input.text);
        let enterprise_indicators = self.rules.enterprise_hits(input.text);
        let architectural = !self.rules.architectural_hits(input.text).is_empty();
        let domain_count = input.domains.domain_count();
        let confidence = input.confidence.total;

        let raw_score = self.raw_score(input, ambiguity_matches, !enterprise_indicators.is_empty());
        let signature = structural_signature(input.domains, input.complexity.label);
        let hysteresis_applied = self.recently_escalated(signature);
        let score = if hysteresis_applied {
            (raw_score - self.config.hysteresis_margin).max(0.0)
        } else {
            raw_score
        };

        let triggers = self.triggers(
            input,
            !enterprise_indicators.is_empty(),
            architectural,
            ambiguity_matches,
        );
        let requirements = StrategicRequirements {
            enterprise_scope: !enterprise_indicators.is_empty(),
            architectural_decisions: architectural,
            multi_domain_coordination: domain_count >= self.config.orchestrate_min_domains,
            high_complexity: input.complexity.label == ComplexityLabel::Complex,
        };

        let mut outcome = EscalationOutcome {
            action: RoutingAction::Direct,
            target: None,
            tier: None,
            raw_score,
            score,
            hysteresis_applied,
            triggers,
            requirements,
            enterprise_indicators,
            reasoning: String::new(),
        };

        if !outcome.enterprise_indicators.is_empty() || score > self.config.threshold {
            outcome.action = RoutingAction::Escalate;
            outcome.target = Some(self.planner_id.clone());
            outcome.reasoning = self.escalation_reason(&outcome);
            self.recent.insert(signature, Instant::now());
            self.prune_recent();
            info!(
                score = %format_args!("{score:.3}"),
                triggers = outcome.triggers.len(),
                "escalating to strategic planner"
            );
        } else if domain_count >= self.config.orchestrate_min_domains
            && confidence > self.config.orchestrate_min_confidence
        {
            self.orchestrate(&mut outcome, input);
            outcome.reasoning = format!(
                "{domain_count} domains with confidence {confidence:.2} need coordination at the {} tier",
                outcome.tier.map_or_else(String::new, |tier| tier.to_string())
            );
        } else {
            self.direct_or_single(&mut outcome, input);
        }

        debug!(
            action = %outcome.action,
            raw = %format_args!("{raw_score:.3}"),
            hysteresis = hysteresis_applied,
            "escalation decided"
        );
        outcome
    }

    /// Weighted escalation score before hysteresis.
    fn raw_score(&self, input: &EscalationInput<'_>, ambiguity_matches: usize, enterprise: bool) -> f64 {
        let weights = self.config.weights;
        let deficit = 1.0 - input.confidence.total.clamp(0.0, 1.0);
        let pressure = (input.domains.domain_count() as f64
            / self.config.domain_pressure_saturation.max(1.0))
        .min(1.0);
        let ambiguity =
            (ambiguity_matches as f64 / self.config.ambiguity_saturation.max(1.0)).min(1.0);
        let enterprise = if enterprise { 1.0 } else { 0.0 };

        (weights.confidence_deficit * deficit
            + weights.complexity * input.complexity.value.clamp(0.0, 1.0)
            + weights.domain_pressure * pressure
            + weights.ambiguity * ambiguity
            + weights.failure_risk * input.failure_risk.clamp(0.0, 1.0)
            + weights.enterprise * enterprise)
            .clamp(0.0, 1.0)
    }

    fn triggers(
        &self,
        input: &EscalationInput<'_>,
        enterprise: bool,
        architectural: bool,
        ambiguity_matches: usize,
    ) -> Vec<EscalationTrigger> {
        let checks = [
            (
                input.confidence.total < self.config.low_confidence_trigger,
                EscalationTrigger::LowConfidence,
            ),
            (
                input.complexity.value > self.config.high_complexity_trigger,
                EscalationTrigger::HighComplexity,
            ),
            (
                input.domains.domain_count() > self.config.multi_domain_trigger,
                EscalationTrigger::MultiDomain,
            ),
            (enterprise, EscalationTrigger::EnterpriseScope),
            (architectural, EscalationTrigger::ArchitecturalDecisions),
            (
                ambiguity_matches > AMBIGUOUS_REQUIREMENT_MATCHES,
                EscalationTrigger::AmbiguousRequirements,
            ),
        ];
        checks
            .into_iter()
            .filter_map(|(fired, trigger)| fired.then_some(trigger))
            .collect()
    }

    fn orchestrate(&self, outcome: &mut EscalationOutcome, input: &EscalationInput<'_>) {
        let (tier, target) = self
            .router
            .route(input.domains.domain_count(), input.complexity.value);
        outcome.action = RoutingAction::Orchestrate;
        outcome.tier = Some(tier);
        outcome.target = Some(target);
    }

    fn direct_or_single(&self, outcome: &mut EscalationOutcome, input: &EscalationInput<'_>) {
        let Some(primary) = input.domains.primary() else {
            outcome.reasoning = "no domain matched; dispatch directly".to_owned();
            return;
        };

        let domain_count = input.domains.domain_count();
        if domain_count >= self.config.orchestrate_min_domains
            || primary.confidence >= self.config.direct_dispatch_threshold
        {
            let handler = primary
                .preferred_handlers
                .iter()
                .find(|handler| input.candidates.iter().any(|candidate| &candidate.id == *handler))
                .cloned()
                .or_else(|| input.confidence.best_candidate.clone());
            outcome.reasoning = match &handler {
                Some(handler) => format!(
                    "{} domain handled by {handler} (domain confidence {:.2})",
                    primary.domain_id, primary.confidence
                ),
                None => format!(
                    "{} domain has no available handler; dispatch directly",
                    primary.domain_id
                ),
            };
            outcome.target = handler;
        } else {
            self.orchestrate(outcome, input);
            outcome.reasoning = format!(
                "single {} domain at moderate confidence {:.2}; light coordination",
                primary.domain_id, primary.confidence
            );
        }
    }

    fn escalation_reason(&self, outcome: &EscalationOutcome) -> String {
        if let Some(indicator) = outcome.enterprise_indicators.first() {
            format!("enterprise-scope indicator '{indicator}' requires strategic planning")
        } else {
            format!(
                "escalation score {:.2} exceeds threshold {:.2}",
                outcome.score, self.config.threshold
            )
        }
    }

    fn recently_escalated(&self, signature: u64) -> bool {
        let window = Duration::from_secs(self.config.hysteresis_window_secs);
        let Some(escalated_at) = self.recent.get(&signature).map(|entry| *entry.value()) else {
            return false;
        };
        if escalated_at.elapsed() < window {
            true
        } else {
            self.recent.remove(&signature);
            false
        }
    }

    fn prune_recent(&self) {
        if self.recent.len() > HYSTERESIS_PRUNE_AT {
            let window = Duration::from_secs(self.config.hysteresis_window_secs);
            self.recent.retain(|_, escalated_at| escalated_at.elapsed() < window);
        }
    }

    /// Structural signatures currently under hysteresis.
    pub fn hysteresis_entries(&self) -> usize {
        self.recent.len()
    }

    /// Forgets every remembered escalation.
    pub fn clear_hysteresis(&self) {
        self.recent.clear();
    }

    /// Assembles the package handed to the strategic planner.
    pub fn build_package(
        &self,
        routing_id: Uuid,
        request: &TaskRequest,
        input: &EscalationInput<'_>,
        outcome: &EscalationOutcome,
    ) -> EscalationPackage {
        let complexity = input.complexity.value;
        EscalationPackage {
            routing_id,
            original_request: request.description.clone(),
            task_analysis: TaskAnalysisSummary {
                complexity,
                label: input.complexity.label,
                estimated_tokens: input.confidence.estimated_tokens,
                estimated_minutes: ((complexity * MINUTES_PER_COMPLEXITY).round() as u32).max(1),
            },
            domains: input.domains.domains.clone(),
            primary_domain: input
                .domains
                .primary()
                .map(|domain| domain.domain_id.clone()),
            confidence: input.confidence.clone(),
            triggers: outcome.triggers.clone(),
            raw_escalation_score: outcome.raw_score,
            escalation_score: outcome.score,
            requirements: outcome.requirements,
            context: request.context.clone(),
            recommended_approach: recommended_approach(outcome, input.domains),
            created_at: Utc::now(),
        }
    }
}

/// Hash of the sorted domain ids and the complexity label.
pub fn structural_signature(domains: &DomainReport, label: ComplexityLabel) -> u64 {
    let label = label.to_string();
    let mut parts = domains.sorted_ids();
    parts.push(&label);
    hash_parts(&parts)
}

fn recommended_approach(outcome: &EscalationOutcome, domains: &DomainReport) -> String {
    let mut needs = Vec::new();
    let requirements = outcome.requirements;
    if requirements.enterprise_scope {
        needs.push("enterprise-scale requirements");
    }
    if requirements.architectural_decisions {
        needs.push("architectural decisions");
    }
    if requirements.high_complexity {
        needs.push("high complexity");
    }
    if requirements.multi_domain_coordination {
        needs.push("multi-domain coordination");
    }
    if outcome.triggers.contains(&EscalationTrigger::LowConfidence) {
        needs.push("low routing confidence");
    }
    if outcome.triggers.contains(&EscalationTrigger::AmbiguousRequirements) {
        needs.push("requirements needing clarification");
    }
    if needs.is_empty() {
        needs.push("elevated escalation score");
    }

    let domain_list = domains.sorted_ids().join(", ");
    let team = if domain_list.is_empty() {
        "identify the owning domains".to_owned()
    } else {
        format!("assemble a team covering {domain_list}")
    };
    format!(
        "Strategic analysis for {}; {team} and produce a phased execution plan",
        needs.join(", ")
    )
}
