//! Orchestration tier selection.

use dispatch_core::{OrchestrationTier, TierConfig};

/// Picks a coordination tier once orchestration is chosen.
#[derive(Debug, Clone, Default)]
pub struct OrchestrationRouter {
    config: TierConfig,
}

impl OrchestrationRouter {
    /// Creates a router with the given tier thresholds and ids.
    pub fn new(config: TierConfig) -> Self {
        Self { config }
    }

    /// Selects a tier. Complexity outranks raw domain count.
    pub fn select_tier(&self, domain_count: usize, complexity: f64) -> OrchestrationTier {
        let config = &self.config;
        if complexity > config.advanced_complexity || domain_count >= config.advanced_min_domains {
            OrchestrationTier::Advanced
        } else if domain_count >= config.standard_min_domains
            || complexity > config.standard_complexity
        {
            OrchestrationTier::Standard
        } else {
            OrchestrationTier::Single
        }
    }

    /// Target id of a tier.
    pub fn target_for(&self, tier: OrchestrationTier) -> &str {
        match tier {
            OrchestrationTier::Single => &self.config.single_id,
            OrchestrationTier::Standard => &self.config.standard_id,
            OrchestrationTier::Advanced => &self.config.advanced_id,
        }
    }

    /// Tier and target for a task.
    pub fn route(&self, domain_count: usize, complexity: f64) -> (OrchestrationTier, String) {
        let tier = self.select_tier(domain_count, complexity);
        (tier, self.target_for(tier).to_owned())
    }

    /// Default escalation target.
    pub fn planner_id(&self) -> &str {
        &self.config.planner_id
    }

    /// Target used by fallback decisions.
    pub fn fallback_target(&self) -> &str {
        &self.config.single_id
    }
}
