//! Multi-factor confidence scoring.
//!
//! Total confidence is a weighted blend of pattern similarity against the
//! candidate handlers, historical success for the task signature, context
//! completeness and resource availability. The variance across the four
//! components separates confidently moderate scores from noisy ones.

use crate::analyzer::{Rulebook, TaskText, hash_parts, tokenize};
use crate::cache::TtlCache;
use crate::domain::DomainReport;
use dispatch_core::{
    ConfidenceBreakdown, ConfidenceComponents, ConfidenceConfig, HandlerCapability, OutcomeStore,
    TaskSignature, WeightTable,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Prefix of handler pattern ids in the weight table.
pub const HANDLER_PATTERN_PREFIX: &str = "handler:";

const CONTENT_TERM_SATURATION: f64 = 6.0;
const AMBIGUITY_SATURATION: f64 = 3.0;
const HINT_BONUS: f64 = 0.05;
const MAX_HINT_BONUS: f64 = 0.1;

/// Unweighted similarity between the task and one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSimilarity {
    /// Handler identifier
    pub handler_id: String,
    /// Similarity in `[0, 1]` before learned multipliers
    pub similarity: f64,
}

/// Confidence breakdown plus cache bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceScore {
    /// Score and components
    pub breakdown: ConfidenceBreakdown,
    /// Whether the pattern tier served the similarities
    pub pattern_cache_hit: bool,
}

/// Combines the four confidence components.
pub struct ConfidenceEngine {
    config: ConfidenceConfig,
    rules: Arc<Rulebook>,
    outcome_store: Arc<dyn OutcomeStore>,
    history_timeout: Duration,
    pattern_cache: Arc<TtlCache<Vec<CandidateSimilarity>>>,
}

impl ConfidenceEngine {
    /// Creates an engine reading history from `outcome_store`.
    pub fn new(
        config: ConfidenceConfig,
        rules: Arc<Rulebook>,
        outcome_store: Arc<dyn OutcomeStore>,
        history_timeout: Duration,
        pattern_cache: Arc<TtlCache<Vec<CandidateSimilarity>>>,
    ) -> Self {
        Self {
            config,
            rules,
            outcome_store,
            history_timeout,
            pattern_cache,
        }
    }

    /// Scores a task against its detected domains and candidate handlers.
    pub async fn score(
        &self,
        text: &TaskText,
        domains: &DomainReport,
        candidates: &[HandlerCapability],
        context_hints: usize,
        weights: &WeightTable,
    ) -> ConfidenceScore {
        let (similarities, pattern_cache_hit) = self.cached_similarities(text, candidates);
        let (pattern_match, best_candidate) = best_weighted(&similarities, weights);
        let historical_success = self.historical_success(text.signature()).await;
        let context_completeness = self.context_completeness(text, domains, context_hints);
        let (resource_availability, estimated_tokens) =
            self.resource_availability(text, domains.domain_count());

        let components = ConfidenceComponents {
            pattern_match,
            historical_success,
            context_completeness,
            resource_availability,
        };
        let weights = self.config.weights;
        let total = (weights.pattern * pattern_match
            + weights.historical * historical_success
            + weights.context * context_completeness
            + weights.resource * resource_availability)
            .clamp(0.0, 1.0);

        ConfidenceScore {
            breakdown: ConfidenceBreakdown {
                total,
                components,
                variance: variance(&components.as_array()),
                best_candidate,
                estimated_tokens,
            },
            pattern_cache_hit,
        }
    }

    fn cached_similarities(
        &self,
        text: &TaskText,
        candidates: &[HandlerCapability],
    ) -> (Vec<CandidateSimilarity>, bool) {
        let key = pattern_key(text, candidates);
        match self.pattern_cache.get(key) {
            Ok(Some(similarities)) => return (similarities, true),
            Ok(None) => {}
            Err(error) => warn!("{error}; computing pattern similarity without cache"),
        }

        let similarities = self.similarities(text, candidates);
        if let Err(error) = self.pattern_cache.insert(key, similarities.clone()) {
            warn!("{error}; pattern similarity not cached");
        }
        (similarities, false)
    }

    /// Raw similarity of the task to every candidate.
    pub fn similarities(
        &self,
        text: &TaskText,
        candidates: &[HandlerCapability],
    ) -> Vec<CandidateSimilarity> {
        let task_terms: HashSet<&str> = self.rules.content_terms(text.tokens()).into_iter().collect();
        let saturation = self.config.pattern_saturation.max(1.0);

        candidates
            .iter()
            .map(|candidate| {
                let capability_tokens = tokenize(&candidate.description.to_lowercase());
                let capability_terms: HashSet<&str> =
                    self.rules.content_terms(&capability_tokens).into_iter().collect();
                let overlap = task_terms.intersection(&capability_terms).count() as f64;
                CandidateSimilarity {
                    handler_id: candidate.id.clone(),
                    similarity: (overlap / saturation).min(1.0),
                }
            })
            .collect()
    }

    /// Success rate from the outcome store, or the default on miss or timeout.
    pub async fn historical_success(&self, signature: TaskSignature) -> f64 {
        let default = self.config.default_historical;
        match timeout(self.history_timeout, self.outcome_store.success_rate(signature)).await {
            Ok(Ok(Some(rate))) if rate.is_finite() => rate.clamp(0.0, 1.0),
            Ok(Ok(_)) => default,
            Ok(Err(error)) => {
                warn!(%signature, "outcome store lookup failed: {error}");
                default
            }
            Err(_) => {
                debug!(%signature, "outcome store lookup timed out");
                default
            }
        }
    }

    /// How much required information the description carries.
    pub fn context_completeness(
        &self,
        text: &TaskText,
        domains: &DomainReport,
        context_hints: usize,
    ) -> f64 {
        let primary = domains.primary().map_or(0.0, |domain| domain.confidence);
        let content_terms = self.rules.content_terms(text.tokens()).len() as f64;
        let specificity = (content_terms / CONTENT_TERM_SATURATION).min(1.0);
        let hints = (context_hints as f64 * HINT_BONUS).min(MAX_HINT_BONUS);
        let ambiguity =
            (self.rules.ambiguity_count(text) as f64 / AMBIGUITY_SATURATION).min(1.0);

        (0.3 + 0.5 * primary + 0.2 * specificity + hints - 0.4 * ambiguity).clamp(0.0, 1.0)
    }

    /// Headroom against the estimated token cost, with the estimate.
    pub fn resource_availability(&self, text: &TaskText, domain_count: usize) -> (f64, u64) {
        let estimated = text.token_count() as f64
            * self.config.tokens_per_word
            * 0.5f64.mul_add(domain_count as f64, 1.0);
        let capacity = self.config.resource_capacity_tokens.max(1.0);
        let availability = (1.0 - estimated / capacity).clamp(0.1, 1.0);
        (availability, estimated.round() as u64)
    }
}

/// Pattern-tier key: the normalized text plus a fingerprint of the candidates.
pub fn pattern_key(text: &TaskText, candidates: &[HandlerCapability]) -> u64 {
    let mut parts = vec!["pattern", text.normalized()];
    for candidate in candidates {
        parts.push(&candidate.id);
        parts.push(&candidate.description);
    }
    hash_parts(&parts)
}

/// Weight-table id of a handler pattern.
pub fn handler_pattern_id(handler_id: &str) -> String {
    format!("{HANDLER_PATTERN_PREFIX}{handler_id}")
}

fn best_weighted(
    similarities: &[CandidateSimilarity],
    weights: &WeightTable,
) -> (f64, Option<String>) {
    let mut best = 0.0;
    let mut best_candidate = None;
    for candidate in similarities {
        let weighted = (candidate.similarity
            * weights.multiplier(&handler_pattern_id(&candidate.handler_id)))
        .min(1.0);
        if weighted > best {
            best = weighted;
            best_candidate = Some(candidate.handler_id.clone());
        }
    }
    (best, best_candidate)
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / count
}
