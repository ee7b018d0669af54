//! Parallel multi-domain detection.
//!
//! Every processor runs as its own task on a bounded pool with a per-domain
//! time budget. Processors that fail, panic or overrun are dropped and the
//! report lists them; the detection itself always completes.

mod processor;

pub use processor::{DomainProcessor, DomainScore, RuleDomainProcessor};

use crate::analyzer::{Rulebook, TaskText};
use crate::error::RoutingError;
use dispatch_core::{DomainConfig, DomainMatch};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Aggregated domain detection result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomainReport {
    /// Included domains, strongest first
    pub domains: Vec<DomainMatch>,
    /// Sum of included confidences
    pub total_confidence: f64,
    /// Mean complexity bias of included domains
    pub avg_complexity_bias: f64,
    /// Processors dropped during this detection
    pub failed: Vec<String>,
}

impl DomainReport {
    /// Number of included domains.
    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    /// Strongest domain, if any.
    pub fn primary(&self) -> Option<&DomainMatch> {
        self.domains.first()
    }

    /// True when every processor reported.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Included domain ids, sorted alphabetically.
    pub fn sorted_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .domains
            .iter()
            .map(|domain| domain.domain_id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }
}

/// Runs domain processors concurrently and aggregates their matches.
pub struct DomainDetector {
    processors: Vec<Arc<dyn DomainProcessor>>,
    max_workers: usize,
    per_domain_budget: Duration,
    inclusion_threshold: f64,
    max_confidence: f64,
}

impl DomainDetector {
    /// Builds one rule-driven processor per compiled domain.
    pub fn from_rules(config: &DomainConfig, rules: &Rulebook) -> Self {
        let processors = rules
            .domains()
            .iter()
            .map(|domain| {
                Arc::new(RuleDomainProcessor::new(domain.clone(), config.clone()))
                    as Arc<dyn DomainProcessor>
            })
            .collect();
        Self::with_processors(config, processors)
    }

    /// Uses the given processors.
    pub fn with_processors(config: &DomainConfig, processors: Vec<Arc<dyn DomainProcessor>>) -> Self {
        Self {
            processors,
            max_workers: config.max_workers.max(1),
            per_domain_budget: Duration::from_millis(config.per_domain_budget_ms),
            inclusion_threshold: config.inclusion_threshold,
            max_confidence: config.max_confidence,
        }
    }

    /// Number of registered processors.
    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }

    /// Scores every domain and aggregates the matches.
    pub async fn detect(&self, text: Arc<TaskText>) -> DomainReport {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut join_set = JoinSet::new();
        let mut pending: HashSet<String> = HashSet::new();

        for processor in &self.processors {
            let processor = Arc::clone(processor);
            let text = Arc::clone(&text);
            let semaphore = Arc::clone(&semaphore);
            let budget = self.per_domain_budget;
            pending.insert(processor.domain_id().to_owned());

            join_set.spawn(async move {
                let domain_id = processor.domain_id().to_owned();
                let outcome = timeout(budget, async {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|error| RoutingError::Other(error.to_string()))?;
                    processor.score(&text).await
                })
                .await;
                let result = match outcome {
                    Ok(scored) => scored,
                    Err(_) => Err(RoutingError::Timeout(budget.as_millis() as u64)),
                };
                (domain_id, processor, result)
            });
        }

        let mut domains = Vec::new();
        let mut failed = Vec::new();

        while let Some(joined) = join_set.join_next().await {
            let Ok((domain_id, processor, result)) = joined else {
                continue;
            };
            pending.remove(&domain_id);
            match result {
                Ok(score) if score.confidence.is_finite() => {
                    let confidence = score.confidence.min(self.max_confidence);
                    debug!(domain = %domain_id, confidence, "domain scored");
                    if confidence > self.inclusion_threshold {
                        domains.push(DomainMatch {
                            domain_id,
                            confidence,
                            complexity_bias: processor.complexity_bias().clamp(0.0, 1.0),
                            preferred_handlers: processor.preferred_handlers().to_vec(),
                        });
                    }
                }
                Ok(_) => {
                    warn!(domain = %domain_id, "domain processor returned a non-finite score");
                    failed.push(domain_id);
                }
                Err(error) => {
                    let failure = RoutingError::DomainProcessorFailure {
                        domain: domain_id.clone(),
                        reason: error.to_string(),
                    };
                    warn!(domain = %domain_id, "{failure}");
                    failed.push(domain_id);
                }
            }
        }

        for domain_id in pending {
            warn!(domain = %domain_id, "domain processor panicked");
            failed.push(domain_id);
        }
        failed.sort_unstable();

        domains.sort_by(|left, right| {
            right
                .confidence
                .total_cmp(&left.confidence)
                .then_with(|| left.domain_id.cmp(&right.domain_id))
        });

        let total_confidence = domains.iter().map(|domain| domain.confidence).sum();
        let avg_complexity_bias = if domains.is_empty() {
            0.0
        } else {
            domains.iter().map(|domain| domain.complexity_bias).sum::<f64>() / domains.len() as f64
        };

        DomainReport {
            domains,
            total_confidence,
            avg_complexity_bias,
            failed,
        }
    }
}
