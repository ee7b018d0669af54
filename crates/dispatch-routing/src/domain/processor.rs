//! Domain processors: independent scorers, one per functional domain.

use crate::analyzer::{CompiledDomain, TaskText};
use crate::error::Result;
use async_trait::async_trait;
use dispatch_core::DomainConfig;

/// Signal breakdown produced by a processor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DomainScore {
    /// Primary and secondary term signal
    pub keyword: f64,
    /// File-reference signal
    pub structural: f64,
    /// Operation-verb signal
    pub verbs: f64,
    /// Contextual-phrase signal
    pub phrases: f64,
    /// Combined confidence, capped at the configured maximum
    pub confidence: f64,
}

/// Scores how strongly a task belongs to one domain.
///
/// Processors must be stateless: the detector runs them concurrently and
/// shares them across requests.
#[async_trait]
pub trait DomainProcessor: Send + Sync {
    /// Domain identifier.
    fn domain_id(&self) -> &str;

    /// How much this domain tends to raise complexity.
    fn complexity_bias(&self) -> f64;

    /// Handlers preferred for this domain, best first.
    fn preferred_handlers(&self) -> &[String];

    /// Scores a normalized description.
    ///
    /// # Errors
    ///
    /// Returns an error if the processor cannot score the text; the detector
    /// drops the domain and carries on.
    async fn score(&self, text: &TaskText) -> Result<DomainScore>;
}

/// Processor driven by a compiled rule-table entry.
pub struct RuleDomainProcessor {
    domain: CompiledDomain,
    config: DomainConfig,
}

impl RuleDomainProcessor {
    /// Creates a processor for one compiled domain.
    pub fn new(domain: CompiledDomain, config: DomainConfig) -> Self {
        Self { domain, config }
    }

    /// Synchronous scoring used by [`DomainProcessor::score`].
    pub fn evaluate(&self, text: &TaskText) -> DomainScore {
        let mut primary = 0_u32;
        let mut secondary = 0_u32;
        let mut verbs = 0_u32;
        for token in text.tokens() {
            if self.domain.primary_terms.contains(token) {
                primary += 1;
            } else if self.domain.secondary_terms.contains(token) {
                secondary += 1;
            }
            if self.domain.operation_verbs.contains(token) {
                verbs += 1;
            }
        }
        let file_hits: usize = self
            .domain
            .file_patterns
            .iter()
            .map(|pattern| pattern.find_iter(text.lowered()).count())
            .sum();
        let phrase_hits = self
            .domain
            .phrases
            .iter()
            .filter(|phrase| text.contains_phrase(phrase))
            .count();

        let config = &self.config;
        let keyword = (f64::from(primary) * config.primary_term_weight
            + f64::from(secondary) * config.secondary_term_weight)
            .min(1.0);
        let structural = (file_hits as f64 * config.pattern_hit_weight).min(1.0);
        let verb_signal = (f64::from(verbs) * config.verb_hit_weight).min(1.0);
        let phrase_signal = (phrase_hits as f64 * config.phrase_hit_weight).min(1.0);

        let weights = config.weights;
        let combined = weights.keyword * keyword
            + weights.structural * structural
            + weights.verbs * verb_signal
            + weights.phrases * phrase_signal;

        DomainScore {
            keyword,
            structural,
            verbs: verb_signal,
            phrases: phrase_signal,
            confidence: combined.clamp(0.0, config.max_confidence),
        }
    }
}

#[async_trait]
impl DomainProcessor for RuleDomainProcessor {
    fn domain_id(&self) -> &str {
        &self.domain.id
    }

    fn complexity_bias(&self) -> f64 {
        self.domain.complexity_bias
    }

    fn preferred_handlers(&self) -> &[String] {
        &self.domain.preferred_handlers
    }

    async fn score(&self, text: &TaskText) -> Result<DomainScore> {
        Ok(self.evaluate(text))
    }
}
