use super::rulebook::Rulebook;
use super::text::TaskText;
use dispatch_core::{
    ClassificationLevel, ClassifierConfig, ComplexityLabel, ComplexityScore, WeightTable,
};
use std::sync::Arc;

/// Prefix of classifier keyword pattern ids in the weight table.
pub const COMPLEXITY_PATTERN_PREFIX: &str = "complexity:";

/// The five detailed-analysis factors, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComplexityFactors {
    /// Distinct domains touched
    pub domain_span: f64,
    /// Conditionals and conjunctions
    pub conditional: f64,
    /// Inter-dependency markers
    pub interdependency: f64,
    /// Length and scope
    pub resource_cost: f64,
    /// Learned difficulty
    pub historical_difficulty: f64,
}

/// Two-level complexity classifier.
///
/// Level one matches weighted keyword sets and returns immediately when one
/// side clearly dominates. Ambiguous inputs go through the multi-factor
/// level two. Output depends only on the normalized text and the weight table.
pub struct HierarchicalClassifier {
    config: ClassifierConfig,
    rules: Arc<Rulebook>,
}

struct KeywordScan {
    simple_score: f64,
    complex_score: f64,
    signals: Vec<String>,
}

impl HierarchicalClassifier {
    /// Creates a classifier over compiled rules.
    pub fn new(config: ClassifierConfig, rules: Arc<Rulebook>) -> Self {
        Self { config, rules }
    }

    /// Classifies a normalized description.
    pub fn classify(&self, text: &TaskText, weights: &WeightTable) -> ComplexityScore {
        if text.is_empty() {
            return ComplexityScore {
                value: 0.5,
                label: ComplexityLabel::Standard,
                confidence: self.config.empty_confidence,
                level: ClassificationLevel::Degraded,
                signals: Vec::new(),
            };
        }

        let scan = self.scan_keywords(text, weights);
        let simple_fast = scan.simple_score >= self.config.simple_dominance
            && scan.complex_score <= f64::EPSILON;
        let complex_fast = scan.complex_score >= self.config.complex_dominance
            && scan.complex_score > scan.simple_score;

        if simple_fast {
            return self.fast_score(self.config.fast_simple_value, scan.signals);
        }
        if complex_fast {
            return self.fast_score(self.config.fast_complex_value, scan.signals);
        }

        let factors = self.factors(text, weights);
        let value = self.weighted_value(factors);
        let confidence = (0.5 + self.threshold_distance(value)).min(0.95);

        let mut signals = scan.signals;
        signals.extend(self.marker_signals(text));

        ComplexityScore {
            value,
            label: self.label_for(value),
            confidence,
            level: ClassificationLevel::Detailed,
            signals,
        }
    }

    /// Label for a complexity value under the configured thresholds.
    pub fn label_for(&self, value: f64) -> ComplexityLabel {
        ComplexityLabel::from_value(
            value,
            self.config.simple_threshold,
            self.config.complex_threshold,
        )
    }

    /// Computes the detailed-analysis factors.
    pub fn factors(&self, text: &TaskText, weights: &WeightTable) -> ComplexityFactors {
        let tokens = text.token_count() as f64;
        let scope_words = self.rules.scope_count(text) as f64;

        ComplexityFactors {
            domain_span: saturate(
                self.rules.domain_span(text) as f64,
                self.config.span_saturation,
            ),
            conditional: saturate(
                self.rules.conditional_count(text) as f64,
                self.config.conditional_saturation,
            ),
            interdependency: saturate(
                self.rules.dependency_count(text) as f64,
                self.config.dependency_saturation,
            ),
            resource_cost: (tokens / self.config.token_saturation.max(1.0)
                + scope_words * self.config.scope_word_weight)
                .clamp(0.0, 1.0),
            historical_difficulty: weights.difficulty(text.signature()).clamp(0.0, 1.0),
        }
    }

    fn weighted_value(&self, factors: ComplexityFactors) -> f64 {
        let weights = self.config.factor_weights;
        let value = weights.domain_span * factors.domain_span
            + weights.conditional * factors.conditional
            + weights.interdependency * factors.interdependency
            + weights.resource_cost * factors.resource_cost
            + weights.historical_difficulty * factors.historical_difficulty;
        if value.is_finite() {
            value.clamp(0.0, 1.0)
        } else {
            0.5
        }
    }

    fn fast_score(&self, value: f64, signals: Vec<String>) -> ComplexityScore {
        ComplexityScore {
            value,
            label: self.label_for(value),
            confidence: 0.9,
            level: ClassificationLevel::Fast,
            signals,
        }
    }

    fn scan_keywords(&self, text: &TaskText, weights: &WeightTable) -> KeywordScan {
        let mut simple_total = 0.0;
        let mut complex_total = 0.0;
        let mut signals = Vec::new();

        for token in text.tokens() {
            if let Some(weight) = self.rules.simple_weight(token) {
                simple_total += weight * weights.multiplier(&pattern_id(token));
                signals.push(token.clone());
            }
            if let Some(weight) = self.rules.complex_weight(token) {
                complex_total += weight * weights.multiplier(&pattern_id(token));
                signals.push(token.clone());
            }
        }

        let token_count = text.token_count().max(1) as f64;
        KeywordScan {
            simple_score: simple_total / token_count,
            complex_score: complex_total / token_count,
            signals,
        }
    }

    fn marker_signals(&self, text: &TaskText) -> Vec<String> {
        let mut signals = Vec::new();
        let span = self.rules.domain_span(text);
        if span > 0 {
            signals.push(format!("domains:{span}"));
        }
        let dependencies = self.rules.dependency_count(text);
        if dependencies > 0 {
            signals.push(format!("dependencies:{dependencies}"));
        }
        signals
    }

    fn threshold_distance(&self, value: f64) -> f64 {
        (value - self.config.simple_threshold)
            .abs()
            .min((value - self.config.complex_threshold).abs())
    }
}

/// Weight-table id of a classifier keyword.
pub fn pattern_id(term: &str) -> String {
    format!("{COMPLEXITY_PATTERN_PREFIX}{term}")
}

fn saturate(count: f64, saturation: f64) -> f64 {
    (count / saturation.max(1.0)).clamp(0.0, 1.0)
}
