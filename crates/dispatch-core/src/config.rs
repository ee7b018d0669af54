//! Configuration types for every routing stage.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Tolerance used when checking that a weight set sums to one.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;
/// Reported domain confidences always lie strictly above this floor.
pub const DOMAIN_CONFIDENCE_FLOOR: f64 = 0.3;
/// Reported domain confidences never exceed this ceiling.
pub const DOMAIN_CONFIDENCE_CEILING: f64 = 0.95;

/// Complete routing configuration.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Hierarchical classifier configuration
    pub classifier: ClassifierConfig,
    /// Domain detector configuration
    pub domains: DomainConfig,
    /// Confidence engine configuration
    pub confidence: ConfidenceConfig,
    /// Escalation engine configuration
    pub escalation: EscalationConfig,
    /// Orchestration tier configuration
    pub tiers: TierConfig,
    /// Cache configuration
    pub cache: CacheConfig,
    /// Circuit breaker configuration
    pub circuit: CircuitConfig,
    /// Engine-wide limits
    pub engine: EngineConfig,
    /// Performance monitor configuration
    pub monitor: MonitorConfig,
    /// Adaptive learner configuration
    pub learner: LearnerConfig,
}

/// Weights of the five detailed-analysis factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorWeights {
    /// Number of domains touched
    pub domain_span: f64,
    /// Conditionals and conjunctions
    pub conditional: f64,
    /// Inter-dependency markers
    pub interdependency: f64,
    /// Estimated resource cost
    pub resource_cost: f64,
    /// Learned difficulty of similar tasks
    pub historical_difficulty: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            domain_span: 0.25,
            conditional: 0.20,
            interdependency: 0.25,
            resource_cost: 0.15,
            historical_difficulty: 0.15,
        }
    }
}

impl FactorWeights {
    fn as_array(self) -> [f64; 5] {
        [
            self.domain_span,
            self.conditional,
            self.interdependency,
            self.resource_cost,
            self.historical_difficulty,
        ]
    }
}

/// Hierarchical classifier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Values below this are `Simple`
    pub simple_threshold: f64,
    /// Values above this are `Complex`
    pub complex_threshold: f64,
    /// Minimum simple-keyword density for the simple fast path
    pub simple_dominance: f64,
    /// Minimum complex-keyword density for the complex fast path
    pub complex_dominance: f64,
    /// Value reported by the simple fast path
    pub fast_simple_value: f64,
    /// Value reported by the complex fast path
    pub fast_complex_value: f64,
    /// Confidence reported for empty input
    pub empty_confidence: f64,
    /// Detailed-analysis factor weights
    pub factor_weights: FactorWeights,
    /// Domain count at which the span factor saturates
    pub span_saturation: f64,
    /// Marker count at which the conditional factor saturates
    pub conditional_saturation: f64,
    /// Marker count at which the dependency factor saturates
    pub dependency_saturation: f64,
    /// Token count at which the resource factor saturates
    pub token_saturation: f64,
    /// Resource factor added per scope word
    pub scope_word_weight: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            simple_threshold: 0.3,
            complex_threshold: 0.7,
            simple_dominance: 0.15,
            complex_dominance: 0.08,
            fast_simple_value: 0.2,
            fast_complex_value: 0.9,
            empty_confidence: 0.3,
            factor_weights: FactorWeights::default(),
            span_saturation: 4.0,
            conditional_saturation: 4.0,
            dependency_saturation: 3.0,
            token_saturation: 25.0,
            scope_word_weight: 0.25,
        }
    }
}

/// Weights combining the four domain signals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainWeights {
    /// Primary and secondary terms
    pub keyword: f64,
    /// File-reference patterns
    pub structural: f64,
    /// Operation verbs
    pub verbs: f64,
    /// Contextual phrases
    pub phrases: f64,
}

impl Default for DomainWeights {
    fn default() -> Self {
        Self {
            keyword: 0.55,
            structural: 0.15,
            verbs: 0.15,
            phrases: 0.15,
        }
    }
}

/// Domain detector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    /// Domains at or below this confidence are dropped
    pub inclusion_threshold: f64,
    /// Confidence ceiling
    pub max_confidence: f64,
    /// Worker pool size
    pub max_workers: usize,
    /// Time budget per domain processor
    pub per_domain_budget_ms: u64,
    /// Signal weights
    pub weights: DomainWeights,
    /// Keyword signal per primary term
    pub primary_term_weight: f64,
    /// Keyword signal per secondary term
    pub secondary_term_weight: f64,
    /// Structural signal per file-pattern hit
    pub pattern_hit_weight: f64,
    /// Verb signal per verb hit
    pub verb_hit_weight: f64,
    /// Phrase signal per phrase hit
    pub phrase_hit_weight: f64,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            inclusion_threshold: 0.3,
            max_confidence: 0.95,
            max_workers: 4,
            per_domain_budget_ms: 25,
            weights: DomainWeights::default(),
            primary_term_weight: 0.5,
            secondary_term_weight: 0.25,
            pattern_hit_weight: 0.5,
            verb_hit_weight: 0.5,
            phrase_hit_weight: 1.0,
        }
    }
}

/// Weights of the four confidence components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    /// Pattern-match similarity
    pub pattern: f64,
    /// Historical success
    pub historical: f64,
    /// Context completeness
    pub context: f64,
    /// Resource availability
    pub resource: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            pattern: 0.4,
            historical: 0.3,
            context: 0.2,
            resource: 0.1,
        }
    }
}

/// Confidence engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Component weights
    pub weights: ConfidenceWeights,
    /// Shared terms at which a candidate counts as a full match
    pub pattern_saturation: f64,
    /// Historical success assumed when the store has nothing
    pub default_historical: f64,
    /// Token budget the resource check measures against
    pub resource_capacity_tokens: f64,
    /// Estimated tokens per description word
    pub tokens_per_word: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            weights: ConfidenceWeights::default(),
            pattern_saturation: 3.0,
            default_historical: 0.5,
            resource_capacity_tokens: 32_000.0,
            tokens_per_word: 200.0,
        }
    }
}

/// Weights of the escalation triggers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationWeights {
    /// `1 - confidence`
    pub confidence_deficit: f64,
    /// Complexity value
    pub complexity: f64,
    /// Domain-count pressure
    pub domain_pressure: f64,
    /// Requirement ambiguity
    pub ambiguity: f64,
    /// Estimated failure risk
    pub failure_risk: f64,
    /// Enterprise-scope wording
    pub enterprise: f64,
}

impl Default for EscalationWeights {
    fn default() -> Self {
        Self {
            confidence_deficit: 0.35,
            complexity: 0.25,
            domain_pressure: 0.15,
            ambiguity: 0.10,
            failure_risk: 0.10,
            enterprise: 0.05,
        }
    }
}

impl EscalationWeights {
    fn as_array(self) -> [f64; 6] {
        [
            self.confidence_deficit,
            self.complexity,
            self.domain_pressure,
            self.ambiguity,
            self.failure_risk,
            self.enterprise,
        ]
    }
}

/// Escalation engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Trigger weights
    pub weights: EscalationWeights,
    /// Scores above this escalate
    pub threshold: f64,
    /// Minimum domains for orchestration
    pub orchestrate_min_domains: usize,
    /// Confidence orchestration must exceed
    pub orchestrate_min_confidence: f64,
    /// Single-domain confidence for direct dispatch to the domain handler
    pub direct_dispatch_threshold: f64,
    /// Domain count at which domain pressure saturates
    pub domain_pressure_saturation: f64,
    /// Ambiguity matches at which ambiguity saturates
    pub ambiguity_saturation: f64,
    /// How long an escalated signature stays damped
    pub hysteresis_window_secs: u64,
    /// Score reduction while damped
    pub hysteresis_margin: f64,
    /// Confidence below which `low_confidence` fires
    pub low_confidence_trigger: f64,
    /// Complexity above which `high_complexity` fires
    pub high_complexity_trigger: f64,
    /// Domain count above which `multi_domain` fires
    pub multi_domain_trigger: usize,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            weights: EscalationWeights::default(),
            threshold: 0.7,
            orchestrate_min_domains: 2,
            orchestrate_min_confidence: 0.6,
            direct_dispatch_threshold: 0.75,
            domain_pressure_saturation: 5.0,
            ambiguity_saturation: 3.0,
            hysteresis_window_secs: 600,
            hysteresis_margin: 0.1,
            low_confidence_trigger: 0.4,
            high_complexity_trigger: 0.8,
            multi_domain_trigger: 3,
        }
    }
}

/// Orchestration tier selection and target ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    /// Complexity above which `Advanced` is selected
    pub advanced_complexity: f64,
    /// Domain count selecting `Advanced`
    pub advanced_min_domains: usize,
    /// Complexity above which `Standard` is selected
    pub standard_complexity: f64,
    /// Domain count selecting `Standard`
    pub standard_min_domains: usize,
    /// Target id of the single tier
    pub single_id: String,
    /// Target id of the standard tier
    pub standard_id: String,
    /// Target id of the advanced tier
    pub advanced_id: String,
    /// Target id for escalations when no planner is attached
    pub planner_id: String,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            advanced_complexity: 0.8,
            advanced_min_domains: 4,
            standard_complexity: 0.5,
            standard_min_domains: 2,
            single_id: "orchestrate-tasks".to_owned(),
            standard_id: "orchestrate-agents".to_owned(),
            advanced_id: "orchestrate-agents-advanced".to_owned(),
            planner_id: "strategic-planner".to_owned(),
        }
    }
}

/// Size and lifetime of one cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTierConfig {
    /// Entry lifetime in seconds
    pub ttl_secs: u64,
    /// Maximum entries before LRU eviction
    pub capacity: usize,
}

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether caching is enabled
    pub enabled: bool,
    /// Longest wait for a tier lock before bypassing the cache
    pub lock_timeout_ms: u64,
    /// Pattern-match tier
    pub pattern: CacheTierConfig,
    /// Domain-detection tier
    pub domain: CacheTierConfig,
    /// Complexity tier
    pub complexity: CacheTierConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lock_timeout_ms: 2,
            pattern: CacheTierConfig {
                ttl_secs: 3600,
                capacity: 1000,
            },
            domain: CacheTierConfig {
                ttl_secs: 1800,
                capacity: 500,
            },
            complexity: CacheTierConfig {
                ttl_secs: 300,
                capacity: 200,
            },
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time the circuit stays open before trials
    pub recovery_timeout_ms: u64,
    /// Consecutive trial successes that close the circuit
    pub success_threshold: u32,
    /// Concurrent trial requests while half-open
    pub half_open_max_trials: u32,
    /// Confidence reported on fallback decisions
    pub fallback_confidence: f64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 30_000,
            success_threshold: 3,
            half_open_max_trials: 1,
            fallback_confidence: 0.5,
        }
    }
}

/// Engine-wide limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Soft deadline for the whole pipeline
    pub soft_deadline_ms: u64,
    /// Cap on historical success lookups
    pub history_timeout_ms: u64,
    /// Routing requests allowed in flight
    pub max_in_flight: usize,
    /// Longer descriptions are truncated
    pub max_description_chars: usize,
    /// Decisions remembered while awaiting outcomes
    pub pending_outcome_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            soft_deadline_ms: 100,
            history_timeout_ms: 5,
            max_in_flight: 256,
            max_description_chars: 2000,
            pending_outcome_capacity: 10_000,
        }
    }
}

/// Performance monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Decisions kept in the rolling window
    pub window_size: usize,
    /// Mean latency alert
    pub alert_mean_latency_ms: f64,
    /// p99 latency alert
    pub alert_p99_latency_ms: f64,
    /// Fallback rate alert
    pub alert_fallback_rate: f64,
    /// Cache hit rate floor
    pub alert_cache_hit_floor: f64,
    /// Samples required before rate alerts apply
    pub min_samples_for_alerts: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window_size: 1000,
            alert_mean_latency_ms: 150.0,
            alert_p99_latency_ms: 500.0,
            alert_fallback_rate: 0.1,
            alert_cache_hit_floor: 0.6,
            min_samples_for_alerts: 50,
        }
    }
}

/// Adaptive learner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// Pattern multiplier increment
    pub nudge_step: f64,
    /// Outcomes between model retrains
    pub retrain_every: usize,
    /// Samples required to retrain
    pub min_training_samples: usize,
    /// Training samples kept
    pub sample_capacity: usize,
    /// Consumed outcomes kept
    pub archive_capacity: usize,
    /// SGD learning rate
    pub learning_rate: f64,
    /// SGD passes per retrain
    pub epochs: usize,
    /// L2 weight decay
    pub l2_decay: f64,
    /// Outcome queue length
    pub channel_capacity: usize,
    /// Share of the old value kept by exponential averages
    pub ema_retain: f64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            nudge_step: 0.05,
            retrain_every: 50,
            min_training_samples: 10,
            sample_capacity: 1000,
            archive_capacity: 1000,
            learning_rate: 0.1,
            epochs: 25,
            l2_decay: 0.001,
            channel_capacity: 1024,
            ema_retain: 0.8,
        }
    }
}

fn check_weights(section: &str, weights: &[f64]) -> Result<()> {
    if weights.iter().any(|weight| !weight.is_finite() || *weight < 0.0) {
        return Err(Error::Config(format!(
            "{section} weights must be finite and non-negative"
        )));
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(Error::Config(format!(
            "{section} weights must sum to 1.0, got {sum:.4}"
        )));
    }
    Ok(())
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::Config(format!("{name} must be within [0, 1], got {value}")))
    }
}

impl DomainConfig {
    /// Keeps reported confidences inside `(0.3, 0.95]`.
    fn validate_bounds(&self) -> Result<()> {
        if self.inclusion_threshold.is_nan() || self.inclusion_threshold < DOMAIN_CONFIDENCE_FLOOR {
            return Err(Error::Config(format!(
                "domains.inclusion_threshold must be at least {DOMAIN_CONFIDENCE_FLOOR}, got {}",
                self.inclusion_threshold
            )));
        }
        if self.max_confidence.is_nan() || self.max_confidence > DOMAIN_CONFIDENCE_CEILING {
            return Err(Error::Config(format!(
                "domains.max_confidence must not exceed {DOMAIN_CONFIDENCE_CEILING}, got {}",
                self.max_confidence
            )));
        }
        if self.inclusion_threshold >= self.max_confidence {
            return Err(Error::Config(
                "domains.inclusion_threshold must be below domains.max_confidence".to_owned(),
            ));
        }
        Ok(())
    }
}

impl RoutingConfig {
    /// Get the default config directory path (`~/.dispatch`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        use dirs::home_dir;
        let home = home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_owned()))?;
        Ok(home.join(".dispatch"))
    }

    /// Get the default config file path (`~/.dispatch/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location (`~/.dispatch/config.toml`)
    /// If the config doesn't exist, creates it with default values
    ///
    /// # Errors
    /// Returns an error if the config cannot be read or created
    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            let config = Self::default();
            config.save_to_file(&config_path)?;
            info!(path = %config_path.display(), "wrote default configuration");
            Ok(config)
        }
    }

    /// Load and validate config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|error| Error::Config(format!("Failed to read config: {error}")))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|error| Error::Config(format!("Failed to parse config: {error}")))?;
        config.validate()?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                Error::Config(format!("Failed to create config directory: {error}"))
            })?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|error| Error::Config(format!("Failed to serialize config: {error}")))?;

        let header = "# Dispatch Configuration File\n\
                      # This file is automatically generated on first run\n\
                      # Edit this file to tune routing thresholds and limits\n\n";

        fs::write(path, format!("{header}{contents}"))
            .map_err(|error| Error::Config(format!("Failed to write config: {error}")))?;

        Ok(())
    }

    /// Checks weight sets, thresholds and capacities.
    ///
    /// # Errors
    /// Returns the first inconsistency found
    pub fn validate(&self) -> Result<()> {
        check_weights("classifier.factor_weights", &self.classifier.factor_weights.as_array())?;
        let domain = self.domains.weights;
        check_weights(
            "domains.weights",
            &[domain.keyword, domain.structural, domain.verbs, domain.phrases],
        )?;
        let confidence = self.confidence.weights;
        check_weights(
            "confidence.weights",
            &[
                confidence.pattern,
                confidence.historical,
                confidence.context,
                confidence.resource,
            ],
        )?;
        check_weights("escalation.weights", &self.escalation.weights.as_array())?;

        check_unit("classifier.simple_threshold", self.classifier.simple_threshold)?;
        check_unit("classifier.complex_threshold", self.classifier.complex_threshold)?;
        if self.classifier.simple_threshold > self.classifier.complex_threshold {
            return Err(Error::Config(
                "classifier.simple_threshold must not exceed complex_threshold".to_owned(),
            ));
        }
        self.domains.validate_bounds()?;
        check_unit("escalation.threshold", self.escalation.threshold)?;
        check_unit("escalation.hysteresis_margin", self.escalation.hysteresis_margin)?;
        check_unit("learner.ema_retain", self.learner.ema_retain)?;

        for (name, tier) in [
            ("cache.pattern", &self.cache.pattern),
            ("cache.domain", &self.cache.domain),
            ("cache.complexity", &self.cache.complexity),
        ] {
            if tier.capacity == 0 || tier.ttl_secs == 0 {
                return Err(Error::Config(format!(
                    "{name} capacity and ttl_secs must be positive"
                )));
            }
        }
        if self.engine.pending_outcome_capacity == 0
            || self.learner.sample_capacity == 0
            || self.learner.archive_capacity == 0
        {
            return Err(Error::Config(
                "engine and learner buffer capacities must be positive".to_owned(),
            ));
        }
        if self.domains.max_workers == 0 {
            return Err(Error::Config("domains.max_workers must be positive".to_owned()));
        }
        if self.engine.max_in_flight == 0 {
            return Err(Error::Config("engine.max_in_flight must be positive".to_owned()));
        }
        if self.monitor.window_size == 0 {
            return Err(Error::Config("monitor.window_size must be positive".to_owned()));
        }
        if self.learner.retrain_every == 0 || self.learner.channel_capacity == 0 {
            return Err(Error::Config(
                "learner.retrain_every and learner.channel_capacity must be positive".to_owned(),
            ));
        }
        if self.circuit.failure_threshold == 0 || self.circuit.success_threshold == 0 {
            return Err(Error::Config("circuit thresholds must be positive".to_owned()));
        }
        Ok(())
    }
}
