//! The routing engine.
//!
//! `RoutingEngine` owns every stage plus the shared cache, circuit breaker,
//! monitor and learner. It is cheap to clone; clones share all state. A
//! request runs the pipeline on its own task raced against the soft
//! deadline, so the caller always gets a decision back in time.

use crate::analyzer::{HierarchicalClassifier, Rulebook, TaskText, pattern_id};
use crate::cache::{RoutingCache, RoutingCacheStats};
use crate::circuit::{CircuitBreaker, CircuitSnapshot, Permit};
use crate::collaborators::{InMemoryOutcomeStore, LoggingPlanner, StaticCapabilityRegistry};
use crate::confidence::{ConfidenceEngine, handler_pattern_id, pattern_key};
use crate::domain::{DomainDetector, DomainProcessor, DomainReport};
use crate::error::{Result, RoutingError};
use crate::escalation::{EscalationEngine, EscalationInput};
use crate::learning::{
    AdaptiveLearner, FeatureVector, LearnerHandle, LearnerStats, LinearModelConfig,
    LinearScoringModel, PendingRouting, ScoringModel, WeightStore,
};
use crate::metrics::{MonitorReport, PerformanceMonitor};
use crate::router::OrchestrationRouter;
use dispatch_core::{
    CacheHits, CapabilityRegistry, ComplexityScore, FallbackReason, OrchestrationTier,
    OutcomeRecord, OutcomeStore, RoutingAction, RoutingConfig, RoutingDecision, RuleSet,
    StrategicPlanner, TaskRequest, WeightTable,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Combined engine statistics.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// Decision window aggregates
    pub monitor: MonitorReport,
    /// Per-tier cache counters
    pub cache: RoutingCacheStats,
    /// Circuit breaker state
    pub circuit: CircuitSnapshot,
    /// Learner counters
    pub learner: LearnerStats,
}

/// Intelligent task router.
#[derive(Clone)]
pub struct RoutingEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: RoutingConfig,
    rules: Arc<Rulebook>,
    classifier: HierarchicalClassifier,
    detector: DomainDetector,
    confidence: ConfidenceEngine,
    escalation: EscalationEngine,
    router: OrchestrationRouter,
    cache: RoutingCache,
    breaker: Arc<CircuitBreaker>,
    monitor: PerformanceMonitor,
    learner: LearnerHandle,
    registry: Arc<dyn CapabilityRegistry>,
    planner: Arc<dyn StrategicPlanner>,
    model: Arc<dyn ScoringModel>,
    admission: Arc<Semaphore>,
}

impl RoutingEngine {
    /// Starts building an engine with default configuration and rules.
    pub fn builder() -> RoutingEngineBuilder {
        RoutingEngineBuilder::default()
    }

    /// Routes a task. Never fails: degraded conditions produce fallback or
    /// `Error` decisions.
    pub async fn route(&self, request: TaskRequest) -> RoutingDecision {
        let started = Instant::now();
        let routing_id = Uuid::new_v4();
        let inner = &self.inner;

        let mut decision = match Arc::clone(&inner.admission).try_acquire_owned() {
            Err(_) => {
                warn!(%routing_id, "no routing capacity left");
                inner.exhausted_decision(routing_id)
            }
            Ok(slot) => {
                let permit = inner.breaker.acquire();
                if permit.is_admitted() {
                    self.run_guarded(routing_id, request, permit, slot).await
                } else {
                    debug!(%routing_id, "circuit open, returning fallback");
                    inner.fallback_decision(routing_id, FallbackReason::CircuitOpen)
                }
            }
        };

        decision.decision_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        inner.monitor.record(&decision);
        if let Some(package) = decision.escalation_package.clone() {
            let planner = Arc::clone(&inner.planner);
            tokio::spawn(async move {
                let routing_id = package.routing_id;
                if let Err(error) = planner.submit(package).await {
                    warn!(%routing_id, planner = planner.id(), "escalation delivery failed: {error}");
                }
            });
        }
        decision
    }

    async fn run_guarded(
        &self,
        routing_id: Uuid,
        request: TaskRequest,
        permit: Permit<'_>,
        slot: OwnedSemaphorePermit,
    ) -> RoutingDecision {
        let inner = &self.inner;
        let pipeline = Arc::clone(inner);
        let mut handle = tokio::spawn(async move {
            let _slot = slot;
            pipeline.run_pipeline(routing_id, request).await
        });

        let deadline = Duration::from_millis(inner.config.engine.soft_deadline_ms);
        match timeout(deadline, &mut handle).await {
            Ok(Ok(Ok(decision))) => {
                inner.breaker.record_success(permit);
                decision
            }
            Ok(Ok(Err(error))) => {
                warn!(%routing_id, "routing pipeline failed: {error}");
                inner.breaker.record_failure(permit);
                inner.fallback_decision(routing_id, FallbackReason::PipelineFailure)
            }
            Ok(Err(join_error)) => {
                warn!(%routing_id, "routing pipeline aborted: {join_error}");
                inner.breaker.record_failure(permit);
                inner.fallback_decision(routing_id, FallbackReason::PipelineFailure)
            }
            Err(_) => {
                let error = RoutingError::Timeout(inner.config.engine.soft_deadline_ms);
                warn!(%routing_id, "{error}; pipeline left to finish in the background");
                inner.breaker.record_failure(permit);
                inner.fallback_decision(routing_id, FallbackReason::BudgetExceeded)
            }
        }
    }

    /// Routes several tasks concurrently, preserving order.
    pub async fn route_many(&self, requests: Vec<TaskRequest>) -> Vec<RoutingDecision> {
        let mut handles = Vec::with_capacity(requests.len());
        for request in requests {
            let engine = self.clone();
            handles.push(tokio::spawn(async move { engine.route(request).await }));
        }

        let mut decisions = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(decision) => decisions.push(decision),
                Err(error) => {
                    warn!("routing task failed: {error}");
                    let routing_id = Uuid::new_v4();
                    decisions.push(
                        self.inner
                            .fallback_decision(routing_id, FallbackReason::PipelineFailure),
                    );
                }
            }
        }
        decisions
    }

    /// Queues an execution outcome for the learner without blocking.
    ///
    /// Returns `false` when the queue is full and the outcome was dropped.
    pub fn report_outcome(&self, record: OutcomeRecord) -> bool {
        self.inner.learner.report(record)
    }

    /// Waits until every queued outcome has been applied.
    pub async fn flush_outcomes(&self) {
        self.inner.learner.flush().await;
    }

    /// Drops cached results for a description from every tier.
    ///
    /// # Errors
    /// Returns an error if the capability registry cannot be queried or a
    /// tier lock is busy
    pub async fn invalidate(&self, description: &str) -> Result<()> {
        let inner = &self.inner;
        let text = TaskText::new(description, inner.config.engine.max_description_chars);
        let candidates = inner
            .registry
            .candidates()
            .await
            .map_err(|error| RoutingError::Collaborator(error.to_string()))?;
        inner.cache.complexity.invalidate(text.cache_key("complexity"))?;
        inner.cache.domain.invalidate(text.cache_key("domain"))?;
        inner.cache.pattern.invalidate(pattern_key(&text, &candidates))?;
        Ok(())
    }

    /// Combined statistics.
    pub fn stats(&self) -> EngineStats {
        let inner = &self.inner;
        EngineStats {
            monitor: inner.monitor.report(inner.breaker.phase()),
            cache: inner.cache.stats(),
            circuit: inner.breaker.snapshot(),
            learner: inner.learner.learner().stats(),
        }
    }

    /// Monitor report alone.
    pub fn report(&self) -> MonitorReport {
        self.inner.monitor.report(self.inner.breaker.phase())
    }

    /// Current learned weights.
    pub fn weights(&self) -> Arc<WeightTable> {
        self.inner.learner.learner().weights().snapshot()
    }

    /// Replaces the learned weights.
    pub fn load_weights(&self, table: WeightTable) {
        self.inner.learner.learner().weights().replace(table);
    }

    /// Shared circuit breaker.
    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.inner.breaker
    }

    /// Shared cache tiers.
    pub fn cache(&self) -> &RoutingCache {
        &self.inner.cache
    }

    /// The learner behind the outcome queue.
    pub fn learner(&self) -> &Arc<AdaptiveLearner> {
        self.inner.learner.learner()
    }

    /// Compiled rules in use.
    pub fn rules(&self) -> &Arc<Rulebook> {
        &self.inner.rules
    }

    /// Configuration in use.
    pub fn config(&self) -> &RoutingConfig {
        &self.inner.config
    }
}

impl EngineInner {
    async fn run_pipeline(&self, routing_id: Uuid, request: TaskRequest) -> Result<RoutingDecision> {
        let started = Instant::now();
        let text = Arc::new(TaskText::new(
            &request.description,
            self.config.engine.max_description_chars,
        ));
        if text.was_truncated() {
            warn!(
                %routing_id,
                max_chars = self.config.engine.max_description_chars,
                "description truncated"
            );
        }

        let weights = self.learner.learner().weights().snapshot();
        let mut cache_hits = CacheHits::default();

        let complexity = self.classify(&text, &weights, &mut cache_hits);
        let domains = self.detect(Arc::clone(&text), &mut cache_hits).await;
        let candidates = self
            .registry
            .candidates()
            .await
            .map_err(|error| RoutingError::Collaborator(error.to_string()))?;

        let scored = self
            .confidence
            .score(&text, &domains, &candidates, request.context.len(), &weights)
            .await;
        cache_hits.pattern = scored.pattern_cache_hit;
        let breakdown = scored.breakdown;

        let features = FeatureVector::new(
            complexity.value,
            domains.domain_count(),
            breakdown.components,
            cache_hits.any(),
            text.token_count(),
        );
        let failure_risk = 1.0 - self.model.predict(&features);

        let input = EscalationInput {
            text: &text,
            complexity: &complexity,
            domains: &domains,
            confidence: &breakdown,
            candidates: &candidates,
            failure_risk,
        };
        let outcome = self.escalation.decide(&input);
        let escalation_package = (outcome.action == RoutingAction::Escalate)
            .then(|| self.escalation.build_package(routing_id, &request, &input, &outcome));

        let mut patterns: Vec<String> = complexity
            .signals
            .iter()
            .filter(|signal| !signal.contains(':'))
            .map(|signal| pattern_id(signal))
            .collect();
        patterns.sort_unstable();
        patterns.dedup();
        if let Some(best) = &breakdown.best_candidate {
            patterns.push(handler_pattern_id(best));
        }
        self.learner.learner().register(
            routing_id,
            PendingRouting::new(text.signature(), features, patterns),
        );

        let reasoning = format!(
            "{} complexity {:.2}; {} domain(s); confidence {:.2}; {}",
            complexity.label,
            complexity.value,
            domains.domain_count(),
            breakdown.total,
            outcome.reasoning
        );
        info!(
            %routing_id,
            action = %outcome.action,
            target = outcome.target.as_deref().unwrap_or("none"),
            tier = outcome.tier.map(|tier| tier.to_string()).as_deref().unwrap_or("none"),
            "task routed"
        );

        Ok(RoutingDecision {
            routing_id,
            action: outcome.action,
            target: outcome.target,
            tier: outcome.tier,
            confidence: breakdown.total,
            reasoning,
            decision_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            domains: domains.domains,
            complexity: Some(complexity),
            escalation_score: outcome.score,
            escalation_package,
            cache_hits,
            fallback: false,
            fallback_reason: None,
        })
    }

    fn classify(&self, text: &TaskText, weights: &WeightTable, hits: &mut CacheHits) -> ComplexityScore {
        let key = text.cache_key("complexity");
        match self.cache.complexity.get(key) {
            Ok(Some(score)) => {
                hits.complexity = true;
                return score;
            }
            Ok(None) => {}
            Err(error) => warn!("{error}; classifying without cache"),
        }

        let score = self.classifier.classify(text, weights);
        if let Err(error) = self.cache.complexity.insert(key, score.clone()) {
            warn!("{error}; complexity not cached");
        }
        score
    }

    async fn detect(&self, text: Arc<TaskText>, hits: &mut CacheHits) -> DomainReport {
        let key = text.cache_key("domain");
        match self.cache.domain.get(key) {
            Ok(Some(report)) => {
                hits.domain = true;
                return report;
            }
            Ok(None) => {}
            Err(error) => warn!("{error}; detecting domains without cache"),
        }

        let report = self.detector.detect(text).await;
        if report.is_complete() {
            if let Err(error) = self.cache.domain.insert(key, report.clone()) {
                warn!("{error}; domain report not cached");
            }
        }
        report
    }

    fn fallback_decision(&self, routing_id: Uuid, reason: FallbackReason) -> RoutingDecision {
        RoutingDecision {
            routing_id,
            action: RoutingAction::Orchestrate,
            target: Some(self.router.fallback_target().to_owned()),
            tier: Some(OrchestrationTier::Single),
            confidence: self.config.circuit.fallback_confidence,
            reasoning: format!("fallback decision ({reason}): conservative single-tier orchestration"),
            decision_time_ms: 0.0,
            domains: Vec::new(),
            complexity: None,
            escalation_score: 0.0,
            escalation_package: None,
            cache_hits: CacheHits::default(),
            fallback: true,
            fallback_reason: Some(reason),
        }
    }

    fn exhausted_decision(&self, routing_id: Uuid) -> RoutingDecision {
        let error = RoutingError::ResourceExhausted(format!(
            "{} routing requests already in flight",
            self.config.engine.max_in_flight
        ));
        RoutingDecision {
            routing_id,
            action: RoutingAction::Error,
            target: None,
            tier: None,
            confidence: 0.0,
            reasoning: format!("{error}; retry later or route this task manually"),
            decision_time_ms: 0.0,
            domains: Vec::new(),
            complexity: None,
            escalation_score: 0.0,
            escalation_package: None,
            cache_hits: CacheHits::default(),
            fallback: false,
            fallback_reason: None,
        }
    }
}

/// Builder for [`RoutingEngine`].
#[derive(Default)]
pub struct RoutingEngineBuilder {
    config: RoutingConfig,
    rules: Option<RuleSet>,
    registry: Option<Arc<dyn CapabilityRegistry>>,
    outcome_store: Option<Arc<dyn OutcomeStore>>,
    planner: Option<Arc<dyn StrategicPlanner>>,
    model: Option<Arc<dyn ScoringModel>>,
    weights: Option<WeightTable>,
    processors: Option<Vec<Arc<dyn DomainProcessor>>>,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl RoutingEngineBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: RoutingConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the embedded rule set.
    #[must_use]
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Sets the capability registry. Defaults to the rule set's handler catalog.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn CapabilityRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the historical outcome store. Defaults to an in-memory store.
    #[must_use]
    pub fn with_outcome_store(mut self, store: Arc<dyn OutcomeStore>) -> Self {
        self.outcome_store = Some(store);
        self
    }

    /// Sets the strategic planner. Defaults to a logging planner.
    #[must_use]
    pub fn with_planner(mut self, planner: Arc<dyn StrategicPlanner>) -> Self {
        self.planner = Some(planner);
        self
    }

    /// Sets the success-prediction model. Defaults to [`LinearScoringModel`].
    #[must_use]
    pub fn with_scoring_model(mut self, model: Arc<dyn ScoringModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Seeds the learned weights.
    #[must_use]
    pub fn with_weights(mut self, weights: WeightTable) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Replaces the rule-driven domain processors.
    #[must_use]
    pub fn with_domain_processors(mut self, processors: Vec<Arc<dyn DomainProcessor>>) -> Self {
        self.processors = Some(processors);
        self
    }

    /// Shares a circuit breaker with the engine.
    #[must_use]
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Builds the engine and starts the learner worker.
    ///
    /// # Errors
    /// Returns an error outside a tokio runtime, or if the configuration or
    /// rule set is invalid
    pub fn build(self) -> Result<RoutingEngine> {
        Handle::try_current().map_err(|error| {
            RoutingError::Other(format!("routing engine requires a tokio runtime: {error}"))
        })?;
        let config = self.config;
        config.validate()?;

        let rules = Arc::new(match &self.rules {
            Some(rules) => Rulebook::compile(rules)?,
            None => Rulebook::builtin()?,
        });
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(StaticCapabilityRegistry::from_rules(&rules)));
        let outcome_store = self
            .outcome_store
            .unwrap_or_else(|| Arc::new(InMemoryOutcomeStore::new(config.learner.ema_retain)));
        let planner = self
            .planner
            .unwrap_or_else(|| Arc::new(LoggingPlanner::new(config.tiers.planner_id.clone())));
        let model = self.model.unwrap_or_else(|| {
            Arc::new(LinearScoringModel::new(LinearModelConfig::from(&config.learner)))
        });
        let breaker = self
            .breaker
            .unwrap_or_else(|| Arc::new(CircuitBreaker::new(&config.circuit)));

        let detector = match self.processors {
            Some(processors) => DomainDetector::with_processors(&config.domains, processors),
            None => DomainDetector::from_rules(&config.domains, &rules),
        };
        let cache = RoutingCache::new(&config.cache);
        let router = OrchestrationRouter::new(config.tiers.clone());
        let classifier = HierarchicalClassifier::new(config.classifier.clone(), Arc::clone(&rules));
        let confidence = ConfidenceEngine::new(
            config.confidence.clone(),
            Arc::clone(&rules),
            Arc::clone(&outcome_store),
            Duration::from_millis(config.engine.history_timeout_ms),
            Arc::clone(&cache.pattern),
        );
        let escalation = EscalationEngine::new(
            config.escalation.clone(),
            Arc::clone(&rules),
            router.clone(),
            planner.id(),
        );
        let weights = Arc::new(WeightStore::new(self.weights.unwrap_or_default()));
        let learner = Arc::new(AdaptiveLearner::new(
            config.learner.clone(),
            weights,
            Arc::clone(&model),
            outcome_store,
            config.engine.pending_outcome_capacity,
        ));
        let learner = LearnerHandle::spawn(learner, config.learner.channel_capacity);

        info!(
            rules = rules.name(),
            version = rules.version(),
            domains = detector.processor_count(),
            "routing engine ready"
        );

        Ok(RoutingEngine {
            inner: Arc::new(EngineInner {
                admission: Arc::new(Semaphore::new(config.engine.max_in_flight.max(1))),
                monitor: PerformanceMonitor::new(config.monitor.clone()),
                config,
                rules,
                classifier,
                detector,
                confidence,
                escalation,
                router,
                cache,
                breaker,
                learner,
                registry,
                planner,
                model,
            }),
        })
    }
}
