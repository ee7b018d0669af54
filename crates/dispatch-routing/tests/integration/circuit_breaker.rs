//! Circuit breaker wrapping the routing pipeline.

use crate::common::{CountingRegistry, READ_CONFIG, SECURITY_REVIEW, engine_with_registry, test_config};
use dispatch_core::{FallbackReason, OrchestrationTier, RoutingAction, TaskRequest};
use dispatch_routing::CircuitPhase;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

#[tokio::test]
async fn test_open_circuit_skips_pipeline() {
    let registry = Arc::new(CountingRegistry::new(true));
    let engine = engine_with_registry(test_config(), &registry);
    let threshold = test_config().circuit.failure_threshold as usize;

    for attempt in 1..=threshold {
        let decision = engine.route(TaskRequest::new(SECURITY_REVIEW)).await;
        assert!(decision.fallback);
        assert_eq!(decision.fallback_reason, Some(FallbackReason::PipelineFailure));
        assert_eq!(registry.calls(), attempt);
    }
    assert_eq!(engine.circuit_breaker().phase(), CircuitPhase::Open);

    let decision = engine.route(TaskRequest::new(SECURITY_REVIEW)).await;
    assert!(decision.fallback);
    assert_eq!(decision.fallback_reason, Some(FallbackReason::CircuitOpen));
    assert_eq!(decision.action, RoutingAction::Orchestrate);
    assert_eq!(decision.tier, Some(OrchestrationTier::Single));
    assert_eq!(decision.target.as_deref(), Some("orchestrate-tasks"));
    assert_eq!(decision.confidence, test_config().circuit.fallback_confidence);
    assert_eq!(registry.calls(), threshold);

    let report = engine.report();
    assert_eq!(report.samples, threshold + 1);
    assert_eq!(report.fallback_rate, 1.0);
}

#[tokio::test]
async fn test_circuit_recovers_after_timeout() {
    let mut config = test_config();
    config.circuit.failure_threshold = 2;
    config.circuit.recovery_timeout_ms = 20;
    config.circuit.success_threshold = 2;
    let registry = Arc::new(CountingRegistry::new(true));
    let engine = engine_with_registry(config, &registry);

    engine.route(TaskRequest::new(READ_CONFIG)).await;
    engine.route(TaskRequest::new(READ_CONFIG)).await;
    assert_eq!(engine.circuit_breaker().phase(), CircuitPhase::Open);

    registry.set_failing(false);
    sleep(Duration::from_millis(40)).await;

    let trial = engine.route(TaskRequest::new(READ_CONFIG)).await;
    assert!(!trial.fallback);
    assert_eq!(engine.circuit_breaker().phase(), CircuitPhase::HalfOpen);

    let closing = engine.route(TaskRequest::new(READ_CONFIG)).await;
    assert!(!closing.fallback);
    assert_eq!(engine.circuit_breaker().phase(), CircuitPhase::Closed);

    let snapshot = engine.circuit_breaker().snapshot();
    assert_eq!(snapshot.times_opened, 1);
    assert_eq!(snapshot.times_closed, 1);
}

#[tokio::test]
async fn test_failed_trial_reopens_circuit() {
    let mut config = test_config();
    config.circuit.failure_threshold = 1;
    config.circuit.recovery_timeout_ms = 20;
    let registry = Arc::new(CountingRegistry::new(true));
    let engine = engine_with_registry(config, &registry);

    engine.route(TaskRequest::new(READ_CONFIG)).await;
    assert_eq!(engine.circuit_breaker().phase(), CircuitPhase::Open);

    sleep(Duration::from_millis(40)).await;
    let trial = engine.route(TaskRequest::new(READ_CONFIG)).await;
    assert_eq!(trial.fallback_reason, Some(FallbackReason::PipelineFailure));
    assert_eq!(engine.circuit_breaker().phase(), CircuitPhase::Open);
    assert_eq!(registry.calls(), 2);
}

#[tokio::test]
async fn test_cancelled_trial_does_not_wedge_half_open() {
    let mut config = test_config();
    config.circuit.failure_threshold = 1;
    config.circuit.recovery_timeout_ms = 10;
    let successes = config.circuit.success_threshold;
    let registry = Arc::new(CountingRegistry::new(true));
    let engine = engine_with_registry(config, &registry);

    engine.route(TaskRequest::new(READ_CONFIG)).await;
    assert_eq!(engine.circuit_breaker().phase(), CircuitPhase::Open);

    registry.set_failing(false);
    registry.set_delay(Duration::from_millis(300));
    sleep(Duration::from_millis(30)).await;
    let cancelled = timeout(
        Duration::from_millis(20),
        engine.route(TaskRequest::new(READ_CONFIG)),
    )
    .await;
    assert!(matches!(cancelled, Err(_)), "route should still be in flight");
    assert_eq!(engine.circuit_breaker().phase(), CircuitPhase::HalfOpen);

    registry.set_delay(Duration::ZERO);
    for _ in 0..successes {
        let decision = engine.route(TaskRequest::new(SECURITY_REVIEW)).await;
        assert!(!decision.fallback, "{:?}", decision.fallback_reason);
    }
    assert_eq!(engine.circuit_breaker().phase(), CircuitPhase::Closed);
}
