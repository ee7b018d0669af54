//! Outcome feedback and the adaptive learner.

use crate::common::{FULL_STACK, READ_CONFIG, SECURITY_REVIEW, engine, init_tracing, test_config};
use dispatch_core::{MAX_PATTERN_WEIGHT, OutcomeRecord, TaskRequest, WeightTable};
use dispatch_routing::RoutingEngine;
use uuid::Uuid;

#[tokio::test]
async fn test_success_raises_pattern_weights() {
    let engine = engine();
    let decision = engine.route(TaskRequest::new(SECURITY_REVIEW)).await;
    assert!(engine.report_outcome(OutcomeRecord::new(decision.routing_id, true, 1.0, 1_200)));
    engine.flush_outcomes().await;

    let weights = engine.weights();
    let patterns = weights.patterns();
    assert!(!patterns.is_empty());
    assert!(patterns.iter().all(|pattern| pattern.multiplier > 1.0));
    assert_eq!(weights.difficulty_entries(), 1);

    let stats = engine.learner().stats();
    assert_eq!(stats.outcomes_processed, 1);
    assert_eq!(stats.pending, 0);
    assert_eq!(engine.learner().archived().len(), 1);
}

#[tokio::test]
async fn test_failure_lowers_pattern_weights() {
    let engine = engine();
    let decision = engine.route(TaskRequest::new(SECURITY_REVIEW)).await;
    engine.report_outcome(OutcomeRecord::new(decision.routing_id, false, 0.0, 900));
    engine.flush_outcomes().await;

    let weights = engine.weights();
    assert!(weights.patterns().iter().all(|pattern| pattern.multiplier < 1.0));
}

#[tokio::test]
async fn test_duplicate_and_unknown_outcomes_are_ignored() {
    let engine = engine();
    let decision = engine.route(TaskRequest::new(READ_CONFIG)).await;
    let record = OutcomeRecord::new(decision.routing_id, true, 0.9, 100);
    engine.report_outcome(record.clone());
    engine.report_outcome(record);
    engine.report_outcome(OutcomeRecord::new(Uuid::new_v4(), true, 1.0, 100));
    engine.flush_outcomes().await;

    let stats = engine.learner().stats();
    assert_eq!(stats.outcomes_processed, 1);
    assert_eq!(stats.outcomes_ignored, 2);
}

#[tokio::test]
async fn test_multipliers_stay_bounded() {
    let engine = engine();
    for _ in 0..60 {
        let decision = engine.route(TaskRequest::new(FULL_STACK)).await;
        engine.report_outcome(OutcomeRecord::new(decision.routing_id, true, 1.0, 50));
    }
    engine.flush_outcomes().await;

    for pattern in engine.weights().patterns() {
        assert!(pattern.multiplier <= MAX_PATTERN_WEIGHT, "{}", pattern.pattern_id);
    }
}

#[tokio::test]
async fn test_periodic_retrain_runs() {
    init_tracing();
    let mut config = test_config();
    config.learner.retrain_every = 4;
    config.learner.min_training_samples = 4;
    let engine = RoutingEngine::builder()
        .with_config(config)
        .build()
        .expect("engine");

    let descriptions = [READ_CONFIG, SECURITY_REVIEW, FULL_STACK, "Rename the helper module"];
    for (index, description) in descriptions.into_iter().enumerate() {
        let decision = engine.route(TaskRequest::new(description)).await;
        engine.report_outcome(OutcomeRecord::new(decision.routing_id, index % 2 == 0, 0.8, 10));
    }
    engine.flush_outcomes().await;

    let stats = engine.learner().stats();
    assert_eq!(stats.retrains, 1);
    assert_eq!(stats.retrain_failures, 0);
    assert_eq!(stats.training_samples, 4);
}

#[tokio::test]
async fn test_seeded_weights_are_used() {
    init_tracing();
    let mut seeded = WeightTable::default();
    seeded.nudge("handler:security-auditor", 0.5);
    let engine = RoutingEngine::builder()
        .with_config(test_config())
        .with_weights(seeded)
        .build()
        .expect("engine");

    assert_eq!(engine.weights().multiplier("handler:security-auditor"), 1.5);
    let decision = engine.route(TaskRequest::new(SECURITY_REVIEW)).await;
    assert!(!decision.fallback);
}
