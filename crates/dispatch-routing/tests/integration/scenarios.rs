//! The literal routing scenarios.

use crate::common::{
    CollectingPlanner, ENTERPRISE_AUDIT, FULL_STACK, READ_CONFIG, SECURITY_REVIEW, engine,
    init_tracing, test_config,
};
use dispatch_core::{
    ComplexityLabel, EscalationTrigger, OrchestrationTier, RoutingAction, StrategicPlanner,
    TaskRequest,
};
use dispatch_routing::RoutingEngine;
use std::sync::Arc;

#[tokio::test]
async fn test_simple_read_is_direct_without_target() {
    let engine = engine();
    let decision = engine.route(TaskRequest::new(READ_CONFIG)).await;

    assert_eq!(decision.action, RoutingAction::Direct);
    assert_eq!(decision.target, None);
    assert!(decision.domains.is_empty());
    assert!(!decision.fallback);
    assert_eq!(
        decision.complexity.as_ref().map(|score| score.label),
        Some(ComplexityLabel::Simple)
    );
}

#[tokio::test]
async fn test_security_review_orchestrates_single_tier() {
    let engine = engine();
    let decision = engine.route(TaskRequest::new(SECURITY_REVIEW)).await;

    assert_eq!(decision.action, RoutingAction::Orchestrate);
    assert_eq!(decision.tier, Some(OrchestrationTier::Single));
    assert_eq!(decision.target.as_deref(), Some("orchestrate-tasks"));
    assert_eq!(decision.domain_count(), 1);
    assert!(decision.has_domain("security"));
}

#[tokio::test]
async fn test_full_stack_orchestrates_advanced_tier() {
    let engine = engine();
    let decision = engine.route(TaskRequest::new(FULL_STACK)).await;

    assert_eq!(decision.action, RoutingAction::Orchestrate);
    assert_eq!(decision.tier, Some(OrchestrationTier::Advanced));
    assert_eq!(decision.target.as_deref(), Some("orchestrate-agents-advanced"));
    for domain in ["frontend", "backend", "security"] {
        assert!(decision.has_domain(domain), "missing domain {domain}");
    }
    assert!(decision.confidence > 0.6);
}

#[tokio::test]
async fn test_enterprise_audit_escalates_with_package() {
    init_tracing();
    let planner = Arc::new(CollectingPlanner::default());
    let engine = RoutingEngine::builder()
        .with_config(test_config())
        .with_planner(Arc::clone(&planner) as Arc<dyn StrategicPlanner>)
        .build()
        .expect("engine");

    let request = TaskRequest::new(ENTERPRISE_AUDIT).with_context("team", "platform");
    let decision = engine.route(request).await;

    assert_eq!(decision.action, RoutingAction::Escalate);
    assert_eq!(decision.target.as_deref(), Some("test-planner"));
    let package = decision.escalation_package.as_ref().expect("package attached");
    assert!(package.domains.len() >= 3);
    assert!(package.requirements.enterprise_scope);
    assert!(package.triggers.contains(&EscalationTrigger::EnterpriseScope));
    assert_eq!(package.context.get("team").map(String::as_str), Some("platform"));
    assert!(!package.recommended_approach.is_empty());

    let delivered = planner.wait_for(1).await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].routing_id, decision.routing_id);
}

#[tokio::test]
async fn test_repeated_request_hits_complexity_cache() {
    let engine = engine();
    let first = engine.route(TaskRequest::new(READ_CONFIG)).await;
    assert!(!first.cache_hits.complexity);
    let misses = engine.cache().complexity.stats().misses;

    let second = engine.route(TaskRequest::new(READ_CONFIG)).await;
    assert!(second.cache_hits.complexity);
    assert_eq!(second.action, first.action);
    assert_eq!(second.complexity, first.complexity);

    let stats = engine.cache().complexity.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, misses);
    assert_eq!(stats.insertions, 1);
}
