//! Many routing requests against one shared engine.

use crate::common::{ENTERPRISE_AUDIT, FULL_STACK, READ_CONFIG, SECURITY_REVIEW, engine};
use dispatch_core::{OutcomeRecord, RoutingAction, TaskRequest};
use futures::future::join_all;

const DESCRIPTIONS: [&str; 4] = [READ_CONFIG, SECURITY_REVIEW, FULL_STACK, ENTERPRISE_AUDIT];

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_routes_share_state() {
    let engine = engine();
    let requests = (0..64).map(|index| {
        let engine = engine.clone();
        let description = DESCRIPTIONS[index % DESCRIPTIONS.len()];
        async move { engine.route(TaskRequest::new(description)).await }
    });
    let decisions = join_all(requests).await;

    assert_eq!(decisions.len(), 64);
    for decision in &decisions {
        assert!(!decision.fallback, "{}", decision.reasoning);
        assert_ne!(decision.action, RoutingAction::Error);
    }
    let escalations = decisions
        .iter()
        .filter(|decision| decision.action == RoutingAction::Escalate)
        .count();
    assert_eq!(escalations, 16);

    let report = engine.report();
    assert_eq!(report.samples, 64);
    assert_eq!(report.total_recorded, 64);
    assert_eq!(report.actions.escalate, 16);

    let stats = engine.cache().complexity.stats();
    assert_eq!(stats.hits + stats.misses, 64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_route_many_preserves_order() {
    let engine = engine();
    let requests = DESCRIPTIONS
        .iter()
        .map(|description| TaskRequest::new(*description))
        .collect();
    let decisions = engine.route_many(requests).await;

    let actions: Vec<RoutingAction> = decisions.iter().map(|decision| decision.action).collect();
    assert_eq!(
        actions,
        [
            RoutingAction::Direct,
            RoutingAction::Orchestrate,
            RoutingAction::Orchestrate,
            RoutingAction::Escalate,
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_outcomes_never_block_routing() {
    let engine = engine();
    let decisions = join_all((0..32).map(|_| engine.route(TaskRequest::new(SECURITY_REVIEW)))).await;
    for decision in &decisions {
        engine.report_outcome(OutcomeRecord::new(decision.routing_id, true, 1.0, 10));
    }
    let during = engine.route(TaskRequest::new(FULL_STACK)).await;
    assert!(!during.fallback);

    engine.flush_outcomes().await;
    let stats = engine.learner().stats();
    assert_eq!(stats.outcomes_processed + stats.outcomes_dropped, 32);
}
