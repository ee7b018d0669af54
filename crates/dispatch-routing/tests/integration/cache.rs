//! Cache tiers through the engine.

use crate::common::{FULL_STACK, READ_CONFIG, SECURITY_REVIEW, engine, init_tracing, test_config};
use dispatch_core::TaskRequest;
use dispatch_routing::{RoutingEngine, TtlCache};
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test]
async fn test_value_round_trips_until_expiry() {
    let tier: TtlCache<String> =
        TtlCache::with_ttl("round-trip", Duration::from_millis(30), 8, Duration::from_millis(10));
    tier.insert(7, "value".to_owned()).expect("insert");
    assert_eq!(tier.get(7).expect("get"), Some("value".to_owned()));

    sleep(Duration::from_millis(50)).await;
    assert_eq!(tier.get(7).expect("get"), None);
    let stats = tier.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.expirations, 1);
}

#[tokio::test]
async fn test_every_tier_serves_repeat() {
    let engine = engine();
    engine.route(TaskRequest::new(SECURITY_REVIEW)).await;
    let repeat = engine.route(TaskRequest::new(SECURITY_REVIEW)).await;

    assert!(repeat.cache_hits.complexity);
    assert!(repeat.cache_hits.domain);
    assert!(repeat.cache_hits.pattern);

    let stats = engine.cache().stats();
    assert_eq!(stats.complexity.hits, 1);
    assert_eq!(stats.domain.hits, 1);
    assert_eq!(stats.pattern.hits, 1);
}

#[tokio::test]
async fn test_whitespace_and_case_share_entries() {
    let engine = engine();
    engine.route(TaskRequest::new(FULL_STACK)).await;
    let shouted = FULL_STACK.to_uppercase().replace(' ', "   ");
    let repeat = engine.route(TaskRequest::new(shouted)).await;
    assert!(repeat.cache_hits.complexity);
    assert!(repeat.cache_hits.domain);
}

#[tokio::test]
async fn test_disabled_cache_always_recomputes() {
    init_tracing();
    let mut config = test_config();
    config.cache.enabled = false;
    let engine = RoutingEngine::builder()
        .with_config(config)
        .build()
        .expect("engine");

    engine.route(TaskRequest::new(READ_CONFIG)).await;
    let repeat = engine.route(TaskRequest::new(READ_CONFIG)).await;
    assert!(!repeat.cache_hits.any());
    assert!(engine.cache().is_empty());
}

#[tokio::test]
async fn test_invalidate_drops_every_tier() {
    let engine = engine();
    engine.route(TaskRequest::new(SECURITY_REVIEW)).await;
    assert!(!engine.cache().is_empty());

    engine.invalidate(SECURITY_REVIEW).await.expect("invalidate");
    assert!(engine.cache().is_empty());

    let decision = engine.route(TaskRequest::new(SECURITY_REVIEW)).await;
    assert!(!decision.cache_hits.any());
}
