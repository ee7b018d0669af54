//! Shared helpers for dispatch-routing integration tests
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use async_trait::async_trait;
use dispatch_core::{
    CapabilityRegistry, Error as CoreError, EscalationPackage, HandlerCapability,
    Result as CoreResult, RoutingConfig, RuleSet, StrategicPlanner,
};
use dispatch_routing::RoutingEngine;
use parking_lot::Mutex;
use std::env;
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing_subscriber::{EnvFilter, fmt};

/// Scenario 1: a single-step read task
pub const READ_CONFIG: &str = "Read this config file and extract database settings";
/// Scenario 2: one clearly matched domain
pub const SECURITY_REVIEW: &str = "Review this code for security vulnerabilities";
/// Scenario 3: several domains at once
pub const FULL_STACK: &str =
    "I need full-stack development with security audit and performance optimization";
/// Scenario 4: enterprise scope
pub const ENTERPRISE_AUDIT: &str = "Complete enterprise security audit, architecture review, performance optimization, and modernization";

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests (idempotent).
/// Honors `RUST_LOG` if set, otherwise stays at "warn".
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_owned());
        if fmt()
            .with_env_filter(EnvFilter::new(filter))
            .with_test_writer()
            .try_init()
            .is_err()
        {
            // another test binary already installed a subscriber
        }
    });
}

/// Default configuration with budgets loose enough for unoptimized builds.
pub fn test_config() -> RoutingConfig {
    let mut config = RoutingConfig::default();
    config.engine.soft_deadline_ms = 2_000;
    config.engine.history_timeout_ms = 50;
    config.domains.per_domain_budget_ms = 500;
    config.cache.lock_timeout_ms = 50;
    config
}

/// Engine over the builtin rules with the test configuration.
pub fn engine() -> RoutingEngine {
    init_tracing();
    RoutingEngine::builder()
        .with_config(test_config())
        .build()
        .expect("engine builds")
}

/// Planner that keeps every package it receives.
#[derive(Default)]
pub struct CollectingPlanner {
    packages: Mutex<Vec<EscalationPackage>>,
}

impl CollectingPlanner {
    /// Packages received so far
    pub fn packages(&self) -> Vec<EscalationPackage> {
        self.packages.lock().clone()
    }

    /// Waits up to one second for `count` packages.
    pub async fn wait_for(&self, count: usize) -> Vec<EscalationPackage> {
        let deadline = Instant::now() + Duration::from_secs(1);
        while Instant::now() < deadline {
            if self.packages.lock().len() >= count {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        self.packages()
    }
}

#[async_trait]
impl StrategicPlanner for CollectingPlanner {
    fn id(&self) -> &str {
        "test-planner"
    }

    async fn submit(&self, package: EscalationPackage) -> CoreResult<()> {
        self.packages.lock().push(package);
        Ok(())
    }
}

/// Registry that counts lookups and can be switched into failing or slow.
pub struct CountingRegistry {
    handlers: Vec<HandlerCapability>,
    calls: AtomicUsize,
    failing: AtomicBool,
    delay_ms: AtomicU64,
}

impl CountingRegistry {
    /// Registry over the builtin handler catalog
    pub fn new(failing: bool) -> Self {
        let handlers = RuleSet::builtin()
            .expect("builtin rules")
            .handler_capabilities();
        Self {
            handlers,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(failing),
            delay_ms: AtomicU64::new(0),
        }
    }

    /// Number of lookups served
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Switches lookups between failing and succeeding
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delays every lookup by `delay`
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl CapabilityRegistry for CountingRegistry {
    async fn candidates(&self) -> CoreResult<Vec<HandlerCapability>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CoreError::Collaborator("registry unreachable".to_owned()));
        }
        Ok(self.handlers.clone())
    }
}

/// Engine wired to a counting registry.
pub fn engine_with_registry(
    config: RoutingConfig,
    registry: &Arc<CountingRegistry>,
) -> RoutingEngine {
    init_tracing();
    RoutingEngine::builder()
        .with_config(config)
        .with_registry(Arc::clone(registry) as Arc<dyn CapabilityRegistry>)
        .build()
        .expect("engine builds")
}
