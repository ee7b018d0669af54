//! Rolling window of routing decisions.

use super::reporter::MonitorReport;
use crate::circuit::CircuitPhase;
use dispatch_core::{CacheHits, MonitorConfig, RoutingAction, RoutingDecision};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// What the monitor keeps about one decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DecisionSample {
    /// Time spent deciding
    pub latency_ms: f64,
    /// Chosen action
    pub action: RoutingAction,
    /// Decision confidence
    pub confidence: f64,
    /// Cache tiers that served the decision
    pub cache_hits: CacheHits,
    /// Detected domains
    pub domain_count: usize,
    /// Degraded-mode decision
    pub fallback: bool,
}

impl From<&RoutingDecision> for DecisionSample {
    fn from(decision: &RoutingDecision) -> Self {
        Self {
            latency_ms: decision.decision_time_ms,
            action: decision.action,
            confidence: decision.confidence,
            cache_hits: decision.cache_hits,
            domain_count: decision.domain_count(),
            fallback: decision.fallback,
        }
    }
}

/// Records every decision into a bounded window.
pub struct PerformanceMonitor {
    config: MonitorConfig,
    window: Mutex<VecDeque<DecisionSample>>,
    total_recorded: AtomicU64,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl PerformanceMonitor {
    /// Creates a monitor with the given window size and alert thresholds.
    pub fn new(config: MonitorConfig) -> Self {
        let capacity = config.window_size.max(1);
        Self {
            config,
            window: Mutex::new(VecDeque::with_capacity(capacity)),
            total_recorded: AtomicU64::new(0),
        }
    }

    /// Records a decision.
    pub fn record(&self, decision: &RoutingDecision) {
        self.record_sample(DecisionSample::from(decision));
    }

    /// Records a sample, dropping the oldest one when the window is full.
    pub fn record_sample(&self, sample: DecisionSample) {
        let capacity = self.config.window_size.max(1);
        let mut window = self.window.lock();
        while window.len() >= capacity {
            window.pop_front();
        }
        window.push_back(sample);
        self.total_recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy of the current window, oldest first.
    pub fn samples(&self) -> Vec<DecisionSample> {
        self.window.lock().iter().copied().collect()
    }

    /// Decisions recorded since creation, including evicted ones.
    pub fn total_recorded(&self) -> u64 {
        self.total_recorded.load(Ordering::Relaxed)
    }

    /// Samples in the window.
    pub fn len(&self) -> usize {
        self.window.lock().len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empties the window.
    pub fn clear(&self) {
        self.window.lock().clear();
    }

    /// Aggregates the window; `phase` feeds the health status.
    pub fn report(&self, phase: CircuitPhase) -> MonitorReport {
        let samples = self.samples();
        MonitorReport::from_samples(&samples, &self.config, phase, self.total_recorded())
    }
}
