//! Report generation for the decision window.

use super::collector::DecisionSample;
use crate::circuit::CircuitPhase;
use dispatch_core::{MonitorConfig, RoutingAction};
use serde::Serialize;
use std::fmt::{self, Error as FmtError, Write as _};

/// Decisions per action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionBreakdown {
    /// Direct dispatches
    pub direct: usize,
    /// Orchestrations
    pub orchestrate: usize,
    /// Escalations
    pub escalate: usize,
    /// Explicit errors
    pub error: usize,
}

/// Overall health derived from alerts and the circuit phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    /// No alert fired and the circuit is closed
    Healthy,
    /// One alert fired or the circuit is probing recovery
    Degraded,
    /// Several alerts fired or the circuit is open
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        };
        write!(formatter, "{name}")
    }
}

/// Aggregates over the rolling window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorReport {
    /// Samples in the window
    pub samples: usize,
    /// Decisions recorded since start
    pub total_recorded: u64,
    /// Mean decision latency
    pub mean_latency_ms: f64,
    /// Median decision latency
    pub p50_latency_ms: f64,
    /// 95th percentile latency
    pub p95_latency_ms: f64,
    /// 99th percentile latency
    pub p99_latency_ms: f64,
    /// Share of decisions served by any cache tier
    pub cache_hit_rate: f64,
    /// Share of escalations
    pub escalation_rate: f64,
    /// Share of fallback decisions
    pub fallback_rate: f64,
    /// Mean decision confidence
    pub mean_confidence: f64,
    /// Mean detected domains
    pub mean_domain_count: f64,
    /// Decisions per action
    pub actions: ActionBreakdown,
    /// Explicit error decisions
    pub error_count: usize,
    /// Alerts that fired
    pub alerts: Vec<String>,
    /// Circuit phase at report time
    pub circuit_phase: CircuitPhase,
    /// Overall health
    pub health: HealthStatus,
}

impl MonitorReport {
    /// Builds a report from a window of samples.
    pub fn from_samples(
        samples: &[DecisionSample],
        config: &MonitorConfig,
        circuit_phase: CircuitPhase,
        total_recorded: u64,
    ) -> Self {
        let count = samples.len();
        let mut latencies: Vec<f64> = samples.iter().map(|sample| sample.latency_ms).collect();
        latencies.sort_by(f64::total_cmp);

        let mut actions = ActionBreakdown::default();
        for sample in samples {
            match sample.action {
                RoutingAction::Direct => actions.direct += 1,
                RoutingAction::Orchestrate => actions.orchestrate += 1,
                RoutingAction::Escalate => actions.escalate += 1,
                RoutingAction::Error => actions.error += 1,
            }
        }

        let share = |matches: usize| {
            if count == 0 {
                0.0
            } else {
                matches as f64 / count as f64
            }
        };
        let mean = |total: f64| if count == 0 { 0.0 } else { total / count as f64 };

        let mut report = Self {
            samples: count,
            total_recorded,
            mean_latency_ms: mean(latencies.iter().sum()),
            p50_latency_ms: percentile(&latencies, 0.50),
            p95_latency_ms: percentile(&latencies, 0.95),
            p99_latency_ms: percentile(&latencies, 0.99),
            cache_hit_rate: share(samples.iter().filter(|sample| sample.cache_hits.any()).count()),
            escalation_rate: share(actions.escalate),
            fallback_rate: share(samples.iter().filter(|sample| sample.fallback).count()),
            mean_confidence: mean(samples.iter().map(|sample| sample.confidence).sum()),
            mean_domain_count: mean(samples.iter().map(|sample| sample.domain_count as f64).sum()),
            actions,
            error_count: actions.error,
            alerts: Vec::new(),
            circuit_phase,
            health: HealthStatus::Healthy,
        };
        report.alerts = report.check_alerts(config);
        report.health = report.derive_health();
        report
    }

    fn check_alerts(&self, config: &MonitorConfig) -> Vec<String> {
        let mut alerts = Vec::new();
        if self.samples == 0 {
            return alerts;
        }
        if self.mean_latency_ms > config.alert_mean_latency_ms {
            alerts.push(format!(
                "mean latency {:.1}ms above {:.1}ms",
                self.mean_latency_ms, config.alert_mean_latency_ms
            ));
        }
        if self.p99_latency_ms > config.alert_p99_latency_ms {
            alerts.push(format!(
                "p99 latency {:.1}ms above {:.1}ms",
                self.p99_latency_ms, config.alert_p99_latency_ms
            ));
        }
        if self.samples >= config.min_samples_for_alerts {
            if self.fallback_rate > config.alert_fallback_rate {
                alerts.push(format!(
                    "fallback rate {:.1}% above {:.1}%",
                    self.fallback_rate * 100.0,
                    config.alert_fallback_rate * 100.0
                ));
            }
            if self.cache_hit_rate < config.alert_cache_hit_floor {
                alerts.push(format!(
                    "cache hit rate {:.1}% below {:.1}%",
                    self.cache_hit_rate * 100.0,
                    config.alert_cache_hit_floor * 100.0
                ));
            }
        }
        alerts
    }

    fn derive_health(&self) -> HealthStatus {
        match (self.circuit_phase, self.alerts.len()) {
            (CircuitPhase::Open, _) | (_, 2..) => HealthStatus::Unhealthy,
            (CircuitPhase::HalfOpen, _) | (_, 1) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }

    /// Formats a report as a human-readable string
    ///
    /// # Errors
    /// Returns an error if formatting fails
    pub fn format_report(&self) -> Result<String, FmtError> {
        let mut output = String::new();

        writeln!(output, "Decisions: {} (window {})", self.total_recorded, self.samples)?;
        writeln!(
            output,
            "Latency: mean {:.2}ms, p50 {:.2}ms, p95 {:.2}ms, p99 {:.2}ms",
            self.mean_latency_ms, self.p50_latency_ms, self.p95_latency_ms, self.p99_latency_ms
        )?;
        writeln!(output, "Cache Hit Rate: {:.1}%", self.cache_hit_rate * 100.0)?;
        writeln!(output, "Escalation Rate: {:.1}%", self.escalation_rate * 100.0)?;
        writeln!(output, "Fallback Rate: {:.1}%", self.fallback_rate * 100.0)?;
        writeln!(
            output,
            "Actions: {} direct, {} orchestrate, {} escalate, {} error",
            self.actions.direct, self.actions.orchestrate, self.actions.escalate, self.actions.error
        )?;
        writeln!(output, "Circuit: {}", self.circuit_phase)?;
        writeln!(output, "Health: {}", self.health)?;
        for alert in &self.alerts {
            writeln!(output, "  alert: {alert}")?;
        }

        Ok(output)
    }
}

/// Nearest-rank percentile of sorted values.
fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (quantile * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
