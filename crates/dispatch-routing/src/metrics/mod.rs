//! Decision monitoring and health reporting.
//!
//! The collector keeps a bounded rolling window of decision samples; the
//! reporter turns a window into latency percentiles, rates and a health
//! status.

/// Rolling decision window
pub mod collector;
/// Report generation
pub mod reporter;

pub use collector::{DecisionSample, PerformanceMonitor};
pub use reporter::{ActionBreakdown, HealthStatus, MonitorReport};
