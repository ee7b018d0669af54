//! Three-tier routing cache.
//!
//! The pattern tier holds raw candidate similarities, the domain tier holds
//! detection reports and the complexity tier holds classifier output. Each
//! tier has its own TTL, capacity and lock so a busy tier never blocks the
//! others.

mod storage;

pub use storage::{CacheEntry, CacheStats, TtlCache};

use crate::confidence::CandidateSimilarity;
use crate::domain::DomainReport;
use dispatch_core::{CacheConfig, ComplexityScore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Counters for every tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoutingCacheStats {
    /// Pattern tier
    pub pattern: CacheStats,
    /// Domain tier
    pub domain: CacheStats,
    /// Complexity tier
    pub complexity: CacheStats,
}

/// The pattern, domain and complexity tiers.
#[derive(Clone)]
pub struct RoutingCache {
    /// Candidate similarities keyed by description and candidate set
    pub pattern: Arc<TtlCache<Vec<CandidateSimilarity>>>,
    /// Domain reports keyed by description
    pub domain: Arc<TtlCache<DomainReport>>,
    /// Complexity scores keyed by description
    pub complexity: Arc<TtlCache<ComplexityScore>>,
}

impl RoutingCache {
    /// Builds all tiers; every tier is a pass-through when caching is off.
    pub fn new(config: &CacheConfig) -> Self {
        let lock_timeout = Duration::from_millis(config.lock_timeout_ms);
        let mut pattern = TtlCache::new("pattern", config.pattern, lock_timeout);
        let mut domain = TtlCache::new("domain", config.domain, lock_timeout);
        let mut complexity = TtlCache::new("complexity", config.complexity, lock_timeout);
        if !config.enabled {
            pattern = pattern.disabled();
            domain = domain.disabled();
            complexity = complexity.disabled();
        }
        Self {
            pattern: Arc::new(pattern),
            domain: Arc::new(domain),
            complexity: Arc::new(complexity),
        }
    }

    /// Snapshot of every tier's counters.
    pub fn stats(&self) -> RoutingCacheStats {
        RoutingCacheStats {
            pattern: self.pattern.stats(),
            domain: self.domain.stats(),
            complexity: self.complexity.stats(),
        }
    }

    /// Empties every tier. A tier whose lock is busy is skipped.
    pub fn clear(&self) {
        for result in [
            self.pattern.clear(),
            self.domain.clear(),
            self.complexity.clear(),
        ] {
            if let Err(error) = result {
                warn!("cache clear skipped: {error}");
            }
        }
    }

    /// Total live entries across tiers.
    pub fn len(&self) -> usize {
        self.pattern.len() + self.domain.len() + self.complexity.len()
    }

    /// Whether every tier is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
