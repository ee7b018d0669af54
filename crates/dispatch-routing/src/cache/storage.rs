//! Bounded TTL store backing one cache tier.
//!
//! Expiry is passive (checked on read and before eviction) and capacity
//! pressure evicts the least recently used entry. Each tier owns one lock;
//! callers that cannot get it within the lock timeout bypass the cache.

use crate::error::{Result, RoutingError};
use dispatch_core::CacheTierConfig;
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A stored value with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Hashed key
    pub key: u64,
    /// Stored value
    pub value: V,
    /// When the entry was written
    pub inserted_at: Instant,
    /// Lifetime from `inserted_at`
    pub ttl: Duration,
    /// Hits served by this entry
    pub access_count: u64,
    last_access: u64,
}

impl<V> CacheEntry<V> {
    /// Checks if this entry has expired at `now`
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }
}

/// Counters for one tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Live entries
    pub entries: usize,
    /// Reads served from the tier
    pub hits: u64,
    /// Reads that found nothing usable
    pub misses: u64,
    /// Writes
    pub insertions: u64,
    /// Entries removed for capacity
    pub evictions: u64,
    /// Entries removed because their TTL elapsed
    pub expirations: u64,
    /// Entries removed on request
    pub invalidations: u64,
}

impl CacheStats {
    /// Hits over lookups, zero before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

struct TierState<V> {
    entries: HashMap<u64, CacheEntry<V>>,
    tick: u64,
    stats: CacheStats,
}

/// One bounded, TTL-based cache tier.
pub struct TtlCache<V> {
    name: &'static str,
    ttl: Duration,
    capacity: usize,
    lock_timeout: Duration,
    enabled: bool,
    state: Mutex<TierState<V>>,
}

impl<V: Clone> TtlCache<V> {
    /// Creates a tier from its configuration.
    pub fn new(name: &'static str, config: CacheTierConfig, lock_timeout: Duration) -> Self {
        Self::with_ttl(
            name,
            Duration::from_secs(config.ttl_secs),
            config.capacity,
            lock_timeout,
        )
    }

    /// Creates a tier with an explicit TTL.
    pub fn with_ttl(
        name: &'static str,
        ttl: Duration,
        capacity: usize,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            name,
            ttl,
            capacity,
            lock_timeout,
            enabled: true,
            state: Mutex::new(TierState {
                entries: HashMap::new(),
                tick: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Turns the tier into a pass-through that never stores anything.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Tier name used in logs and errors.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the tier stores values.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn lock(&self) -> Result<MutexGuard<'_, TierState<V>>> {
        self.state
            .try_lock_for(self.lock_timeout)
            .ok_or(RoutingError::CacheUnavailable { tier: self.name })
    }

    /// Returns a stored value if present and unexpired.
    ///
    /// # Errors
    /// Returns `CacheUnavailable` if the tier lock cannot be acquired in time
    pub fn get(&self, key: u64) -> Result<Option<V>> {
        if !self.enabled {
            return Ok(None);
        }
        let mut guard = self.lock()?;
        let state = &mut *guard;
        state.tick += 1;
        let tick = state.tick;
        let now = Instant::now();

        let expired = match state.entries.get_mut(&key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.access_count += 1;
                entry.last_access = tick;
                state.stats.hits += 1;
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            state.entries.remove(&key);
            state.stats.expirations += 1;
        }
        state.stats.misses += 1;
        Ok(None)
    }

    /// Stores a value, evicting if the tier is full.
    ///
    /// # Errors
    /// Returns `CacheUnavailable` if the tier lock cannot be acquired in time
    pub fn insert(&self, key: u64, value: V) -> Result<()> {
        if !self.enabled || self.capacity == 0 {
            return Ok(());
        }
        let mut guard = self.lock()?;
        let state = &mut *guard;
        state.tick += 1;
        let now = Instant::now();

        if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
            let before = state.entries.len();
            state.entries.retain(|_, entry| !entry.is_expired(now));
            state.stats.expirations += (before - state.entries.len()) as u64;

            if state.entries.len() >= self.capacity {
                Self::evict_least_recent(state);
            }
        }

        state.entries.insert(
            key,
            CacheEntry {
                key,
                value,
                inserted_at: now,
                ttl: self.ttl,
                access_count: 0,
                last_access: state.tick,
            },
        );
        state.stats.insertions += 1;
        Ok(())
    }

    fn evict_least_recent(state: &mut TierState<V>) {
        if let Some(oldest_key) = state
            .entries
            .values()
            .min_by_key(|entry| entry.last_access)
            .map(|entry| entry.key)
        {
            state.entries.remove(&oldest_key);
            state.stats.evictions += 1;
        }
    }

    /// Removes one entry.
    ///
    /// # Errors
    /// Returns `CacheUnavailable` if the tier lock cannot be acquired in time
    pub fn invalidate(&self, key: u64) -> Result<bool> {
        let mut guard = self.lock()?;
        let removed = guard.entries.remove(&key).is_some();
        if removed {
            guard.stats.invalidations += 1;
        }
        Ok(removed)
    }

    /// Drops every entry, keeping the counters.
    ///
    /// # Errors
    /// Returns `CacheUnavailable` if the tier lock cannot be acquired in time
    pub fn clear(&self) -> Result<()> {
        let mut guard = self.lock()?;
        let cleared = guard.entries.len() as u64;
        guard.entries.clear();
        guard.stats.invalidations += cleared;
        Ok(())
    }

    /// Hit count of a live entry.
    pub fn access_count(&self, key: u64) -> Option<u64> {
        self.state.lock().entries.get(&key).map(|entry| entry.access_count)
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether the tier holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the tier counters.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.entries.len(),
            ..state.stats
        }
    }
}
