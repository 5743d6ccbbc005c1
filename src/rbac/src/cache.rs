//! Time-bounded principal cache
//!
//! Caches a principal's effective role set and superuser status so the
//! authorization hot path does not walk the membership graph on every
//! statement. Staleness is bounded by the configured TTL; a TTL of zero
//! disables caching entirely.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a resolved principal stays valid. Zero disables the cache.
    pub ttl: Duration,

    /// Maximum number of cached principals
    pub capacity: usize,

    /// Drop entries as soon as a membership or role flag in their closure
    /// changes, instead of waiting for the TTL
    pub eager_invalidation: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::ZERO,
            capacity: 10_000,
            eager_invalidation: false,
        }
    }
}

/// Source of time for expiry decisions
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// A principal with its effective role set resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrincipal {
    pub name: String,

    /// Reflexive-transitive closure of the principal's memberships
    pub roles: BTreeSet<String>,

    /// True if any role in `roles` is a superuser
    pub is_superuser: bool,
}

impl ResolvedPrincipal {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

#[derive(Debug, Clone)]
struct CachedEntry {
    principal: ResolvedPrincipal,
    cached_at: Instant,
}

/// Principal cache with TTL expiry
pub struct PrincipalCache {
    entries: DashMap<String, CachedEntry>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    stats: DashMap<&'static str, usize>,
}

impl PrincipalCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            clock,
            stats: DashMap::new(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        !self.config.ttl.is_zero() && self.config.capacity > 0
    }

    pub fn get(&self, name: &str) -> Option<ResolvedPrincipal> {
        if !self.is_enabled() {
            return None;
        }

        let ttl = self.config.ttl;
        let now = self.clock.now();
        if let Some(entry) = self.entries.get(name) {
            if now.duration_since(entry.cached_at) >= ttl {
                drop(entry);
                // A put may have refreshed the entry since the guard was released
                self.entries
                    .remove_if(name, |_, entry| now.duration_since(entry.cached_at) >= ttl);
                self.increment_stat("expirations");
                self.increment_stat("misses");
                return None;
            }

            self.increment_stat("hits");
            return Some(entry.principal.clone());
        }

        self.increment_stat("misses");
        None
    }

    pub fn put(&self, principal: ResolvedPrincipal) {
        if !self.is_enabled() {
            return;
        }

        if self.entries.len() >= self.config.capacity && !self.entries.contains_key(&principal.name) {
            self.evict();
        }

        let entry = CachedEntry {
            principal,
            cached_at: self.clock.now(),
        };
        self.entries.insert(entry.principal.name.clone(), entry);
    }

    pub fn invalidate(&self, name: &str) {
        self.entries.remove(name);
    }

    /// Drop every entry whose closure contains `role`, if eager
    /// invalidation is configured. Otherwise entries age out on their own.
    pub fn role_changed(&self, role: &str) {
        if !self.config.eager_invalidation {
            return;
        }
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.principal.has_role(role));
        let dropped = before.saturating_sub(self.entries.len());
        if dropped > 0 {
            debug!("Invalidated {} cached principals holding {}", dropped, role);
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.stats.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.get_stat("hits"),
            misses: self.get_stat("misses"),
            expirations: self.get_stat("expirations"),
            evictions: self.get_stat("evictions"),
            entries: self.entries.len(),
        }
    }

    /// Remove expired entries, then the oldest tenth if still full
    fn evict(&self) {
        let now = self.clock.now();
        let ttl = self.config.ttl;
        self.entries.retain(|_, entry| now.duration_since(entry.cached_at) < ttl);
        if self.entries.len() < self.config.capacity {
            return;
        }

        let mut ages: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().cached_at))
            .collect();
        ages.sort_by_key(|(_, cached_at)| *cached_at);

        let to_remove = (self.config.capacity / 10).max(1);
        for (name, _) in ages.into_iter().take(to_remove) {
            self.entries.remove(&name);
            self.increment_stat("evictions");
        }
    }

    fn increment_stat(&self, key: &'static str) {
        *self.stats.entry(key).or_insert(0) += 1;
    }

    fn get_stat(&self, key: &'static str) -> usize {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    pub evictions: usize,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
