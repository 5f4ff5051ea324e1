//! In-memory TTL store.
//!
//! Entries live in an LRU bounded by `cache.max_entries`; each carries its own
//! expiry instant. Expired entries are treated as absent and removed the next
//! time they are read.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use lru::LruCache;
use metrics::counter;

use crate::application::envelope::ApiResponse;

use super::{
    METRIC_CACHE_EVICT,
    config::CacheConfig,
    keys::CacheKey,
    lock::{rw_read, rw_write},
};

const SOURCE: &str = "cache::store";

/// The store shared by every cached route.
pub type ResponseStore = CacheStore<ApiResponse>;

/// Time source for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: RwLock<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: RwLock::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *rw_write(&self.elapsed, SOURCE, "clock_advance") += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *rw_read(&self.elapsed, SOURCE, "clock_now")
    }
}

/// Lifetime of a stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    After(Duration),
    Unbounded,
}

struct Entry<V> {
    value: V,
    created_at: Instant,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| now < deadline)
    }
}

pub struct CacheStore<V> {
    entries: RwLock<LruCache<CacheKey, Entry<V>>>,
    default_ttl: Ttl,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> CacheStore<V> {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.max_entries_non_zero())),
            default_ttl: Ttl::After(config.ttl),
            clock,
        }
    }

    /// Return the live value for `key`, dropping it if it has expired.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let now = self.clock.now();
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    /// Insert or overwrite `key` with the store's default lifetime.
    pub fn set(&self, key: CacheKey, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Insert or overwrite `key`; the expiry restarts from now.
    pub fn set_with_ttl(&self, key: CacheKey, value: V, ttl: Ttl) {
        let now = self.clock.now();
        let entry = Entry {
            value,
            created_at: now,
            expires_at: match ttl {
                // A lifetime past the clock's range never expires.
                Ttl::After(lifetime) => now.checked_add(lifetime),
                Ttl::Unbounded => None,
            },
        };

        let displaced = rw_write(&self.entries, SOURCE, "set").push(key.clone(), entry);
        if let Some((evicted, old)) = displaced
            && evicted != key
        {
            counter!(METRIC_CACHE_EVICT).increment(1);
            tracing::debug!(
                cache = "response",
                key = %evicted,
                age_ms = now.saturating_duration_since(old.created_at).as_millis() as u64,
                "evicted least recently used entry"
            );
        }
    }

    /// Remove `key`; returns whether an entry was present.
    pub fn delete(&self, key: &CacheKey) -> bool {
        rw_write(&self.entries, SOURCE, "delete").pop(key).is_some()
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }

    /// Number of held entries, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
