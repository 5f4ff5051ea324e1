//! Response cache configuration, derived from the `[cache]` settings table.

use std::num::NonZeroUsize;
use std::time::Duration;

use axum::http::StatusCode;

const DEFAULT_TTL_SECONDS: u64 = 60;
const DEFAULT_MAX_ENTRIES: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// When false the caching decorator validates and delegates without touching the store.
    pub enabled: bool,
    /// Lifetime of entries written with the store default.
    pub ttl: Duration,
    /// LRU capacity.
    pub max_entries: usize,
    /// Keep 5xx responses as well as 2xx/4xx ones.
    pub store_server_errors: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(DEFAULT_TTL_SECONDS),
            max_entries: DEFAULT_MAX_ENTRIES,
            store_server_errors: false,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ttl: Duration::from_secs(settings.ttl_seconds.get()),
            max_entries: settings.max_entries.get(),
            store_server_errors: settings.store_server_errors,
        }
    }
}

impl CacheConfig {
    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }

    /// Whether a response with `status` is a stable outcome worth keeping.
    pub fn should_store(&self, status: StatusCode) -> bool {
        status.is_success()
            || status.is_client_error()
            || (self.store_server_errors && status.is_server_error())
    }
}
