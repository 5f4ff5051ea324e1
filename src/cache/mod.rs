//! Response cache.
//!
//! A single [`ResponseStore`] is built at startup and shared by every cached
//! route and by the admin invalidation endpoints. Each route handler is wrapped
//! in a [`CachingHandler`].
//!
//! ```toml
//! [cache]
//! enabled = true
//! ttl_seconds = 60
//! max_entries = 1000
//! store_server_errors = false
//! ```

mod config;
mod handler;
mod keys;
mod lock;
mod store;

pub use config::CacheConfig;
pub use handler::CachingHandler;
pub use keys::CacheKey;
pub use store::{CacheStore, Clock, ManualClock, ResponseStore, SystemClock, Ttl};

pub const METRIC_CACHE_HIT: &str = "helldivers_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "helldivers_cache_miss_total";
pub const METRIC_CACHE_STORE: &str = "helldivers_cache_store_total";
pub const METRIC_CACHE_SKIP: &str = "helldivers_cache_skip_total";
pub const METRIC_CACHE_EVICT: &str = "helldivers_cache_evict_total";
