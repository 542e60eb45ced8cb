//! Read-through cache for catalog payloads.
//!
//! - [`TtlCache`] holds serialized JSON payloads, each with its own expiry.
//! - [`CacheTrigger`] schedules population and invalidation off the request path.
//!
//! ```toml
//! [cache]
//! enabled = true
//! ttl_seconds = 3600
//! queue_capacity = 1024
//! sweep_interval_seconds = 60
//! ```

mod config;
mod keys;
mod lock;
mod store;
mod trigger;

pub use config::CacheConfig;
pub use keys::CacheKey;
pub use store::TtlCache;
pub use trigger::{CacheCommand, CacheTrigger, CacheWorker};

/// Read-through hits, labelled by key family.
pub(crate) const METRIC_CACHE_HIT: &str = "monsterdex_cache_hit_total";
/// Read-through misses, labelled by key family.
pub(crate) const METRIC_CACHE_MISS: &str = "monsterdex_cache_miss_total";
pub(crate) const METRIC_CACHE_EVENT_DROPPED: &str = "monsterdex_cache_event_dropped_total";
pub(crate) const METRIC_CACHE_FILL_DISCARDED: &str = "monsterdex_cache_fill_discarded_total";
pub(crate) const METRIC_CACHE_ENTRIES: &str = "monsterdex_cache_entries";
