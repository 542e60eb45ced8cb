//! Cache configuration.

use std::time::Duration;

const DEFAULT_TTL_SECS: u64 = 60 * 60;
const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Serve unfiltered and detail reads from the cache.
    pub enabled: bool,
    /// Fixed lifetime of every entry.
    pub ttl_seconds: u64,
    /// Pending populate/invalidate commands before new ones are dropped.
    pub queue_capacity: usize,
    /// How often the worker purges expired entries.
    pub sweep_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: DEFAULT_TTL_SECS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ttl_seconds: settings.ttl.as_secs(),
            queue_capacity: settings.queue_capacity.get(),
            sweep_interval_seconds: settings.sweep_interval.as_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }

    /// Queue capacity clamped to at least one slot.
    pub fn queue_capacity_non_zero(&self) -> usize {
        self.queue_capacity.max(1)
    }
}
