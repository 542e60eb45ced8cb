//! In-memory TTL store for serialized read payloads.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

/// Far enough out that an overflowing TTL behaves as "never expires" for a process lifetime.
const MAX_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 365);

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Bytes,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(value: Bytes, ttl: Duration) -> Self {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl.min(MAX_TTL))
            .unwrap_or(now + MAX_TTL);
        Self { value, expires_at }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Default)]
struct Slots {
    entries: HashMap<String, CacheEntry>,
    /// Bumped on every removal of a key. Absent means zero.
    generations: HashMap<String, u64>,
}

/// Process-wide key/value cache with per-entry expiry.
///
/// Entries expire purely by elapsed time. There is no capacity bound and no sliding
/// expiration; an expired entry reads as absent and is dropped on the next access or sweep.
///
/// Each key also carries a generation that [`TtlCache::remove`] advances. A reader that
/// captured [`TtlCache::generation`] before loading from the store can publish its result
/// with [`TtlCache::set_if_generation`], which refuses the write once the key has been
/// invalidated in between.
#[derive(Debug, Default)]
pub struct TtlCache {
    slots: RwLock<Slots>,
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        {
            let slots = rw_read(&self.slots, SOURCE, "get");
            match slots.entries.get(key) {
                Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut slots = rw_write(&self.slots, SOURCE, "get.expire");
        if slots.entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            slots.entries.remove(key);
        }
        None
    }

    /// Insert or overwrite `key`. Overwriting restarts the expiry clock.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: Bytes, ttl: Duration) {
        rw_write(&self.slots, SOURCE, "set_with_ttl")
            .entries
            .insert(key.into(), CacheEntry::new(value, ttl));
    }

    /// Insert `key` only if it has not been removed since `generation` was observed.
    ///
    /// Returns whether the value was written.
    pub fn set_if_generation(
        &self,
        key: impl Into<String>,
        value: Bytes,
        ttl: Duration,
        generation: u64,
    ) -> bool {
        let key = key.into();
        let mut slots = rw_write(&self.slots, SOURCE, "set_if_generation");
        let current = slots.generations.get(&key).copied().unwrap_or(0);
        if current != generation {
            return false;
        }
        slots.entries.insert(key, CacheEntry::new(value, ttl));
        true
    }

    /// Drop `key` and advance its generation. Removing an absent key still advances it.
    pub fn remove(&self, key: &str) {
        let mut slots = rw_write(&self.slots, SOURCE, "remove");
        slots.entries.remove(key);
        let generation = slots.generations.entry(key.to_string()).or_insert(0);
        *generation = generation.wrapping_add(1);
    }

    /// Current generation of `key`, for a later [`TtlCache::set_if_generation`].
    pub fn generation(&self, key: &str) -> u64 {
        rw_read(&self.slots, SOURCE, "generation")
            .generations
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = rw_write(&self.slots, SOURCE, "purge_expired");
        let before = slots.entries.len();
        slots.entries.retain(|_, entry| entry.is_live(now));
        before - slots.entries.len()
    }

    /// Number of stored entries, expired ones included until they are purged.
    pub fn len(&self) -> usize {
        rw_read(&self.slots, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
