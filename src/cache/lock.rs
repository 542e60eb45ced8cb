//! Poison-tolerant access to the [`TtlCache`](super::TtlCache) slots.
//!
//! A panic while the lock is held can leave a half-applied insert or removal behind.
//! Such entries still expire on their TTL.

use std::sync::{LockResult, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

const POISON_HINT: &str = "a payload or key generation may predate the panicking write; \
     TTL expiry and the next invalidation repair it";

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    recover(lock.read(), source, op, "read")
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), source, op, "write")
}

fn recover<G>(
    result: LockResult<G>,
    source: &'static str,
    op: &'static str,
    mode: &'static str,
) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            target: "monsterdex::cache",
            op,
            source,
            mode,
            hint = POISON_HINT,
            "Cache lock poisoned; continuing with recovered state"
        );
        poisoned.into_inner()
    })
}
