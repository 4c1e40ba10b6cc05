use std::sync::{LockResult, RwLock, RwLockWriteGuard};

use tracing::warn;

// A panic while a cache lock is held leaves at worst a stale page behind,
// which the TTL clears, so callers keep going with the inner guard.
fn recover<G>(result: LockResult<G>, op: &'static str, lock_kind: &'static str) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            target = "coursepages::cache",
            op,
            lock_kind,
            result = "poisoned_recovered",
            "Recovered from poisoned page cache lock"
        );
        poisoned.into_inner()
    })
}

pub(crate) fn rw_write<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), op, "rwlock.write")
}
