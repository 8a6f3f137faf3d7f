//! Poison-tolerant guards for in-process cache state.
//!
//! A panic while a cache lock is held must not take the cache down with it:
//! the guard is recovered and the incident is logged.

use std::sync::{LockResult, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

fn recover<G>(
    result: LockResult<G>,
    component: &'static str,
    op: &'static str,
    lock_kind: &'static str,
) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            op,
            component,
            lock_kind,
            result = "poisoned_recovered",
            "Recovered cache lock after a panic in another thread"
        );
        poisoned.into_inner()
    })
}

pub(crate) fn read_guard<'a, T>(
    lock: &'a RwLock<T>,
    component: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    recover(lock.read(), component, op, "rwlock.read")
}

pub(crate) fn write_guard<'a, T>(
    lock: &'a RwLock<T>,
    component: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), component, op, "rwlock.write")
}

pub(crate) fn mutex_guard<'a, T>(
    lock: &'a Mutex<T>,
    component: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    recover(lock.lock(), component, op, "mutex.lock")
}
