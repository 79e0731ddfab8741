//! Lock acquisition that survives poisoning.
//!
//! The registry, cache, and block maps are shared across requests; a panic in
//! one request must not wedge every later one behind a poisoned lock. Guards
//! are recovered and the recovery logged so stale state is at least visible.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

fn note_recovery(source: &'static str, op: &'static str, lock: &'static str) {
    warn!(
        source,
        op, lock, "Lock poisoned by a panicked holder; continuing with recovered state"
    );
}

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        note_recovery(source, op, "rwlock/read");
        poisoned.into_inner()
    })
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        note_recovery(source, op, "rwlock/write");
        poisoned.into_inner()
    })
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    source: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        note_recovery(source, op, "mutex");
        poisoned.into_inner()
    })
}
