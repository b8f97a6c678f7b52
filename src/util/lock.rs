//! Lock helpers that recover poisoned guards and log the recovery.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

fn report_poisoned(op: &'static str, owner: &'static str, lock_kind: &'static str) {
    warn!(
        op,
        owner,
        lock_kind,
        result = "poisoned_recovered",
        hint = "state may be stale after panic in another thread",
        "Recovered from poisoned lock"
    );
}

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    owner: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        report_poisoned(op, owner, "rwlock.read");
        poisoned.into_inner()
    })
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    owner: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        report_poisoned(op, owner, "rwlock.write");
        poisoned.into_inner()
    })
}
