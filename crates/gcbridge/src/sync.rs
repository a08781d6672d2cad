use std::sync::{Mutex, MutexGuard};

/// Lock a std mutex, recovering the guard if a previous holder panicked.
///
/// Every state guarded this way is left consistent between statements, so
/// continuing after a poisoned lock is safe.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::error!("Mutex poisoned, recovering");
        poisoned.into_inner()
    })
}
