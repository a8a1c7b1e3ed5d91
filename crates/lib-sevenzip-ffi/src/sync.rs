//! Mutex helpers.

use std::sync::{Mutex, MutexGuard};

/// Helper trait to recover from poisoned mutexes.
///
/// A host callback that panics is caught at the trampoline boundary, which
/// can leave a mutex poisoned. The protected data (tables, registries,
/// diagnostics) stays structurally valid, so we keep using it.
pub(crate) trait RecoverMutex<T> {
    fn lock_recover(&self) -> MutexGuard<'_, T>;
}

impl<T> RecoverMutex<T> for Mutex<T> {
    fn lock_recover(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Mutex was poisoned, recovering data");
            poisoned.into_inner()
        })
    }
}
