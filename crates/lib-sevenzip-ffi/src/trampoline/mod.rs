//! Callback trampolines.
//!
//! A trampoline bundle is a native wrapper object built by one of the
//! engine's `Create*` entry points from a set of function pointers, plus the
//! host state those functions dispatch into. The function pointers are
//! monomorphised `extern "C"` items; they are always valid. What can go
//! stale is the state, so every call starts by looking the `this` handle up
//! in the [`ObjectRegistry`].
//!
//! Each dispatch:
//! 1. looks up the bundle state (unknown handle: `E_FAIL`),
//! 2. takes the host object without blocking (re-entrant call: `E_FAIL`),
//! 3. runs the host method inside `catch_unwind` (panic: `E_FAIL`),
//! 4. writes out-parameters and returns the host's status.
//!
//! A bundle is released natively and removed from the registry exactly
//! once, on [`Trampoline::dispose`] or on drop.

pub(crate) mod extract;
pub(crate) mod open;
pub(crate) mod stream;
pub(crate) mod update;

use crate::abi::{NativeHandle, ReleaseFn};
use crate::error::{BridgeError, BridgeResult};
use crate::registry::{BundleKind, ObjectRegistry, Owner};
use crate::sync::RecoverMutex;
use lib_archive_types::{HResult, HostResult};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, TryLockError};

/// Releases one native wrapper object and its registry entry.
struct BundleGuard {
    handle: NativeHandle,
    kind: BundleKind,
    release: ReleaseFn,
    disposed: bool,
}

impl BundleGuard {
    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        // Registry first: the address stays allocated until the native
        // release, so it cannot be handed out again in between.
        ObjectRegistry::global().release(self.handle);
        // SAFETY: the handle came from the matching `Create*` entry point
        // and is released exactly once.
        unsafe { (self.release)(self.handle) };
        tracing::debug!(handle = %self.handle, kind = %self.kind, "Disposed trampoline bundle");
    }
}

impl Drop for BundleGuard {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// A registered trampoline bundle and its host state.
pub struct Trampoline<S: ?Sized + Send + Sync = dyn Any + Send + Sync> {
    guard: BundleGuard,
    state: Arc<S>,
}

impl<S: Any + Send + Sync> Trampoline<S> {
    /// Register a freshly created native wrapper.
    ///
    /// On any failure the wrapper is released before returning.
    pub(crate) fn register(
        call: &'static str,
        handle: NativeHandle,
        kind: BundleKind,
        release: ReleaseFn,
        state: Arc<S>,
    ) -> BridgeResult<Self> {
        if handle.is_null() {
            tracing::error!(call, "Engine returned a null wrapper");
            return Err(BridgeError::NullHandle { call });
        }

        let owner: Owner = state.clone();
        if let Err(e) = ObjectRegistry::global().register(handle, kind, &owner) {
            tracing::error!(handle = %handle, kind = %kind, error = %e, "Failed to register trampoline bundle");
            // SAFETY: the wrapper is ours and not registered; release it once.
            unsafe { release(handle) };
            return Err(e);
        }

        tracing::debug!(handle = %handle, kind = %kind, "Created trampoline bundle");
        Ok(Self {
            guard: BundleGuard {
                handle,
                kind,
                release,
                disposed: false,
            },
            state,
        })
    }

    /// Forget the concrete state type.
    pub fn erase(self) -> Trampoline {
        Trampoline {
            guard: self.guard,
            state: self.state,
        }
    }

    /// Dispose the bundle and take back the host state.
    ///
    /// Fails with `TrampolineInUse` if the state is still referenced.
    pub fn into_inner(mut self) -> BridgeResult<S> {
        self.guard.dispose();
        Arc::try_unwrap(self.state).map_err(|_| BridgeError::TrampolineInUse)
    }
}

impl<S: ?Sized + Send + Sync> Trampoline<S> {
    /// Handle passed to the engine.
    pub fn handle(&self) -> NativeHandle {
        self.guard.handle
    }

    pub fn kind(&self) -> BundleKind {
        self.guard.kind
    }

    pub fn state(&self) -> &Arc<S> {
        &self.state
    }

    pub fn is_disposed(&self) -> bool {
        self.guard.disposed
    }

    /// Release the native wrapper and unregister it. Idempotent.
    pub fn dispose(&mut self) {
        self.guard.dispose();
    }
}

impl<S: ?Sized + Send + Sync> fmt::Debug for Trampoline<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trampoline")
            .field("handle", &self.guard.handle)
            .field("kind", &self.guard.kind)
            .field("disposed", &self.guard.disposed)
            .finish()
    }
}

/// Bundles created during a callback and owned by the bundle that made them.
#[derive(Debug, Default)]
pub(crate) struct Children {
    bundles: Mutex<Vec<Trampoline>>,
}

impl Children {
    pub fn adopt(&self, child: Trampoline) {
        self.bundles.lock_recover().push(child);
    }

    /// Dispose every child now. Returns how many there were.
    pub fn dispose_all(&self) -> usize {
        let drained: Vec<Trampoline> = self.bundles.lock_recover().drain(..).collect();
        let count = drained.len();
        drop(drained);
        count
    }

    pub fn take(&self) -> Vec<Trampoline> {
        std::mem::take(&mut *self.bundles.lock_recover())
    }
}

/// Run one engine-to-host call against the state registered under `this`.
///
/// Never unwinds: panics and lookup failures become `E_FAIL`.
pub(crate) fn dispatch<T, F>(this: NativeHandle, call: &'static str, f: F) -> i32
where
    T: Any + Send + Sync,
    F: FnOnce(&T) -> HostResult<HResult>,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let state = ObjectRegistry::global().lookup_as::<T>(this).map_err(|e| {
            tracing::error!(handle = %this, call, error = %e, "Callback on unknown bundle");
            HResult::E_FAIL
        })?;
        f(state.as_ref())
    }));

    match outcome {
        Ok(Ok(status)) => status.0,
        Ok(Err(status)) => {
            tracing::debug!(handle = %this, call, status = %status, "Host callback reported failure");
            status.0
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(handle = %this, call, panic = %message, "Host callback panicked");
            HResult::E_FAIL.0
        }
    }
}

/// Borrow the host object for one call.
///
/// A callback that arrives while the same host object is already inside a
/// method (the host re-entered the engine) finds it busy and fails with
/// `E_FAIL` instead of deadlocking.
pub(crate) fn with_host<C: ?Sized, R>(
    host: &Mutex<C>,
    call: &'static str,
    f: impl FnOnce(&mut C) -> HostResult<R>,
) -> HostResult<R> {
    let mut guard = match host.try_lock() {
        Ok(guard) => guard,
        Err(TryLockError::Poisoned(poisoned)) => {
            tracing::warn!(call, "Host object mutex was poisoned, recovering");
            poisoned.into_inner()
        }
        Err(TryLockError::WouldBlock) => {
            tracing::error!(call, "Re-entrant callback into a busy host object");
            return Err(HResult::E_FAIL);
        }
    };
    f(&mut guard)
}

/// Write `value` through an out-pointer if the engine supplied one.
///
/// # Safety
///
/// `out` must be null or valid for a write of `T`.
pub(crate) unsafe fn write_out<T>(out: *mut T, value: T) {
    if !out.is_null() {
        // SAFETY: checked non-null; validity is the caller's contract.
        unsafe { out.write(value) };
    }
}

/// Read an optional in-pointer.
///
/// # Safety
///
/// `ptr` must be null or valid for a read of `T`.
pub(crate) unsafe fn read_opt<T: Copy>(ptr: *const T) -> Option<T> {
    // SAFETY: null is handled; otherwise the caller vouches for the pointer.
    unsafe { ptr.as_ref().copied() }
}

/// Map a bridge failure inside a callback to the status the engine sees.
pub(crate) fn bridge_status(call: &'static str, err: BridgeError) -> HResult {
    tracing::error!(call, error = %err, "Bridge failure inside callback");
    match err {
        BridgeError::NativeCallFailed { code } => code,
        _ => HResult::E_FAIL,
    }
}
