//! Platform module loading.
//!
//! The engine ships as a POSIX shared object or a Windows DLL. Both are
//! driven through the same [`PlatformLoader`] contract so the library
//! manager never needs to know which one it is talking to.

use crate::error::BridgeResult;
use std::path::Path;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::UnixLoader;
#[cfg(windows)]
pub use windows::WindowsLoader;

/// Opaque handle to a loaded native module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModuleHandle(pub usize);

/// Address of a resolved entry point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NativeAddress(pub usize);

impl NativeAddress {
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Open, resolve and close a native module.
///
/// Failures are reported, never retried. `last_error` returns the most
/// recent diagnostic text the platform produced.
pub trait PlatformLoader: Send + Sync {
    /// Open the module at `path`.
    fn open(&self, path: &Path) -> BridgeResult<ModuleHandle>;

    /// Resolve `name` to a callable address.
    fn resolve(&self, module: ModuleHandle, name: &str) -> BridgeResult<NativeAddress>;

    /// Close a module. Returns `false` if the platform reported failure.
    fn close(&self, module: ModuleHandle) -> bool;

    /// Diagnostic text for the last failure, or an empty string.
    fn last_error(&self) -> String;

    /// Short name of the mechanism, for logging.
    fn name(&self) -> &'static str;
}

/// The loader for the platform this crate was built for.
#[cfg(unix)]
pub fn native_loader() -> Box<dyn PlatformLoader> {
    Box::new(UnixLoader::new())
}

/// The loader for the platform this crate was built for.
#[cfg(windows)]
pub fn native_loader() -> Box<dyn PlatformLoader> {
    Box::new(WindowsLoader::new())
}
