//! Windows loader: `LoadLibrary`/`GetProcAddress`/`FreeLibrary`.

use super::{ModuleHandle, NativeAddress, PlatformLoader};
use crate::error::{BridgeError, BridgeResult};
use crate::sync::RecoverMutex;
use libloading::os::windows::Library;
use std::error::Error as _;
use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::Mutex;

/// Loader backed by the OS module loader.
///
/// `last_error` formats the last OS error code, the only diagnostic the
/// Windows loader provides.
#[derive(Default)]
pub struct WindowsLoader {
    last_error: Mutex<Option<String>>,
}

impl WindowsLoader {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, err: &libloading::Error) -> String {
        let code = err
            .source()
            .and_then(|source| source.downcast_ref::<std::io::Error>())
            .and_then(std::io::Error::raw_os_error)
            .or_else(|| std::io::Error::last_os_error().raw_os_error())
            .unwrap_or_default();
        let message = format!("Error code: {code}");
        *self.last_error.lock_recover() = Some(message.clone());
        message
    }

    /// Borrow a raw handle as a `Library` without taking ownership.
    ///
    /// # Safety
    ///
    /// `module` must come from [`PlatformLoader::open`] and still be loaded.
    unsafe fn borrow(module: ModuleHandle) -> ManuallyDrop<Library> {
        // SAFETY: caller guarantees the handle is a live HMODULE.
        ManuallyDrop::new(unsafe { Library::from_raw(module.0 as _) })
    }
}

impl PlatformLoader for WindowsLoader {
    fn open(&self, path: &Path) -> BridgeResult<ModuleHandle> {
        // SAFETY: loading runs DllMain; the engine is trusted.
        match unsafe { Library::new(path) } {
            Ok(library) => Ok(ModuleHandle(library.into_raw() as usize)),
            Err(e) => {
                let message = self.record(&e);
                Err(BridgeError::load_failed(path, message))
            }
        }
    }

    fn resolve(&self, module: ModuleHandle, name: &str) -> BridgeResult<NativeAddress> {
        // SAFETY: handles only ever come from `open` above.
        let library = unsafe { Self::borrow(module) };

        // SAFETY: read as an untyped address, typed later by the caller.
        match unsafe { library.get::<*mut std::ffi::c_void>(name.as_bytes()) } {
            Ok(symbol) if !(*symbol).is_null() => Ok(NativeAddress(*symbol as usize)),
            Ok(_) => Err(BridgeError::symbol_not_found(name)),
            Err(e) => {
                self.record(&e);
                Err(BridgeError::symbol_not_found(name))
            }
        }
    }

    fn close(&self, module: ModuleHandle) -> bool {
        // SAFETY: ownership of the handle is taken back exactly once.
        let library = unsafe { Library::from_raw(module.0 as _) };
        match library.close() {
            Ok(()) => true,
            Err(e) => {
                self.record(&e);
                false
            }
        }
    }

    fn last_error(&self) -> String {
        self.last_error.lock_recover().clone().unwrap_or_default()
    }

    fn name(&self) -> &'static str {
        "LoadLibrary"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file_formats_error_code() {
        let loader = WindowsLoader::new();
        let err = loader.open(Path::new("C:\\nonexistent\\7z64.dll")).unwrap_err();

        assert!(matches!(err, BridgeError::ModuleLoadFailed { .. }));
        assert!(loader.last_error().starts_with("Error code: "));
    }
}
