//! POSIX loader: `dlopen`/`dlsym`/`dlclose`.

use super::{ModuleHandle, NativeAddress, PlatformLoader};
use crate::error::{BridgeError, BridgeResult};
use crate::sync::RecoverMutex;
use libloading::os::unix::{Library, RTLD_LAZY};
use std::ffi::c_void;
use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::Mutex;

/// Loader backed by the dynamic linker.
///
/// `last_error` reports the linker's own diagnostic (`dlerror`) text.
#[derive(Default)]
pub struct UnixLoader {
    last_error: Mutex<Option<String>>,
}

impl UnixLoader {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, message: String) -> String {
        *self.last_error.lock_recover() = Some(message.clone());
        message
    }

    /// Borrow a raw handle as a `Library` without taking ownership.
    ///
    /// # Safety
    ///
    /// `module` must come from [`PlatformLoader::open`] on this loader and
    /// must not have been closed.
    unsafe fn borrow(module: ModuleHandle) -> ManuallyDrop<Library> {
        // SAFETY: caller guarantees the handle is a live dlopen handle.
        ManuallyDrop::new(unsafe { Library::from_raw(module.0 as *mut c_void) })
    }
}

impl PlatformLoader for UnixLoader {
    fn open(&self, path: &Path) -> BridgeResult<ModuleHandle> {
        // SAFETY: loading runs the module's initialisers; the engine is
        // trusted to have well-behaved constructors.
        match unsafe { Library::open(Some(path), RTLD_LAZY) } {
            Ok(library) => Ok(ModuleHandle(library.into_raw() as usize)),
            Err(e) => {
                let message = self.record(e.to_string());
                Err(BridgeError::load_failed(path, message))
            }
        }
    }

    fn resolve(&self, module: ModuleHandle, name: &str) -> BridgeResult<NativeAddress> {
        // SAFETY: handles only ever come from `open` above.
        let library = unsafe { Self::borrow(module) };

        // SAFETY: the symbol is read as an untyped address; callers
        // transmute it to the signature documented for that entry point.
        let resolved = unsafe { library.get::<*mut c_void>(name.as_bytes()) };
        match resolved {
            Ok(symbol) if !(*symbol).is_null() => Ok(NativeAddress(*symbol as usize)),
            Ok(_) => {
                self.record(format!("{name}: symbol resolved to null"));
                Err(BridgeError::symbol_not_found(name))
            }
            Err(e) => {
                self.record(e.to_string());
                Err(BridgeError::symbol_not_found(name))
            }
        }
    }

    fn close(&self, module: ModuleHandle) -> bool {
        // SAFETY: ownership of the handle is taken back here exactly once.
        let library = unsafe { Library::from_raw(module.0 as *mut c_void) };
        match library.close() {
            Ok(()) => true,
            Err(e) => {
                self.record(e.to_string());
                false
            }
        }
    }

    fn last_error(&self) -> String {
        self.last_error.lock_recover().clone().unwrap_or_default()
    }

    fn name(&self) -> &'static str {
        "dlopen"
    }
}
