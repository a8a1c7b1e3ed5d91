//! Library manager: exactly-once module loading and symbol caching.
//!
//! A manager moves through `uninitialized -> loading -> loaded | failed`.
//! Both end states are final: a failed load is cached and returned to every
//! later caller, and nothing retries. Symbol families are resolved the same
//! way, once per manager, the first time a proxy or trampoline needs them.

use crate::abi::*;
use crate::config::LibraryConfig;
use crate::error::{BridgeError, BridgeResult, HResultExt};
use crate::loader::{native_loader, ModuleHandle, NativeAddress, PlatformLoader};
use crate::sync::RecoverMutex;
use lib_archive_types::{Guid, HResult};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

static PROCESS: ProcessManager = ProcessManager::new();

/// The process-wide manager and the path it will be created with.
///
/// The path stays locked while the manager is created, so a path is either
/// accepted before creation and used, or refused.
struct ProcessManager {
    path: Mutex<Option<PathBuf>>,
    instance: OnceLock<Arc<LibraryManager>>,
}

impl ProcessManager {
    const fn new() -> Self {
        Self {
            path: Mutex::new(None),
            instance: OnceLock::new(),
        }
    }

    fn get_or_create(&self, create: impl FnOnce(Option<PathBuf>) -> Arc<LibraryManager>) -> Arc<LibraryManager> {
        if let Some(existing) = self.instance.get() {
            return existing.clone();
        }
        let configured = self.path.lock_recover();
        self.instance.get_or_init(|| create(configured.clone())).clone()
    }

    fn set_path(&self, path: &Path) -> BridgeResult<()> {
        let mut configured = self.path.lock_recover();
        if let Some(existing) = self.instance.get() {
            return Err(BridgeError::AlreadyInitialized(existing.path.clone()));
        }
        *configured = Some(path.to_path_buf());
        Ok(())
    }
}

/// Loads the engine module and hands out its entry points.
pub struct LibraryManager {
    loader: Box<dyn PlatformLoader>,
    path: PathBuf,
    module: OnceLock<BridgeResult<ModuleHandle>>,
    tables: SymbolTables,
}

impl LibraryManager {
    /// Manager for the module at `path`, driven by `loader`.
    ///
    /// Nothing is loaded until the first symbol is requested.
    pub fn with_loader(loader: Box<dyn PlatformLoader>, path: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            loader,
            path: path.into(),
            module: OnceLock::new(),
            tables: SymbolTables::default(),
        })
    }

    /// Manager using the platform loader and the configured (or default) path.
    pub fn from_config(config: &LibraryConfig) -> Arc<Self> {
        Self::with_loader(native_loader(), config.resolve())
    }

    /// The process-wide manager.
    ///
    /// Its path is the one given to [`set_library_path`](Self::set_library_path),
    /// else `SEVENZIP_LIBRARY_PATH`, else the platform default.
    pub fn instance() -> Arc<Self> {
        PROCESS.get_or_create(|configured| {
            let config = match configured {
                Some(path) => LibraryConfig::with_path(path),
                None => LibraryConfig::default().with_env_override(),
            };
            tracing::debug!(path = %config.resolve().display(), "Creating process-wide library manager");
            Self::from_config(&config)
        })
    }

    /// Set the module path used by [`instance`](Self::instance).
    ///
    /// Fails with `LibraryNotFound` if the file does not exist and with
    /// `AlreadyInitialized` once the process-wide manager has been created.
    pub fn set_library_path(path: impl AsRef<Path>) -> BridgeResult<()> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(BridgeError::LibraryNotFound(path.to_path_buf()));
        }
        PROCESS.set_path(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the platform loader in use.
    pub fn loader_name(&self) -> &'static str {
        self.loader.name()
    }

    /// Whether the module has been loaded successfully. Does not trigger a load.
    pub fn is_loaded(&self) -> bool {
        matches!(self.module.get(), Some(Ok(_)))
    }

    /// Load the module on first call; return the cached outcome afterwards.
    pub fn module(&self) -> BridgeResult<ModuleHandle> {
        self.module
            .get_or_init(|| {
                let result = self.loader.open(&self.path);
                match &result {
                    Ok(_) => tracing::info!(
                        path = %self.path.display(),
                        loader = self.loader.name(),
                        "Loaded 7-Zip library"
                    ),
                    Err(e) => tracing::error!(
                        path = %self.path.display(),
                        loader = self.loader.name(),
                        error = %e,
                        "Failed to load 7-Zip library"
                    ),
                }
                result
            })
            .clone()
    }

    /// Resolve a named entry point.
    pub fn resolve(&self, name: &str) -> BridgeResult<NativeAddress> {
        let module = self.module()?;
        self.loader.resolve(module, name)
    }

    /// Resolve an entry point that may legitimately be absent.
    pub fn try_resolve(&self, name: &str) -> Option<NativeAddress> {
        let module = self.module().ok()?;
        self.loader.resolve(module, name).ok()
    }

    /// Diagnostic text of the loader's most recent failure.
    pub fn last_error(&self) -> String {
        self.loader.last_error()
    }

    /// Resolve `name` as a function pointer of type `F`.
    ///
    /// # Safety
    ///
    /// `F` must be a function pointer type matching the exported signature.
    pub(crate) unsafe fn symbol<F: Copy>(&self, name: &str) -> BridgeResult<F> {
        let address = self.resolve(name)?;
        // SAFETY: caller guarantees `F` is a pointer-sized fn type.
        Ok(unsafe { address_as::<F>(address) })
    }

    /// Like [`symbol`](Self::symbol) but absent entry points yield `None`.
    ///
    /// # Safety
    ///
    /// As for `symbol`.
    pub(crate) unsafe fn try_symbol<F: Copy>(&self, name: &str) -> Option<F> {
        let address = self.try_resolve(name)?;
        // SAFETY: caller guarantees `F` is a pointer-sized fn type.
        Some(unsafe { address_as::<F>(address) })
    }

    /// Resolved entry points of family `T`, cached after the first call.
    pub(crate) fn table<T: CachedFamily>(&self) -> BridgeResult<&T> {
        T::cell(&self.tables)
            .get_or_init(|| {
                let table = T::resolve(self);
                match &table {
                    Ok(_) => tracing::debug!(family = T::NAME, "Resolved symbol family"),
                    Err(e) => tracing::warn!(family = T::NAME, error = %e, "Symbol family unusable"),
                }
                table
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Create a fresh engine object through `CreateObject`.
    pub fn create_object(&self, class_id: &Guid, interface_id: &Guid) -> BridgeResult<NativeHandle> {
        let core = self.table::<CoreTable>()?;
        let mut object = NativeHandle::NULL;

        // SAFETY: both GUIDs outlive the call and `object` is a valid out slot.
        let hr = HResult(unsafe { (core.create_object)(class_id, interface_id, &mut object) });
        hr.check()?;

        if object.is_null() {
            return Err(BridgeError::NullHandle { call: "CreateObject" });
        }
        tracing::debug!(class_id = %class_id, interface_id = %interface_id, handle = %object, "Created engine object");
        Ok(object)
    }
}

impl Drop for LibraryManager {
    fn drop(&mut self) {
        if let Some(Ok(module)) = self.module.get() {
            if self.loader.close(*module) {
                tracing::debug!(path = %self.path.display(), "Closed 7-Zip library");
            } else {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %self.loader.last_error(),
                    "Failed to close 7-Zip library"
                );
            }
        }
    }
}

impl std::fmt::Debug for LibraryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryManager")
            .field("path", &self.path)
            .field("loader", &self.loader.name())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// Reinterpret a resolved address as a function pointer.
///
/// # Safety
///
/// `F` must be a pointer-sized function pointer type.
unsafe fn address_as<F: Copy>(address: NativeAddress) -> F {
    assert_eq!(
        std::mem::size_of::<F>(),
        std::mem::size_of::<usize>(),
        "symbol type must be pointer-sized"
    );
    // SAFETY: sizes match; caller vouches for the signature.
    unsafe { std::mem::transmute_copy::<usize, F>(&address.0) }
}

/// One cache slot per symbol family.
#[derive(Default)]
pub(crate) struct SymbolTables {
    core: OnceLock<BridgeResult<CoreTable>>,
    in_archive: OnceLock<BridgeResult<InArchiveTable>>,
    out_archive: OnceLock<BridgeResult<OutArchiveTable>>,
    set_properties: OnceLock<BridgeResult<SetPropertiesTable>>,
    casts: OnceLock<BridgeResult<CastTable>>,
    open_callback: OnceLock<BridgeResult<BundleTable<CreateOpenCallbackFn>>>,
    extract_callback: OnceLock<BridgeResult<BundleTable<CreateExtractCallbackFn>>>,
    update_callback: OnceLock<BridgeResult<BundleTable<CreateUpdateCallbackFn>>>,
    sequential_in_stream: OnceLock<BridgeResult<BundleTable<CreateSequentialInStreamFn>>>,
    in_stream: OnceLock<BridgeResult<BundleTable<CreateInStreamFn>>>,
    sequential_out_stream: OnceLock<BridgeResult<BundleTable<CreateSequentialOutStreamFn>>>,
    out_stream: OnceLock<BridgeResult<BundleTable<CreateOutStreamFn>>>,
}

/// A symbol family with a cache slot in [`SymbolTables`].
pub(crate) trait CachedFamily: SymbolFamily + Send + Sync + 'static {
    fn cell(tables: &SymbolTables) -> &OnceLock<BridgeResult<Self>>;
}

macro_rules! cached_family {
    ($($ty:ty => $field:ident),* $(,)?) => {
        $(
            impl CachedFamily for $ty {
                fn cell(tables: &SymbolTables) -> &OnceLock<BridgeResult<Self>> {
                    &tables.$field
                }
            }
        )*
    };
}

cached_family! {
    CoreTable => core,
    InArchiveTable => in_archive,
    OutArchiveTable => out_archive,
    SetPropertiesTable => set_properties,
    CastTable => casts,
    BundleTable<CreateOpenCallbackFn> => open_callback,
    BundleTable<CreateExtractCallbackFn> => extract_callback,
    BundleTable<CreateUpdateCallbackFn> => update_callback,
    BundleTable<CreateSequentialInStreamFn> => sequential_in_stream,
    BundleTable<CreateInStreamFn> => in_stream,
    BundleTable<CreateSequentialOutStreamFn> => sequential_out_stream,
    BundleTable<CreateOutStreamFn> => out_stream,
}
