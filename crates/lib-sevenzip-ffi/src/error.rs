//! Error types for bridge operations.

use lib_archive_types::HResult;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading the engine or calling through it.
///
/// `Clone` because load and symbol-resolution failures are cached and
/// re-raised on every later access.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// The native module could not be opened.
    #[error("Failed to load library '{}': {}", .path.display(), .message)]
    ModuleLoadFailed { path: PathBuf, message: String },

    /// A configured library path does not exist.
    #[error("Library file not found: {}", .0.display())]
    LibraryNotFound(PathBuf),

    /// The library path was changed after the process-wide manager was created.
    #[error("Library manager already initialized with '{}'", .0.display())]
    AlreadyInitialized(PathBuf),

    /// Required entry point missing from the loaded module.
    #[error("Symbol '{symbol}' not found in library")]
    SymbolNotFound { symbol: String },

    /// Two bundles were registered under one native handle.
    #[error("Native handle 0x{handle:x} is already registered")]
    DuplicateHandle { handle: usize },

    /// No live registry entry for the handle.
    #[error("Native handle 0x{handle:x} is not registered")]
    NotFound { handle: usize },

    /// A native call reported failure.
    #[error("Native call failed: {code}")]
    NativeCallFailed { code: HResult },

    /// The engine refused to view an object through another interface.
    #[error("Object does not support cast from {from} to {to}")]
    CastFailed { from: &'static str, to: &'static str },

    /// A host object lacks a capability the operation needs.
    #[error("Host object is missing required capability '{capability}'")]
    MissingCapability { capability: &'static str },

    /// The engine returned a null handle where an object was expected.
    #[error("Native call '{call}' returned a null handle")]
    NullHandle { call: &'static str },

    /// A bundle's host state is still referenced after disposal.
    #[error("Trampoline state is still referenced after dispose")]
    TrampolineInUse,

    /// The engine returned `status` from `call` but the callback state it
    /// was handed could not be taken back.
    #[error("Callback state of '{call}' still referenced after the engine returned {status}")]
    CallbackStateInUse { call: &'static str, status: HResult },

    /// Configuration could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Create a module load error.
    pub fn load_failed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ModuleLoadFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a symbol not found error.
    pub fn symbol_not_found(symbol: impl Into<String>) -> Self {
        Self::SymbolNotFound {
            symbol: symbol.into(),
        }
    }

    /// Wrap a native status code.
    pub fn native(code: HResult) -> Self {
        Self::NativeCallFailed { code }
    }

    /// Errors that make the affected manager or proxy family unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ModuleLoadFailed { .. } | Self::SymbolNotFound { .. } | Self::DuplicateHandle { .. }
        )
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Convert a native status into a `Result`, for callers that want failures as errors.
pub trait HResultExt {
    fn check(self) -> BridgeResult<HResult>;
}

impl HResultExt for HResult {
    fn check(self) -> BridgeResult<HResult> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(BridgeError::native(self))
        }
    }
}
