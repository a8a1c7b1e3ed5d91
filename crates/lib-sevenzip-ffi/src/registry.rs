//! Object registry: native handle to host bundle.
//!
//! When the engine calls a trampoline it passes the handle of the native
//! wrapper object it was given. The registry maps that handle back to the
//! host state behind it. Entries are non-owning: the creator of a bundle
//! owns it, and a lookup after the owner is gone reports `NotFound`.
//!
//! The registry never evicts and never calls into native code.

use crate::abi::NativeHandle;
use crate::error::{BridgeError, BridgeResult};
use crate::sync::RecoverMutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, Weak};

/// Type-erased bundle state.
pub type Owner = Arc<dyn Any + Send + Sync>;

/// Which trampoline family a registered handle belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BundleKind {
    OpenCallback,
    ExtractCallback,
    UpdateCallback,
    SequentialInStream,
    InStream,
    SequentialOutStream,
    OutStream,
}

impl BundleKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::OpenCallback => "IArchiveOpenCallback",
            Self::ExtractCallback => "IArchiveExtractCallback",
            Self::UpdateCallback => "IArchiveUpdateCallback",
            Self::SequentialInStream => "ISequentialInStream",
            Self::InStream => "IInStream",
            Self::SequentialOutStream => "ISequentialOutStream",
            Self::OutStream => "IOutStream",
        }
    }
}

impl fmt::Display for BundleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

struct Entry {
    kind: BundleKind,
    owner: Weak<dyn Any + Send + Sync>,
}

/// Handle-to-owner lookup table.
#[derive(Default)]
pub struct ObjectRegistry {
    entries: Mutex<HashMap<NativeHandle, Entry>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry trampolines dispatch through.
    pub fn global() -> &'static ObjectRegistry {
        static GLOBAL: OnceLock<ObjectRegistry> = OnceLock::new();
        GLOBAL.get_or_init(ObjectRegistry::new)
    }

    /// Record `owner` under `handle`.
    pub fn register(&self, handle: NativeHandle, kind: BundleKind, owner: &Owner) -> BridgeResult<()> {
        let mut entries = self.entries.lock_recover();
        if entries.contains_key(&handle) {
            return Err(BridgeError::DuplicateHandle { handle: handle.0 });
        }
        entries.insert(
            handle,
            Entry {
                kind,
                owner: Arc::downgrade(owner),
            },
        );
        Ok(())
    }

    /// The live owner registered under `handle`.
    pub fn lookup(&self, handle: NativeHandle) -> BridgeResult<(BundleKind, Owner)> {
        let entries = self.entries.lock_recover();
        entries
            .get(&handle)
            .and_then(|entry| entry.owner.upgrade().map(|owner| (entry.kind, owner)))
            .ok_or(BridgeError::NotFound { handle: handle.0 })
    }

    /// Look up and downcast. A type mismatch is reported as `NotFound`.
    pub fn lookup_as<T: Any + Send + Sync>(&self, handle: NativeHandle) -> BridgeResult<Arc<T>> {
        let (_, owner) = self.lookup(handle)?;
        owner
            .downcast::<T>()
            .map_err(|_| BridgeError::NotFound { handle: handle.0 })
    }

    /// Remove an entry. Returns `false` if there was none.
    pub fn release(&self, handle: NativeHandle) -> bool {
        self.entries.lock_recover().remove(&handle).is_some()
    }

    pub fn contains(&self, handle: NativeHandle) -> bool {
        self.entries.lock_recover().contains_key(&handle)
    }

    pub fn kind(&self, handle: NativeHandle) -> Option<BundleKind> {
        self.entries.lock_recover().get(&handle).map(|entry| entry.kind)
    }

    pub fn len(&self) -> usize {
        self.entries.lock_recover().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRegistry").field("entries", &self.len()).finish()
    }
}
