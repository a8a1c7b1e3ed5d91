//! `IOutArchive` proxy.

use super::{Outcome, Ownership, PropertySetter};
use crate::abi::{CastTable, NativeHandle, OutArchiveTable};
use crate::error::{BridgeError, BridgeResult};
use crate::host::{ArchiveUpdateCallback, SequentialOutStream};
use crate::manager::LibraryManager;
use crate::trampoline::{stream, update};
use lib_archive_types::{ArchiveFormat, FileTimeType, Guid, HResult};
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

/// An archive writer.
///
/// A writer created with [`create`](OutArchive::create) owns its engine
/// reference. One obtained from [`InArchive::as_out_archive`] is an alias
/// bound to the reader's lifetime and releases nothing.
///
/// [`InArchive::as_out_archive`]: super::InArchive::as_out_archive
pub struct OutArchive<'a> {
    manager: Arc<LibraryManager>,
    table: OutArchiveTable,
    handle: NativeHandle,
    ownership: Ownership,
    _owner: PhantomData<&'a ()>,
    _not_sync: PhantomData<Cell<()>>,
}

impl OutArchive<'static> {
    /// Create a writer for `format` through `CreateObject`.
    pub fn create(manager: &Arc<LibraryManager>, format: ArchiveFormat) -> BridgeResult<Self> {
        let table = *manager.table::<OutArchiveTable>()?;
        if !format.is_writable() {
            tracing::warn!(format = ?format, "Format is not known to be writable");
        }
        let handle = manager.create_object(&format.class_id(), &Guid::IID_OUT_ARCHIVE)?;
        tracing::debug!(format = ?format, handle = %handle, "Created archive writer");
        Ok(Self::wrap(manager, table, handle, Ownership::Primary))
    }

    /// Adopt an `IOutArchive` reference obtained elsewhere.
    ///
    /// # Safety
    ///
    /// `handle` must be a live `IOutArchive` object from the module `manager`
    /// loaded. The proxy takes over the reference and releases it on drop.
    pub unsafe fn from_raw(manager: &Arc<LibraryManager>, handle: NativeHandle) -> BridgeResult<Self> {
        if handle.is_null() {
            return Err(BridgeError::NullHandle { call: "OutArchive::from_raw" });
        }
        let table = *manager.table::<OutArchiveTable>()?;
        Ok(Self::wrap(manager, table, handle, Ownership::Primary))
    }
}

impl<'a> OutArchive<'a> {
    /// Alias of an object owned elsewhere.
    pub(crate) fn alias(manager: &Arc<LibraryManager>, handle: NativeHandle) -> BridgeResult<Self> {
        let table = *manager.table::<OutArchiveTable>()?;
        Ok(Self::wrap(manager, table, handle, Ownership::Alias))
    }

    fn wrap(manager: &Arc<LibraryManager>, table: OutArchiveTable, handle: NativeHandle, ownership: Ownership) -> Self {
        Self {
            manager: manager.clone(),
            table,
            handle,
            ownership,
            _owner: PhantomData,
            _not_sync: PhantomData,
        }
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    pub fn is_alias(&self) -> bool {
        self.ownership == Ownership::Alias
    }

    /// Write an archive of `num_items` items to `out`.
    ///
    /// Seekable sinks are handed to the engine as `IOutStream`, others as
    /// `ISequentialOutStream`. The sink and the callback come back in the
    /// outcome whatever the engine reported.
    pub fn update_items<S, C>(&self, out: S, num_items: u32, callback: C) -> BridgeResult<Outcome<(S, C)>>
    where
        S: SequentialOutStream + 'static,
        C: ArchiveUpdateCallback + 'static,
    {
        let output = stream::out_stream(&self.manager, out)?;
        let bundle = update::build(&self.manager, callback)?;

        // SAFETY: both bundles are live for the call.
        let status = HResult(unsafe { (self.table.update_items)(self.handle, output.handle(), num_items, bundle.handle()) });
        tracing::debug!(
            handle = %self.handle,
            num_items,
            stream = %output.kind(),
            status = %status,
            "IOutArchive::UpdateItems"
        );

        let callback = bundle.into_inner()?.into_callback();
        let out = output.into_inner()?.into_stream();
        Ok(Outcome {
            status,
            value: (out, callback),
        })
    }

    /// Timestamp precision the format stores.
    pub fn file_time_type(&self) -> FileTimeType {
        let mut raw = 0u32;
        // SAFETY: `handle` is live and `raw` is a valid out slot.
        unsafe { (self.table.file_time_type)(self.handle, &mut raw) };
        FileTimeType::from(raw)
    }

    /// The writer's `ISetProperties` view, for compression settings.
    pub fn property_setter(&self) -> BridgeResult<PropertySetter<'_>> {
        let failed = BridgeError::CastFailed {
            from: "IOutArchive",
            to: "ISetProperties",
        };
        let cast = self
            .manager
            .table::<CastTable>()?
            .out_to_set_properties
            .ok_or_else(|| failed.clone())?;
        // SAFETY: `handle` is a live IOutArchive.
        let handle = unsafe { cast(self.handle) };
        if handle.is_null() {
            tracing::debug!(handle = %self.handle, "Cast to ISetProperties refused");
            return Err(failed);
        }
        PropertySetter::alias(&self.manager, handle)
    }
}

impl Drop for OutArchive<'_> {
    fn drop(&mut self) {
        if self.ownership == Ownership::Alias {
            return;
        }
        if let Some(release) = self.table.release {
            // SAFETY: a primary proxy owns its reference and drop runs once.
            unsafe { release(self.handle) };
            tracing::debug!(handle = %self.handle, "Released archive writer");
        }
    }
}

impl std::fmt::Debug for OutArchive<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutArchive")
            .field("handle", &self.handle)
            .field("ownership", &self.ownership)
            .finish()
    }
}
