//! `IInArchive` proxy.

use super::{read_count, read_property_info, Outcome, OutArchive, PropertySetter};
use crate::abi::{CastFn, CastTable, InArchiveTable, NativeHandle};
use crate::codec::{take_variant, RawPropVariant, StringConvention};
use crate::error::{BridgeError, BridgeResult};
use crate::host::{ArchiveExtractCallback, ArchiveOpenCallback, SequentialInStream};
use crate::manager::LibraryManager;
use crate::trampoline::{extract, open, stream, Trampoline};
use lib_archive_types::{
    safe_cast, ArchiveFormat, ArchiveItem, FileTime, Guid, HResult, PropId, PropVariant, PropertyInfo,
};
use std::any::Any;
use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr;
use std::sync::Arc;

/// Engine convention for "every item" in `Extract`.
const ALL_ITEMS: u32 = u32::MAX;

/// An archive reader.
///
/// Streams passed to [`open`](Self::open) stay alive until
/// [`close`](Self::close) or drop, since the engine keeps reading them.
///
/// Engine objects are not thread-safe, so the proxy is `Send` but not
/// `Sync`.
pub struct InArchive {
    manager: Arc<LibraryManager>,
    table: InArchiveTable,
    handle: NativeHandle,
    retained: Vec<Trampoline>,
    _not_sync: PhantomData<Cell<()>>,
}

impl InArchive {
    /// Create a reader for `format` through `CreateObject`.
    pub fn create(manager: &Arc<LibraryManager>, format: ArchiveFormat) -> BridgeResult<Self> {
        let table = *manager.table::<InArchiveTable>()?;
        let handle = manager.create_object(&format.class_id(), &Guid::IID_IN_ARCHIVE)?;
        tracing::debug!(format = ?format, handle = %handle, "Created archive reader");
        Ok(Self::wrap(manager, table, handle))
    }

    /// Adopt an `IInArchive` reference obtained elsewhere.
    ///
    /// # Safety
    ///
    /// `handle` must be a live `IInArchive` object from the module `manager`
    /// loaded. The proxy takes over the reference and releases it on drop.
    pub unsafe fn from_raw(manager: &Arc<LibraryManager>, handle: NativeHandle) -> BridgeResult<Self> {
        if handle.is_null() {
            return Err(BridgeError::NullHandle { call: "InArchive::from_raw" });
        }
        let table = *manager.table::<InArchiveTable>()?;
        Ok(Self::wrap(manager, table, handle))
    }

    fn wrap(manager: &Arc<LibraryManager>, table: InArchiveTable, handle: NativeHandle) -> Self {
        Self {
            manager: manager.clone(),
            table,
            handle,
            retained: Vec::new(),
            _not_sync: PhantomData,
        }
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    pub fn manager(&self) -> &Arc<LibraryManager> {
        &self.manager
    }

    /// Whether streams from a successful `open` are still held.
    pub fn is_open(&self) -> bool {
        !self.retained.is_empty()
    }

    /// Open the archive in `stream`, which must be seekable.
    ///
    /// Re-opening closes the previous archive first. On success the input
    /// stream and any volumes the engine asked for are retained until
    /// `close`; on failure they are released before returning.
    pub fn open<S, C>(
        &mut self,
        stream: S,
        max_check_start_position: Option<u64>,
        callback: C,
    ) -> BridgeResult<Outcome<C>>
    where
        S: SequentialInStream + 'static,
        C: ArchiveOpenCallback + 'static,
    {
        if self.is_open() {
            self.close();
        }

        let input = stream::seekable_in_stream(&self.manager, stream)?;
        let bundle = open::build(&self.manager, callback)?;
        let max_check = max_check_start_position
            .as_ref()
            .map_or(ptr::null(), |v| v as *const u64);

        // SAFETY: every handle is live for the call and `max_check` is null
        // or points at a local.
        let status = HResult(unsafe { (self.table.open)(self.handle, input.handle(), max_check, bundle.handle()) });
        let (callback, volumes) = settle_open(&mut self.retained, status, input.erase(), bundle)?.into_parts();
        tracing::debug!(handle = %self.handle, status = %status, volumes = volumes.len(), "IInArchive::Open");

        if status.is_success() {
            self.retained.extend(volumes);
        }
        Ok(Outcome { status, value: callback })
    }

    /// Close the archive and release the streams retained by `open`.
    pub fn close(&mut self) {
        // SAFETY: `handle` is live; closing an unopened archive is a no-op.
        unsafe { (self.table.close)(self.handle) };
        let released = self.retained.len();
        self.retained.clear();
        tracing::debug!(handle = %self.handle, released, "IInArchive::Close");
    }

    pub fn number_of_items(&self) -> BridgeResult<u32> {
        read_count(self.table.number_of_items, self.handle)
    }

    /// Property `prop_id` of item `index`. `Empty` when the engine has none.
    pub fn property(&self, index: u32, prop_id: PropId) -> PropVariant {
        let mut raw = RawPropVariant::EMPTY;
        // SAFETY: `handle` is live and `raw` is a valid out slot.
        unsafe { (self.table.property)(self.handle, index, prop_id.0, &mut raw) };
        // SAFETY: the engine filled `raw` and gave us its payload.
        unsafe { take_variant(&mut raw, StringConvention::NATIVE) }
    }

    /// Archive-level property `prop_id`.
    pub fn archive_property(&self, prop_id: PropId) -> PropVariant {
        let mut raw = RawPropVariant::EMPTY;
        // SAFETY: `handle` is live and `raw` is a valid out slot.
        unsafe { (self.table.archive_property)(self.handle, prop_id.0, &mut raw) };
        // SAFETY: as above.
        unsafe { take_variant(&mut raw, StringConvention::NATIVE) }
    }

    /// Summary of item `index`. Missing or mistyped properties read as defaults.
    pub fn item(&self, index: u32) -> ArchiveItem {
        ArchiveItem {
            index,
            path: safe_cast(&self.property(index, PropId::PATH), String::new()),
            size: self.property(index, PropId::SIZE).as_u64().unwrap_or(0),
            packed_size: self.property(index, PropId::PACK_SIZE).as_u64().unwrap_or(0),
            is_dir: safe_cast(&self.property(index, PropId::IS_DIR), false),
            encrypted: safe_cast(&self.property(index, PropId::ENCRYPTED), false),
            crc: self.property(index, PropId::CRC).get::<u32>(),
            modified: self.property(index, PropId::MTIME).get::<FileTime>(),
        }
    }

    /// Extract (or test) the items in `indices`.
    pub fn extract<C>(&self, indices: &[u32], test_mode: bool, callback: C) -> BridgeResult<Outcome<C>>
    where
        C: ArchiveExtractCallback + 'static,
    {
        let count = u32::try_from(indices.len()).map_err(|_| BridgeError::native(HResult::E_INVALIDARG))?;
        self.run_extract(indices.as_ptr(), count, test_mode, callback)
    }

    /// Extract (or test) every item.
    pub fn extract_all<C>(&self, test_mode: bool, callback: C) -> BridgeResult<Outcome<C>>
    where
        C: ArchiveExtractCallback + 'static,
    {
        self.run_extract(ptr::null(), ALL_ITEMS, test_mode, callback)
    }

    fn run_extract<C>(&self, indices: *const u32, count: u32, test_mode: bool, callback: C) -> BridgeResult<Outcome<C>>
    where
        C: ArchiveExtractCallback + 'static,
    {
        let bundle = extract::build(&self.manager, callback)?;
        // SAFETY: `indices` is null (with ALL_ITEMS) or borrowed from the
        // caller for the duration of the call.
        let status = HResult(unsafe {
            (self.table.extract)(self.handle, indices, count, i32::from(test_mode), bundle.handle())
        });
        tracing::debug!(handle = %self.handle, count, test_mode, status = %status, "IInArchive::Extract");
        let callback = bundle.into_inner()?.into_callback();
        Ok(Outcome { status, value: callback })
    }

    pub fn number_of_properties(&self) -> BridgeResult<u32> {
        read_count(self.table.number_of_properties, self.handle)
    }

    pub fn property_info(&self, index: u32) -> PropertyInfo {
        read_property_info(self.table.property_info, self.handle, index)
    }

    pub fn number_of_archive_properties(&self) -> BridgeResult<u32> {
        read_count(self.table.number_of_archive_properties, self.handle)
    }

    pub fn archive_property_info(&self, index: u32) -> PropertyInfo {
        read_property_info(self.table.archive_property_info, self.handle, index)
    }

    /// View this archive as a writer, for in-place updates.
    pub fn as_out_archive(&self) -> BridgeResult<OutArchive<'_>> {
        let handle = self.cast(|c| c.in_to_out, "IOutArchive")?;
        OutArchive::alias(&self.manager, handle)
    }

    /// The archive's `ISetProperties` view.
    pub fn property_setter(&self) -> BridgeResult<PropertySetter<'_>> {
        let handle = self.cast(|c| c.in_to_set_properties, "ISetProperties")?;
        PropertySetter::alias(&self.manager, handle)
    }

    fn cast(
        &self,
        pick: impl FnOnce(&CastTable) -> Option<CastFn>,
        to: &'static str,
    ) -> BridgeResult<NativeHandle> {
        let failed = BridgeError::CastFailed { from: "IInArchive", to };
        let cast = pick(self.manager.table::<CastTable>()?).ok_or_else(|| failed.clone())?;
        // SAFETY: `handle` is a live IInArchive.
        let handle = unsafe { cast(self.handle) };
        if handle.is_null() {
            tracing::debug!(handle = %self.handle, to, "Cast refused");
            return Err(failed);
        }
        Ok(handle)
    }
}

/// Take the open callback state back after `IInArchive::Open` returned
/// `status`.
///
/// The input of a successful open is retained even when the state cannot be
/// taken back, since the engine reads from it until `close`.
fn settle_open<S: Any + Send + Sync>(
    retained: &mut Vec<Trampoline>,
    status: HResult,
    input: Trampoline,
    bundle: Trampoline<S>,
) -> BridgeResult<S> {
    if status.is_success() {
        retained.push(input);
    }
    bundle.into_inner().map_err(|_| {
        tracing::error!(status = %status, "Open callback state still referenced after IInArchive::Open");
        BridgeError::CallbackStateInUse {
            call: "IInArchive::Open",
            status,
        }
    })
}

impl Drop for InArchive {
    fn drop(&mut self) {
        if self.is_open() {
            self.close();
        }
        if let Some(release) = self.table.release {
            // SAFETY: the proxy owns this reference and drop runs once.
            unsafe { release(self.handle) };
            tracing::debug!(handle = %self.handle, "Released archive reader");
        }
    }
}

impl std::fmt::Debug for InArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InArchive")
            .field("handle", &self.handle)
            .field("retained", &self.retained.len())
            .finish()
    }
}
