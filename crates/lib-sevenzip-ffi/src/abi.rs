//! Entry point signatures and resolved symbol tables.
//!
//! Every function the engine exports, and every function it calls back, is
//! listed here with its C signature. A table groups the entry points one
//! proxy or trampoline family needs; tables are resolved once per
//! [`LibraryManager`] and cached there.

use crate::codec::{RawPropVariant, RawString};
use crate::error::BridgeResult;
use crate::manager::LibraryManager;
use lib_archive_types::Guid;
use std::fmt;

/// Pointer-width identity of a native object. Never dereferenced by the host.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(pub usize);

impl NativeHandle {
    pub const NULL: NativeHandle = NativeHandle(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Host callbacks (implemented by trampolines, called by the engine)
// ---------------------------------------------------------------------------

/// Open progress: `HRESULT SetTotal/SetCompleted(this, const UInt64 *files, const UInt64 *bytes)`.
pub type OpenProgressFn = unsafe extern "C" fn(this: NativeHandle, files: *const u64, bytes: *const u64) -> i32;

/// `HRESULT CryptoGetTextPassword(this, BSTR *password)`.
pub type PasswordFn = unsafe extern "C" fn(this: NativeHandle, password: *mut RawString) -> i32;

/// `HRESULT GetProperty(this, PROPID propId, PROPVARIANT *value)` on the volume callback.
pub type VolumePropertyFn =
    unsafe extern "C" fn(this: NativeHandle, prop_id: u32, value: *mut RawPropVariant) -> i32;

/// `HRESULT GetStream(this, const wchar_t *name, IInStream **stream)` on the volume callback.
pub type VolumeStreamFn =
    unsafe extern "C" fn(this: NativeHandle, name: *const libc::wchar_t, stream: *mut NativeHandle) -> i32;

/// `HRESULT SetTotal(this, UInt64 total)`.
pub type SetTotalFn = unsafe extern "C" fn(this: NativeHandle, total: u64) -> i32;

/// `HRESULT SetCompleted(this, const UInt64 *completed)`.
pub type SetCompletedFn = unsafe extern "C" fn(this: NativeHandle, completed: *const u64) -> i32;

/// `HRESULT SetOperationResult(this, Int32 result)`.
pub type SetOperationResultFn = unsafe extern "C" fn(this: NativeHandle, result: i32) -> i32;

/// `HRESULT PrepareOperation(this, Int32 askExtractMode)`.
pub type PrepareOperationFn = unsafe extern "C" fn(this: NativeHandle, ask_mode: i32) -> i32;

/// `HRESULT GetStream(this, UInt32 index, ISequentialOutStream **out, Int32 askExtractMode)`.
pub type ExtractGetStreamFn =
    unsafe extern "C" fn(this: NativeHandle, index: u32, stream: *mut NativeHandle, ask_mode: i32) -> i32;

/// `HRESULT GetUpdateItemInfo(this, UInt32 index, Int32 *newData, Int32 *newProps, UInt32 *indexInArchive)`.
pub type UpdateItemInfoFn = unsafe extern "C" fn(
    this: NativeHandle,
    index: u32,
    new_data: *mut i32,
    new_properties: *mut i32,
    index_in_archive: *mut u32,
) -> i32;

/// `HRESULT GetProperty(this, UInt32 index, PROPID propId, PROPVARIANT *value)`.
pub type UpdateGetPropertyFn =
    unsafe extern "C" fn(this: NativeHandle, index: u32, prop_id: u32, value: *mut RawPropVariant) -> i32;

/// `HRESULT GetStream(this, UInt32 index, ISequentialInStream **in)`.
pub type UpdateGetStreamFn = unsafe extern "C" fn(this: NativeHandle, index: u32, stream: *mut NativeHandle) -> i32;

/// `HRESULT Read(this, void *data, UInt32 size, UInt32 *processed)`.
pub type ReadFn = unsafe extern "C" fn(this: NativeHandle, data: *mut u8, size: u32, processed: *mut u32) -> i32;

/// `HRESULT Write(this, const void *data, UInt32 size, UInt32 *processed)`.
pub type WriteFn =
    unsafe extern "C" fn(this: NativeHandle, data: *const u8, size: u32, processed: *mut u32) -> i32;

/// `HRESULT Seek(this, Int64 offset, UInt32 origin, UInt64 *newPosition)`.
pub type SeekFn = unsafe extern "C" fn(this: NativeHandle, offset: i64, origin: u32, new_position: *mut u64) -> i32;

/// `HRESULT SetSize(this, UInt64 size)`.
pub type SetSizeFn = unsafe extern "C" fn(this: NativeHandle, size: u64) -> i32;

// ---------------------------------------------------------------------------
// Engine entry points
// ---------------------------------------------------------------------------

pub type CreateObjectFn =
    unsafe extern "C" fn(class_id: *const Guid, interface_id: *const Guid, object: *mut NativeHandle) -> i32;
pub type ReleaseFn = unsafe extern "C" fn(this: NativeHandle);
/// Returns null when the object does not implement the target interface.
pub type CastFn = unsafe extern "C" fn(this: NativeHandle) -> NativeHandle;

pub type InOpenFn = unsafe extern "C" fn(
    this: NativeHandle,
    stream: NativeHandle,
    max_check_start_position: *const u64,
    callback: NativeHandle,
) -> i32;
pub type InCloseFn = unsafe extern "C" fn(this: NativeHandle);
pub type GetCountFn = unsafe extern "C" fn(this: NativeHandle, count: *mut u32) -> u32;
pub type GetItemPropertyFn =
    unsafe extern "C" fn(this: NativeHandle, index: u32, prop_id: u32, value: *mut RawPropVariant);
pub type GetArchivePropertyFn = unsafe extern "C" fn(this: NativeHandle, prop_id: u32, value: *mut RawPropVariant);
pub type ExtractFn = unsafe extern "C" fn(
    this: NativeHandle,
    indices: *const u32,
    num_items: u32,
    test_mode: i32,
    callback: NativeHandle,
) -> i32;
pub type GetPropertyInfoFn =
    unsafe extern "C" fn(this: NativeHandle, index: u32, name: *mut RawString, prop_id: *mut u32, var_type: *mut u16);

pub type UpdateItemsFn =
    unsafe extern "C" fn(this: NativeHandle, out_stream: NativeHandle, num_items: u32, callback: NativeHandle) -> i32;
pub type GetFileTimeTypeFn = unsafe extern "C" fn(this: NativeHandle, time_type: *mut u32);

pub type SetPropertiesFn = unsafe extern "C" fn(
    this: NativeHandle,
    names: *const RawString,
    values: *const RawPropVariant,
    num_properties: u32,
) -> i32;

pub type CreateOpenCallbackFn = unsafe extern "C" fn(
    set_total: OpenProgressFn,
    set_completed: OpenProgressFn,
    password: Option<PasswordFn>,
    volume_property: Option<VolumePropertyFn>,
    volume_stream: Option<VolumeStreamFn>,
) -> NativeHandle;

pub type CreateExtractCallbackFn = unsafe extern "C" fn(
    set_total: SetTotalFn,
    set_completed: SetCompletedFn,
    set_operation_result: SetOperationResultFn,
    prepare_operation: PrepareOperationFn,
    get_stream: ExtractGetStreamFn,
    password: Option<PasswordFn>,
) -> NativeHandle;

pub type CreateUpdateCallbackFn = unsafe extern "C" fn(
    set_total: SetTotalFn,
    set_completed: SetCompletedFn,
    update_item_info: UpdateItemInfoFn,
    get_property: UpdateGetPropertyFn,
    get_stream: UpdateGetStreamFn,
    set_operation_result: SetOperationResultFn,
    password: Option<PasswordFn>,
) -> NativeHandle;

pub type CreateSequentialInStreamFn = unsafe extern "C" fn(read: ReadFn) -> NativeHandle;
pub type CreateInStreamFn = unsafe extern "C" fn(read: ReadFn, seek: SeekFn) -> NativeHandle;
pub type CreateSequentialOutStreamFn = unsafe extern "C" fn(write: WriteFn) -> NativeHandle;
pub type CreateOutStreamFn = unsafe extern "C" fn(write: WriteFn, seek: SeekFn, set_size: SetSizeFn) -> NativeHandle;

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// A group of entry points resolved together.
pub(crate) trait SymbolFamily: Sized {
    /// Family name, for logging.
    const NAME: &'static str;

    fn resolve(manager: &LibraryManager) -> BridgeResult<Self>;
}

#[derive(Clone, Copy)]
pub(crate) struct CoreTable {
    pub create_object: CreateObjectFn,
}

impl SymbolFamily for CoreTable {
    const NAME: &'static str = "core";

    fn resolve(m: &LibraryManager) -> BridgeResult<Self> {
        // SAFETY: signatures as documented above.
        unsafe {
            Ok(Self {
                create_object: m.symbol("CreateObject")?,
            })
        }
    }
}

#[derive(Clone, Copy)]
pub(crate) struct InArchiveTable {
    pub open: InOpenFn,
    pub close: InCloseFn,
    pub number_of_items: GetCountFn,
    pub property: GetItemPropertyFn,
    pub extract: ExtractFn,
    pub archive_property: GetArchivePropertyFn,
    pub number_of_properties: GetCountFn,
    pub property_info: GetPropertyInfoFn,
    pub number_of_archive_properties: GetCountFn,
    pub archive_property_info: GetPropertyInfoFn,
    pub release: Option<ReleaseFn>,
}

impl SymbolFamily for InArchiveTable {
    const NAME: &'static str = "IInArchive";

    fn resolve(m: &LibraryManager) -> BridgeResult<Self> {
        // SAFETY: signatures as documented above.
        unsafe {
            Ok(Self {
                open: m.symbol("IInArchive_Open")?,
                close: m.symbol("IInArchive_Close")?,
                number_of_items: m.symbol("IInArchive_GetNumberOfItems")?,
                property: m.symbol("IInArchive_GetProperty")?,
                extract: m.symbol("IInArchive_Extract")?,
                archive_property: m.symbol("IInArchive_GetArchiveProperty")?,
                number_of_properties: m.symbol("IInArchive_GetNumberOfProperties")?,
                property_info: m.symbol("IInArchive_GetPropertyInfo")?,
                number_of_archive_properties: m.symbol("IInArchive_GetNumberOfArchiveProperties")?,
                archive_property_info: m.symbol("IInArchive_GetArchivePropertyInfo")?,
                release: m.try_symbol("IInArchive_Release"),
            })
        }
    }
}

#[derive(Clone, Copy)]
pub(crate) struct OutArchiveTable {
    pub update_items: UpdateItemsFn,
    pub file_time_type: GetFileTimeTypeFn,
    pub release: Option<ReleaseFn>,
}

impl SymbolFamily for OutArchiveTable {
    const NAME: &'static str = "IOutArchive";

    fn resolve(m: &LibraryManager) -> BridgeResult<Self> {
        // SAFETY: signatures as documented above.
        unsafe {
            Ok(Self {
                update_items: m.symbol("OutArchiveWrapper_UpdateItems")?,
                file_time_type: m.symbol("OutArchiveWrapper_GetFileTimeType")?,
                release: m.try_symbol("IOutArchive_Release"),
            })
        }
    }
}

/// `ISetProperties` is only ever reached through a cast, so it has no
/// release entry of its own.
#[derive(Clone, Copy)]
pub(crate) struct SetPropertiesTable {
    pub set_properties: SetPropertiesFn,
}

impl SymbolFamily for SetPropertiesTable {
    const NAME: &'static str = "ISetProperties";

    fn resolve(m: &LibraryManager) -> BridgeResult<Self> {
        // SAFETY: signatures as documented above.
        unsafe {
            Ok(Self {
                set_properties: m.symbol("ISetProperties_SetProperties")?,
            })
        }
    }
}

/// Interface casts. Each is optional; a missing cast behaves like a
/// refused one.
#[derive(Clone, Copy)]
pub(crate) struct CastTable {
    pub in_to_out: Option<CastFn>,
    pub in_to_set_properties: Option<CastFn>,
    pub out_to_set_properties: Option<CastFn>,
}

impl SymbolFamily for CastTable {
    const NAME: &'static str = "casts";

    fn resolve(m: &LibraryManager) -> BridgeResult<Self> {
        // Loading must succeed even though every entry is optional.
        m.module()?;
        // SAFETY: signatures as documented above.
        unsafe {
            Ok(Self {
                in_to_out: m.try_symbol("Cast_IInArchive_IOutArchive"),
                in_to_set_properties: m.try_symbol("Cast_IInArchive_ISetProperties"),
                out_to_set_properties: m.try_symbol("Cast_IOutArchive_ISetProperties"),
            })
        }
    }
}

/// Constructor and destructor of one trampoline family.
#[derive(Clone, Copy)]
pub(crate) struct BundleTable<C> {
    pub create: C,
    pub release: ReleaseFn,
}

macro_rules! bundle_family {
    ($create_ty:ty, $create:literal, $release:literal) => {
        impl SymbolFamily for BundleTable<$create_ty> {
            const NAME: &'static str = $create;

            fn resolve(m: &LibraryManager) -> BridgeResult<Self> {
                // SAFETY: signatures as documented above.
                unsafe {
                    Ok(Self {
                        create: m.symbol($create)?,
                        release: m.symbol($release)?,
                    })
                }
            }
        }
    };
}

bundle_family!(CreateOpenCallbackFn, "CreateIArchiveOpenCallback", "ReleaseIArchiveOpenCallback");
bundle_family!(CreateExtractCallbackFn, "CreateIArchiveExtractCallback", "ReleaseIArchiveExtractCallback");
bundle_family!(CreateUpdateCallbackFn, "CreateIArchiveUpdateCallback", "ReleaseIArchiveUpdateCallback");
bundle_family!(CreateSequentialInStreamFn, "CreateISequentialInStream", "ReleaseISequentialInStream");
bundle_family!(CreateInStreamFn, "CreateIInStream", "ReleaseIInStream");
bundle_family!(CreateSequentialOutStreamFn, "CreateISequentialOutStream", "ReleaseISequentialOutStream");
bundle_family!(CreateOutStreamFn, "CreateIOutStream", "ReleaseIOutStream");
