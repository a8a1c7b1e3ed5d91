//! `IArchiveUpdateCallback` trampolines.

use super::{bridge_status, dispatch, read_opt, stream, with_host, write_out, Children, Trampoline};
use crate::abi::*;
use crate::codec::{encode_variant, NativeString, RawPropVariant, RawString, StringConvention};
use crate::error::BridgeResult;
use crate::host::ArchiveUpdateCallback;
use crate::manager::LibraryManager;
use crate::registry::BundleKind;
use lib_archive_types::{HResult, OperationResult, PropId};
use std::sync::{Arc, Mutex};

/// `indexInArchive` value for items that do not come from the source archive.
const NO_SOURCE_INDEX: u32 = u32::MAX;

pub struct UpdateState<C> {
    callback: Mutex<C>,
    manager: Arc<LibraryManager>,
    streams: Children,
}

impl<C> UpdateState<C> {
    /// Dispose any remaining input streams and return the host callback.
    pub(crate) fn into_callback(self) -> C {
        let leftover = self.streams.dispose_all();
        if leftover > 0 {
            tracing::debug!(leftover, "Disposed input streams without an operation result");
        }
        self.callback
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Build the native update callback for `callback`.
pub(crate) fn build<C: ArchiveUpdateCallback + 'static>(
    manager: &Arc<LibraryManager>,
    mut callback: C,
) -> BridgeResult<Trampoline<UpdateState<C>>> {
    let table = manager.table::<BundleTable<CreateUpdateCallbackFn>>()?;
    let has_password = callback.password().is_some();

    // SAFETY: every slot matches its documented signature.
    let handle = unsafe {
        (table.create)(
            set_total::<C>,
            set_completed::<C>,
            update_item_info::<C>,
            get_property::<C>,
            get_stream::<C>,
            set_operation_result::<C>,
            has_password.then_some(password::<C> as PasswordFn),
        )
    };

    Trampoline::register(
        "CreateIArchiveUpdateCallback",
        handle,
        BundleKind::UpdateCallback,
        table.release,
        Arc::new(UpdateState {
            callback: Mutex::new(callback),
            manager: manager.clone(),
            streams: Children::default(),
        }),
    )
}

unsafe extern "C" fn set_total<C: ArchiveUpdateCallback + 'static>(this: NativeHandle, total: u64) -> i32 {
    dispatch::<UpdateState<C>, _>(this, "SetTotal", |state| {
        with_host(&state.callback, "SetTotal", |cb| cb.set_total(total))?;
        Ok(HResult::S_OK)
    })
}

unsafe extern "C" fn set_completed<C: ArchiveUpdateCallback + 'static>(
    this: NativeHandle,
    completed: *const u64,
) -> i32 {
    dispatch::<UpdateState<C>, _>(this, "SetCompleted", |state| {
        // SAFETY: optional in-pointer supplied by the engine.
        let completed = unsafe { read_opt(completed) };
        with_host(&state.callback, "SetCompleted", |cb| cb.set_completed(completed))?;
        Ok(HResult::S_OK)
    })
}

unsafe extern "C" fn update_item_info<C: ArchiveUpdateCallback + 'static>(
    this: NativeHandle,
    index: u32,
    new_data: *mut i32,
    new_properties: *mut i32,
    index_in_archive: *mut u32,
) -> i32 {
    dispatch::<UpdateState<C>, _>(this, "GetUpdateItemInfo", |state| {
        let info = with_host(&state.callback, "GetUpdateItemInfo", |cb| cb.update_item_info(index))?;
        // SAFETY: out-pointers supplied by the engine; null ones are skipped.
        unsafe {
            write_out(new_data, i32::from(info.new_data));
            write_out(new_properties, i32::from(info.new_properties));
            write_out(index_in_archive, info.index_in_archive.unwrap_or(NO_SOURCE_INDEX));
        }
        Ok(HResult::S_OK)
    })
}

unsafe extern "C" fn get_property<C: ArchiveUpdateCallback + 'static>(
    this: NativeHandle,
    index: u32,
    prop_id: u32,
    value: *mut RawPropVariant,
) -> i32 {
    dispatch::<UpdateState<C>, _>(this, "GetProperty", |state| {
        if value.is_null() {
            return Err(HResult::E_INVALIDARG);
        }
        let prop = with_host(&state.callback, "GetProperty", |cb| cb.property(index, PropId(prop_id)))?;
        let encoded = encode_variant(&prop, StringConvention::NATIVE).map_err(|e| bridge_status("GetProperty", e))?;
        // SAFETY: checked non-null; the engine owns the payload from here.
        unsafe { value.write(encoded.into_raw()) };
        Ok(HResult::S_OK)
    })
}

unsafe extern "C" fn get_stream<C: ArchiveUpdateCallback + 'static>(
    this: NativeHandle,
    index: u32,
    out: *mut NativeHandle,
) -> i32 {
    dispatch::<UpdateState<C>, _>(this, "GetStream", |state| {
        // SAFETY: out-pointer supplied by the engine.
        unsafe { write_out(out, NativeHandle::NULL) };
        let source = with_host(&state.callback, "GetStream", |cb| cb.get_stream(index))?;
        let Some(source) = source else {
            return Ok(HResult::S_OK);
        };

        let child = stream::in_stream(&state.manager, source).map_err(|e| bridge_status("GetStream", e))?;
        // SAFETY: out-pointer supplied by the engine.
        unsafe { write_out(out, child.handle()) };
        state.streams.adopt(child.erase());
        Ok(HResult::S_OK)
    })
}

unsafe extern "C" fn set_operation_result<C: ArchiveUpdateCallback + 'static>(
    this: NativeHandle,
    result: i32,
) -> i32 {
    dispatch::<UpdateState<C>, _>(this, "SetOperationResult", |state| {
        let status = with_host(&state.callback, "SetOperationResult", |cb| {
            cb.set_operation_result(OperationResult::from(result))
        });
        state.streams.dispose_all();
        status?;
        Ok(HResult::S_OK)
    })
}

unsafe extern "C" fn password<C: ArchiveUpdateCallback + 'static>(this: NativeHandle, out: *mut RawString) -> i32 {
    dispatch::<UpdateState<C>, _>(this, "CryptoGetTextPassword2", |state| {
        if out.is_null() {
            return Err(HResult::E_INVALIDARG);
        }
        let password = with_host(&state.callback, "CryptoGetTextPassword2", |cb| {
            cb.password().ok_or(HResult::E_NOTIMPL)?.password()
        })?;
        let bstr = NativeString::new(&password, StringConvention::NATIVE)
            .map_err(|e| bridge_status("CryptoGetTextPassword2", e))?;
        // SAFETY: checked non-null; the engine takes ownership of the string.
        unsafe { out.write(bstr.into_raw()) };
        Ok(HResult::S_OK)
    })
}
