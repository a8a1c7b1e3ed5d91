//! `IArchiveExtractCallback` trampolines.
//!
//! Six slots: the five progress/stream methods plus an optional password
//! slot. Output streams handed out by `GetStream` belong to the callback
//! bundle and are disposed when the engine reports the item's result.

use super::{bridge_status, dispatch, read_opt, stream, with_host, write_out, Children, Trampoline};
use crate::abi::*;
use crate::codec::{NativeString, RawString, StringConvention};
use crate::error::BridgeResult;
use crate::host::ArchiveExtractCallback;
use crate::manager::LibraryManager;
use crate::registry::BundleKind;
use lib_archive_types::{AskMode, HResult, OperationResult};
use std::sync::{Arc, Mutex};

pub struct ExtractState<C> {
    callback: Mutex<C>,
    manager: Arc<LibraryManager>,
    streams: Children,
}

impl<C> ExtractState<C> {
    /// Dispose any remaining output streams and return the host callback.
    pub(crate) fn into_callback(self) -> C {
        let leftover = self.streams.dispose_all();
        if leftover > 0 {
            tracing::debug!(leftover, "Disposed output streams without an operation result");
        }
        self.callback
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Build the native extract callback for `callback`.
pub(crate) fn build<C: ArchiveExtractCallback + 'static>(
    manager: &Arc<LibraryManager>,
    mut callback: C,
) -> BridgeResult<Trampoline<ExtractState<C>>> {
    let table = manager.table::<BundleTable<CreateExtractCallbackFn>>()?;
    let has_password = callback.password().is_some();

    // SAFETY: every slot matches its documented signature.
    let handle = unsafe {
        (table.create)(
            set_total::<C>,
            set_completed::<C>,
            set_operation_result::<C>,
            prepare_operation::<C>,
            get_stream::<C>,
            has_password.then_some(password::<C> as PasswordFn),
        )
    };

    Trampoline::register(
        "CreateIArchiveExtractCallback",
        handle,
        BundleKind::ExtractCallback,
        table.release,
        Arc::new(ExtractState {
            callback: Mutex::new(callback),
            manager: manager.clone(),
            streams: Children::default(),
        }),
    )
}

unsafe extern "C" fn set_total<C: ArchiveExtractCallback + 'static>(this: NativeHandle, total: u64) -> i32 {
    dispatch::<ExtractState<C>, _>(this, "SetTotal", |state| {
        with_host(&state.callback, "SetTotal", |cb| cb.set_total(total))?;
        Ok(HResult::S_OK)
    })
}

unsafe extern "C" fn set_completed<C: ArchiveExtractCallback + 'static>(
    this: NativeHandle,
    completed: *const u64,
) -> i32 {
    dispatch::<ExtractState<C>, _>(this, "SetCompleted", |state| {
        // SAFETY: optional in-pointer supplied by the engine.
        let completed = unsafe { read_opt(completed) };
        with_host(&state.callback, "SetCompleted", |cb| cb.set_completed(completed))?;
        Ok(HResult::S_OK)
    })
}

unsafe extern "C" fn set_operation_result<C: ArchiveExtractCallback + 'static>(
    this: NativeHandle,
    result: i32,
) -> i32 {
    dispatch::<ExtractState<C>, _>(this, "SetOperationResult", |state| {
        let status = with_host(&state.callback, "SetOperationResult", |cb| {
            cb.set_operation_result(OperationResult::from(result))
        });
        // The item is finished whatever the host answered.
        state.streams.dispose_all();
        status?;
        Ok(HResult::S_OK)
    })
}

unsafe extern "C" fn prepare_operation<C: ArchiveExtractCallback + 'static>(
    this: NativeHandle,
    ask_mode: i32,
) -> i32 {
    dispatch::<ExtractState<C>, _>(this, "PrepareOperation", |state| {
        with_host(&state.callback, "PrepareOperation", |cb| {
            cb.prepare_operation(AskMode::from(ask_mode))
        })?;
        Ok(HResult::S_OK)
    })
}

unsafe extern "C" fn get_stream<C: ArchiveExtractCallback + 'static>(
    this: NativeHandle,
    index: u32,
    out: *mut NativeHandle,
    ask_mode: i32,
) -> i32 {
    dispatch::<ExtractState<C>, _>(this, "GetStream", |state| {
        // SAFETY: out-pointer supplied by the engine.
        unsafe { write_out(out, NativeHandle::NULL) };
        let mode = AskMode::from(ask_mode);
        let target = with_host(&state.callback, "GetStream", |cb| cb.get_stream(index, mode))?;
        let Some(target) = target else {
            return Ok(HResult::S_OK);
        };

        let child = stream::out_stream(&state.manager, target).map_err(|e| bridge_status("GetStream", e))?;
        // SAFETY: out-pointer supplied by the engine.
        unsafe { write_out(out, child.handle()) };
        state.streams.adopt(child.erase());
        Ok(HResult::S_OK)
    })
}

unsafe extern "C" fn password<C: ArchiveExtractCallback + 'static>(this: NativeHandle, out: *mut RawString) -> i32 {
    dispatch::<ExtractState<C>, _>(this, "CryptoGetTextPassword", |state| {
        if out.is_null() {
            return Err(HResult::E_INVALIDARG);
        }
        let password = with_host(&state.callback, "CryptoGetTextPassword", |cb| {
            cb.password().ok_or(HResult::E_NOTIMPL)?.password()
        })?;
        let bstr = NativeString::new(&password, StringConvention::NATIVE)
            .map_err(|e| bridge_status("CryptoGetTextPassword", e))?;
        // SAFETY: checked non-null; the engine takes ownership of the string.
        unsafe { out.write(bstr.into_raw()) };
        Ok(HResult::S_OK)
    })
}
