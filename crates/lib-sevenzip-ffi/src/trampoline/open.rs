//! `IArchiveOpenCallback` trampolines, including the optional password and
//! volume slots.

use super::{bridge_status, dispatch, read_opt, stream, with_host, write_out, Children, Trampoline};
use crate::abi::*;
use crate::codec::{decode_wide_cstr, encode_variant, NativeString, RawPropVariant, RawString, StringConvention};
use crate::error::BridgeResult;
use crate::host::ArchiveOpenCallback;
use crate::manager::LibraryManager;
use crate::registry::BundleKind;
use lib_archive_types::{HResult, PropId};
use std::sync::{Arc, Mutex};

pub struct OpenState<C> {
    callback: Mutex<C>,
    manager: Arc<LibraryManager>,
    volumes: Children,
}

impl<C> OpenState<C> {
    /// The host callback and the volume streams opened during the call.
    pub(crate) fn into_parts(self) -> (C, Vec<Trampoline>) {
        let volumes = self.volumes.take();
        let callback = self
            .callback
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        (callback, volumes)
    }
}

/// Build the native open callback for `callback`.
pub(crate) fn build<C: ArchiveOpenCallback + 'static>(
    manager: &Arc<LibraryManager>,
    mut callback: C,
) -> BridgeResult<Trampoline<OpenState<C>>> {
    let table = manager.table::<BundleTable<CreateOpenCallbackFn>>()?;
    let has_password = callback.password().is_some();
    let has_volumes = callback.volumes().is_some();

    // SAFETY: every slot matches its documented signature.
    let handle = unsafe {
        (table.create)(
            set_total::<C>,
            set_completed::<C>,
            has_password.then_some(password::<C> as PasswordFn),
            has_volumes.then_some(volume_property::<C> as VolumePropertyFn),
            has_volumes.then_some(volume_stream::<C> as VolumeStreamFn),
        )
    };
    tracing::debug!(has_password, has_volumes, "Building open callback");

    Trampoline::register(
        "CreateIArchiveOpenCallback",
        handle,
        BundleKind::OpenCallback,
        table.release,
        Arc::new(OpenState {
            callback: Mutex::new(callback),
            manager: manager.clone(),
            volumes: Children::default(),
        }),
    )
}

unsafe extern "C" fn set_total<C: ArchiveOpenCallback + 'static>(
    this: NativeHandle,
    files: *const u64,
    bytes: *const u64,
) -> i32 {
    dispatch::<OpenState<C>, _>(this, "SetTotal", |state| {
        // SAFETY: optional in-pointers supplied by the engine.
        let (files, bytes) = unsafe { (read_opt(files), read_opt(bytes)) };
        with_host(&state.callback, "SetTotal", |cb| cb.set_total(files, bytes))?;
        Ok(HResult::S_OK)
    })
}

unsafe extern "C" fn set_completed<C: ArchiveOpenCallback + 'static>(
    this: NativeHandle,
    files: *const u64,
    bytes: *const u64,
) -> i32 {
    dispatch::<OpenState<C>, _>(this, "SetCompleted", |state| {
        // SAFETY: optional in-pointers supplied by the engine.
        let (files, bytes) = unsafe { (read_opt(files), read_opt(bytes)) };
        with_host(&state.callback, "SetCompleted", |cb| cb.set_completed(files, bytes))?;
        Ok(HResult::S_OK)
    })
}

unsafe extern "C" fn password<C: ArchiveOpenCallback + 'static>(this: NativeHandle, out: *mut RawString) -> i32 {
    dispatch::<OpenState<C>, _>(this, "CryptoGetTextPassword", |state| {
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

unsafe extern "C" fn volume_property<C: ArchiveOpenCallback + 'static>(
    this: NativeHandle,
    prop_id: u32,
    value: *mut RawPropVariant,
) -> i32 {
    dispatch::<OpenState<C>, _>(this, "GetProperty", |state| {
        if value.is_null() {
            return Err(HResult::E_INVALIDARG);
        }
        let prop = with_host(&state.callback, "GetProperty", |cb| {
            cb.volumes().ok_or(HResult::E_NOTIMPL)?.volume_property(PropId(prop_id))
        })?;
        let encoded = encode_variant(&prop, StringConvention::NATIVE).map_err(|e| bridge_status("GetProperty", e))?;
        // SAFETY: checked non-null; the engine owns the payload from here.
        unsafe { value.write(encoded.into_raw()) };
        Ok(HResult::S_OK)
    })
}

unsafe extern "C" fn volume_stream<C: ArchiveOpenCallback + 'static>(
    this: NativeHandle,
    name: *const libc::wchar_t,
    out: *mut NativeHandle,
) -> i32 {
    dispatch::<OpenState<C>, _>(this, "GetStream", |state| {
        // SAFETY: out-pointer supplied by the engine.
        unsafe { write_out(out, NativeHandle::NULL) };
        // SAFETY: the engine passes a null-terminated name.
        let name = unsafe { decode_wide_cstr(name, StringConvention::NATIVE) }.ok_or(HResult::E_INVALIDARG)?;

        let volume = with_host(&state.callback, "GetStream", |cb| {
            cb.volumes().ok_or(HResult::E_NOTIMPL)?.volume_stream(&name)
        })?;
        let Some(volume) = volume else {
            tracing::debug!(volume = %name, "Volume not found");
            return Ok(HResult::S_FALSE);
        };

        let child = stream::seekable_in_stream(&state.manager, volume).map_err(|e| bridge_status("GetStream", e))?;
        // SAFETY: out-pointer supplied by the engine.
        unsafe { write_out(out, child.handle()) };
        tracing::debug!(volume = %name, handle = %child.handle(), "Opened volume stream");
        state.volumes.adopt(child.erase());
        Ok(HResult::S_OK)
    })
}
