//! Stream trampolines: `ISequentialInStream`, `IInStream`,
//! `ISequentialOutStream` and `IOutStream`.

use super::{dispatch, with_host, write_out, Trampoline};
use crate::abi::*;
use crate::error::{BridgeError, BridgeResult};
use crate::host::{SequentialInStream, SequentialOutStream};
use crate::manager::LibraryManager;
use crate::registry::BundleKind;
use lib_archive_types::{HResult, HostResult};
use std::io::SeekFrom;
use std::sync::{Arc, Mutex};

/// Host stream behind a stream bundle.
pub struct StreamState<S> {
    stream: Mutex<S>,
}

impl<S> StreamState<S> {
    fn new(stream: S) -> Arc<Self> {
        Arc::new(Self {
            stream: Mutex::new(stream),
        })
    }

    /// Take the host stream back.
    pub fn into_stream(self) -> S {
        self.stream.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Wrap an input stream, as `IInStream` if it can seek.
pub(crate) fn in_stream<S: SequentialInStream + 'static>(
    manager: &LibraryManager,
    mut stream: S,
) -> BridgeResult<Trampoline<StreamState<S>>> {
    if stream.seeker().is_some() {
        seekable_in_stream(manager, stream)
    } else {
        let table = manager.table::<BundleTable<CreateSequentialInStreamFn>>()?;
        // SAFETY: the function pointer matches the documented slot.
        let handle = unsafe { (table.create)(read::<S>) };
        Trampoline::register(
            "CreateISequentialInStream",
            handle,
            BundleKind::SequentialInStream,
            table.release,
            StreamState::new(stream),
        )
    }
}

/// Wrap an input stream that must be seekable.
pub(crate) fn seekable_in_stream<S: SequentialInStream + 'static>(
    manager: &LibraryManager,
    mut stream: S,
) -> BridgeResult<Trampoline<StreamState<S>>> {
    if stream.seeker().is_none() {
        return Err(BridgeError::MissingCapability { capability: "seek" });
    }
    let table = manager.table::<BundleTable<CreateInStreamFn>>()?;
    // SAFETY: the function pointers match the documented slots.
    let handle = unsafe { (table.create)(read::<S>, seek_in::<S>) };
    Trampoline::register(
        "CreateIInStream",
        handle,
        BundleKind::InStream,
        table.release,
        StreamState::new(stream),
    )
}

/// Wrap an output stream, as `IOutStream` if it can seek.
pub(crate) fn out_stream<S: SequentialOutStream + 'static>(
    manager: &LibraryManager,
    mut stream: S,
) -> BridgeResult<Trampoline<StreamState<S>>> {
    if stream.seeker().is_some() {
        let table = manager.table::<BundleTable<CreateOutStreamFn>>()?;
        // SAFETY: the function pointers match the documented slots.
        let handle = unsafe { (table.create)(write::<S>, seek_out::<S>, set_size::<S>) };
        Trampoline::register(
            "CreateIOutStream",
            handle,
            BundleKind::OutStream,
            table.release,
            StreamState::new(stream),
        )
    } else {
        let table = manager.table::<BundleTable<CreateSequentialOutStreamFn>>()?;
        // SAFETY: the function pointer matches the documented slot.
        let handle = unsafe { (table.create)(write::<S>) };
        Trampoline::register(
            "CreateISequentialOutStream",
            handle,
            BundleKind::SequentialOutStream,
            table.release,
            StreamState::new(stream),
        )
    }
}

/// Decode a `STREAM_SEEK_*` origin and offset.
fn seek_from(offset: i64, origin: u32) -> HostResult<SeekFrom> {
    match origin {
        0 => u64::try_from(offset)
            .map(SeekFrom::Start)
            .map_err(|_| HResult::E_INVALIDARG),
        1 => Ok(SeekFrom::Current(offset)),
        2 => Ok(SeekFrom::End(offset)),
        _ => Err(HResult::E_INVALIDARG),
    }
}

unsafe extern "C" fn read<S: SequentialInStream + 'static>(
    this: NativeHandle,
    data: *mut u8,
    size: u32,
    processed: *mut u32,
) -> i32 {
    dispatch::<StreamState<S>, _>(this, "Read", |state| {
        // SAFETY: out-pointer supplied by the engine.
        unsafe { write_out(processed, 0) };
        if size == 0 {
            return Ok(HResult::S_OK);
        }
        if data.is_null() {
            return Err(HResult::E_INVALIDARG);
        }
        // SAFETY: the engine hands us a buffer of `size` writable bytes.
        let buf = unsafe { std::slice::from_raw_parts_mut(data, size as usize) };
        let n = with_host(&state.stream, "Read", |s| s.read(buf))?.min(size as usize);
        // SAFETY: as above.
        unsafe { write_out(processed, n as u32) };
        Ok(HResult::S_OK)
    })
}

unsafe extern "C" fn seek_in<S: SequentialInStream + 'static>(
    this: NativeHandle,
    offset: i64,
    origin: u32,
    new_position: *mut u64,
) -> i32 {
    dispatch::<StreamState<S>, _>(this, "Seek", |state| {
        let pos = seek_from(offset, origin)?;
        let at = with_host(&state.stream, "Seek", |s| {
            s.seeker().ok_or(HResult::E_NOTIMPL)?.seek(pos)
        })?;
        // SAFETY: out-pointer supplied by the engine.
        unsafe { write_out(new_position, at) };
        Ok(HResult::S_OK)
    })
}

unsafe extern "C" fn write<S: SequentialOutStream + 'static>(
    this: NativeHandle,
    data: *const u8,
    size: u32,
    processed: *mut u32,
) -> i32 {
    dispatch::<StreamState<S>, _>(this, "Write", |state| {
        // SAFETY: out-pointer supplied by the engine.
        unsafe { write_out(processed, 0) };
        if size == 0 {
            return Ok(HResult::S_OK);
        }
        if data.is_null() {
            return Err(HResult::E_INVALIDARG);
        }
        // SAFETY: the engine hands us `size` readable bytes.
        let buf = unsafe { std::slice::from_raw_parts(data, size as usize) };
        let n = with_host(&state.stream, "Write", |s| s.write(buf))?.min(size as usize);
        // SAFETY: as above.
        unsafe { write_out(processed, n as u32) };
        Ok(HResult::S_OK)
    })
}

unsafe extern "C" fn seek_out<S: SequentialOutStream + 'static>(
    this: NativeHandle,
    offset: i64,
    origin: u32,
    new_position: *mut u64,
) -> i32 {
    dispatch::<StreamState<S>, _>(this, "Seek", |state| {
        let pos = seek_from(offset, origin)?;
        let at = with_host(&state.stream, "Seek", |s| {
            s.seeker().ok_or(HResult::E_NOTIMPL)?.seek(pos)
        })?;
        // SAFETY: out-pointer supplied by the engine.
        unsafe { write_out(new_position, at) };
        Ok(HResult::S_OK)
    })
}

unsafe extern "C" fn set_size<S: SequentialOutStream + 'static>(this: NativeHandle, size: u64) -> i32 {
    dispatch::<StreamState<S>, _>(this, "SetSize", |state| {
        with_host(&state.stream, "SetSize", |s| {
            s.seeker().ok_or(HResult::E_NOTIMPL)?.set_size(size)
        })?;
        Ok(HResult::S_OK)
    })
}
