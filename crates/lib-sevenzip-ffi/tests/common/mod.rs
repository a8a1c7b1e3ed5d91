//! A stand-in for the native engine.
//!
//! Every entry point the bridge resolves is implemented here as an
//! `extern "C"` function and served by [`StubLoader`]. Wrapper objects are
//! boxed structs holding the function pointers the bridge passed in; the
//! box address is the handle. Archives are newline-separated item names.
//!
//! Calls are recorded per thread so parallel tests do not see each other.
//! Nothing here may panic: a panic inside an `extern "C"` function aborts.

#![allow(dead_code)]

use lib_archive_types::{Guid, HResult, PropId, PropVariant, VarType};
use lib_sevenzip_ffi::abi::*;
use lib_sevenzip_ffi::codec::{
    decode_string, decode_variant, encode_variant, take_variant, NativeString, RawPropVariant, RawString,
    StringConvention,
};
use lib_sevenzip_ffi::error::{BridgeError, BridgeResult};
use lib_sevenzip_ffi::loader::{ModuleHandle, NativeAddress, PlatformLoader};
use lib_sevenzip_ffi::{LibraryManager, ObjectRegistry};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::Path;
use std::ptr;
use std::sync::Arc;

const CONV: StringConvention = StringConvention::NATIVE;

/// Something the stub engine observed or did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    CreateObject,
    Created(&'static str),
    Released(&'static str),
    Password(String),
    VolumeName(String),
    Volume(String, i32),
    CallbackRegistered(bool),
    GetStream(u32),
    Item(String),
    SetProperty(String, PropVariant),
    Closed,
}

thread_local! {
    static EVENTS: RefCell<Vec<Event>> = const { RefCell::new(Vec::new()) };
    static SLOTS: RefCell<Vec<(&'static str, bool)>> = const { RefCell::new(Vec::new()) };
}

fn record(event: Event) {
    EVENTS.with(|events| events.borrow_mut().push(event));
}

/// Drain the events recorded on this thread.
pub fn take_events() -> Vec<Event> {
    EVENTS.with(|events| std::mem::take(&mut *events.borrow_mut()))
}

fn record_slot<T>(name: &'static str, slot: &Option<T>) {
    SLOTS.with(|slots| slots.borrow_mut().push((name, slot.is_some())));
}

/// Drain the optional callback slots seen on this thread, in creation
/// order, paired with whether the bridge filled them in.
pub fn take_slots() -> Vec<(&'static str, bool)> {
    SLOTS.with(|slots| std::mem::take(&mut *slots.borrow_mut()))
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

pub struct StubLoader {
    symbols: HashMap<&'static str, usize>,
}

impl PlatformLoader for StubLoader {
    fn open(&self, _path: &Path) -> BridgeResult<ModuleHandle> {
        Ok(ModuleHandle(0x5EB0))
    }

    fn resolve(&self, _module: ModuleHandle, name: &str) -> BridgeResult<NativeAddress> {
        self.symbols
            .get(name)
            .map(|&address| NativeAddress(address))
            .ok_or_else(|| BridgeError::symbol_not_found(name))
    }

    fn close(&self, _module: ModuleHandle) -> bool {
        true
    }

    fn last_error(&self) -> String {
        String::new()
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// A manager backed by the full stub engine.
pub fn manager() -> Arc<LibraryManager> {
    manager_without(&[])
}

/// A manager whose module lacks the named entry points.
pub fn manager_without(missing: &[&str]) -> Arc<LibraryManager> {
    let mut symbols = symbols();
    for name in missing {
        symbols.remove(*name);
    }
    LibraryManager::with_loader(Box::new(StubLoader { symbols }), "/stub/7z.so")
}

fn symbols() -> HashMap<&'static str, usize> {
    HashMap::from([
        ("CreateObject", create_object as usize),
        ("IInArchive_Open", in_open as usize),
        ("IInArchive_Close", in_close as usize),
        ("IInArchive_GetNumberOfItems", in_number_of_items as usize),
        ("IInArchive_GetProperty", in_property as usize),
        ("IInArchive_Extract", in_extract as usize),
        ("IInArchive_GetArchiveProperty", in_archive_property as usize),
        ("IInArchive_GetNumberOfProperties", in_number_of_properties as usize),
        ("IInArchive_GetPropertyInfo", in_property_info as usize),
        ("IInArchive_GetNumberOfArchiveProperties", in_number_of_archive_properties as usize),
        ("IInArchive_GetArchivePropertyInfo", in_archive_property_info as usize),
        ("IInArchive_Release", in_release as usize),
        ("OutArchiveWrapper_UpdateItems", out_update_items as usize),
        ("OutArchiveWrapper_GetFileTimeType", out_file_time_type as usize),
        ("IOutArchive_Release", out_release as usize),
        ("ISetProperties_SetProperties", set_properties as usize),
        ("Cast_IInArchive_IOutArchive", cast_alias as usize),
        ("Cast_IInArchive_ISetProperties", cast_alias as usize),
        ("Cast_IOutArchive_ISetProperties", cast_alias as usize),
        ("CreateIArchiveOpenCallback", create_open_callback as usize),
        ("ReleaseIArchiveOpenCallback", release_open_callback as usize),
        ("CreateIArchiveExtractCallback", create_extract_callback as usize),
        ("ReleaseIArchiveExtractCallback", release_extract_callback as usize),
        ("CreateIArchiveUpdateCallback", create_update_callback as usize),
        ("ReleaseIArchiveUpdateCallback", release_update_callback as usize),
        ("CreateISequentialInStream", create_sequential_in_stream as usize),
        ("ReleaseISequentialInStream", release_sequential_in_stream as usize),
        ("CreateIInStream", create_in_stream as usize),
        ("ReleaseIInStream", release_in_stream as usize),
        ("CreateISequentialOutStream", create_sequential_out_stream as usize),
        ("ReleaseISequentialOutStream", release_sequential_out_stream as usize),
        ("CreateIOutStream", create_out_stream as usize),
        ("ReleaseIOutStream", release_out_stream as usize),
    ])
}

// ---------------------------------------------------------------------------
// Wrapper objects
// ---------------------------------------------------------------------------

fn into_handle<T>(value: T, kind: &'static str) -> NativeHandle {
    record(Event::Created(kind));
    NativeHandle(Box::into_raw(Box::new(value)) as usize)
}

unsafe fn object<'a, T>(handle: NativeHandle) -> &'a T {
    unsafe { &*(handle.0 as *const T) }
}

unsafe fn destroy<T>(handle: NativeHandle, kind: &'static str) {
    drop(unsafe { Box::from_raw(handle.0 as *mut T) });
    record(Event::Released(kind));
}

struct OpenCallbackObj {
    set_total: OpenProgressFn,
    set_completed: OpenProgressFn,
    password: Option<PasswordFn>,
    volume_property: Option<VolumePropertyFn>,
    volume_stream: Option<VolumeStreamFn>,
}

struct ExtractCallbackObj {
    set_total: SetTotalFn,
    set_completed: SetCompletedFn,
    set_operation_result: SetOperationResultFn,
    prepare_operation: PrepareOperationFn,
    get_stream: ExtractGetStreamFn,
    password: Option<PasswordFn>,
}

struct UpdateCallbackObj {
    set_total: SetTotalFn,
    set_completed: SetCompletedFn,
    update_item_info: UpdateItemInfoFn,
    get_property: UpdateGetPropertyFn,
    get_stream: UpdateGetStreamFn,
    set_operation_result: SetOperationResultFn,
    password: Option<PasswordFn>,
}

struct InStreamObj {
    read: ReadFn,
    seek: Option<SeekFn>,
}

struct OutStreamObj {
    write: WriteFn,
    seek: Option<SeekFn>,
    set_size: Option<SetSizeFn>,
}

unsafe extern "C" fn create_open_callback(
    set_total: OpenProgressFn,
    set_completed: OpenProgressFn,
    password: Option<PasswordFn>,
    volume_property: Option<VolumePropertyFn>,
    volume_stream: Option<VolumeStreamFn>,
) -> NativeHandle {
    record_slot("IArchiveOpenCallback::password", &password);
    record_slot("IArchiveOpenCallback::volume_property", &volume_property);
    record_slot("IArchiveOpenCallback::volume_stream", &volume_stream);
    let obj = OpenCallbackObj {
        set_total,
        set_completed,
        password,
        volume_property,
        volume_stream,
    };
    into_handle(obj, "IArchiveOpenCallback")
}

unsafe extern "C" fn release_open_callback(this: NativeHandle) {
    unsafe { destroy::<OpenCallbackObj>(this, "IArchiveOpenCallback") }
}

unsafe extern "C" fn create_extract_callback(
    set_total: SetTotalFn,
    set_completed: SetCompletedFn,
    set_operation_result: SetOperationResultFn,
    prepare_operation: PrepareOperationFn,
    get_stream: ExtractGetStreamFn,
    password: Option<PasswordFn>,
) -> NativeHandle {
    record_slot("IArchiveExtractCallback::password", &password);
    let obj = ExtractCallbackObj {
        set_total,
        set_completed,
        set_operation_result,
        prepare_operation,
        get_stream,
        password,
    };
    into_handle(obj, "IArchiveExtractCallback")
}

unsafe extern "C" fn release_extract_callback(this: NativeHandle) {
    unsafe { destroy::<ExtractCallbackObj>(this, "IArchiveExtractCallback") }
}

unsafe extern "C" fn create_update_callback(
    set_total: SetTotalFn,
    set_completed: SetCompletedFn,
    update_item_info: UpdateItemInfoFn,
    get_property: UpdateGetPropertyFn,
    get_stream: UpdateGetStreamFn,
    set_operation_result: SetOperationResultFn,
    password: Option<PasswordFn>,
) -> NativeHandle {
    record_slot("IArchiveUpdateCallback::password", &password);
    let obj = UpdateCallbackObj {
        set_total,
        set_completed,
        update_item_info,
        get_property,
        get_stream,
        set_operation_result,
        password,
    };
    into_handle(obj, "IArchiveUpdateCallback")
}

unsafe extern "C" fn release_update_callback(this: NativeHandle) {
    unsafe { destroy::<UpdateCallbackObj>(this, "IArchiveUpdateCallback") }
}

unsafe extern "C" fn create_sequential_in_stream(read: ReadFn) -> NativeHandle {
    into_handle(InStreamObj { read, seek: None }, "ISequentialInStream")
}

unsafe extern "C" fn release_sequential_in_stream(this: NativeHandle) {
    unsafe { destroy::<InStreamObj>(this, "ISequentialInStream") }
}

unsafe extern "C" fn create_in_stream(read: ReadFn, seek: SeekFn) -> NativeHandle {
    into_handle(InStreamObj { read, seek: Some(seek) }, "IInStream")
}

unsafe extern "C" fn release_in_stream(this: NativeHandle) {
    unsafe { destroy::<InStreamObj>(this, "IInStream") }
}

unsafe extern "C" fn create_sequential_out_stream(write: WriteFn) -> NativeHandle {
    let obj = OutStreamObj {
        write,
        seek: None,
        set_size: None,
    };
    into_handle(obj, "ISequentialOutStream")
}

unsafe extern "C" fn release_sequential_out_stream(this: NativeHandle) {
    unsafe { destroy::<OutStreamObj>(this, "ISequentialOutStream") }
}

unsafe extern "C" fn create_out_stream(write: WriteFn, seek: SeekFn, set_size: SetSizeFn) -> NativeHandle {
    let obj = OutStreamObj {
        write,
        seek: Some(seek),
        set_size: Some(set_size),
    };
    into_handle(obj, "IOutStream")
}

unsafe extern "C" fn release_out_stream(this: NativeHandle) {
    unsafe { destroy::<OutStreamObj>(this, "IOutStream") }
}

// ---------------------------------------------------------------------------
// Stream helpers
// ---------------------------------------------------------------------------

fn check(hr: i32) -> Result<(), i32> {
    if hr >= 0 {
        Ok(())
    } else {
        Err(hr)
    }
}

fn status(result: Result<(), i32>) -> i32 {
    result.err().unwrap_or(0)
}

/// Read a stream to its end, rewinding first if it can seek.
unsafe fn read_all(stream: NativeHandle) -> Result<Vec<u8>, i32> {
    let obj = unsafe { object::<InStreamObj>(stream) };
    if let Some(seek) = obj.seek {
        let mut position = u64::MAX;
        check(unsafe { seek(stream, 0, 0, &mut position) })?;
        if position != 0 {
            return Err(HResult::E_FAIL.0);
        }
    }

    // Small chunks so every stream sees several reads.
    let mut chunk = [0u8; 3];
    let mut data = Vec::new();
    loop {
        let mut n = 0u32;
        check(unsafe { (obj.read)(stream, chunk.as_mut_ptr(), chunk.len() as u32, &mut n) })?;
        if n == 0 {
            return Ok(data);
        }
        data.extend_from_slice(&chunk[..n as usize]);
    }
}

unsafe fn write_all(stream: NativeHandle, mut data: &[u8]) -> Result<(), i32> {
    let obj = unsafe { object::<OutStreamObj>(stream) };
    while !data.is_empty() {
        let mut n = 0u32;
        check(unsafe { (obj.write)(stream, data.as_ptr(), data.len() as u32, &mut n) })?;
        if n == 0 {
            return Err(HResult::E_FAIL.0);
        }
        data = &data[n as usize..];
    }
    Ok(())
}

unsafe fn write_variant(out: *mut RawPropVariant, value: &PropVariant) {
    let raw = encode_variant(value, CONV)
        .map(|encoded| encoded.into_raw())
        .unwrap_or(RawPropVariant::EMPTY);
    unsafe { out.write(raw) };
}

// ---------------------------------------------------------------------------
// Archive objects
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StubArchive {
    items: RefCell<Vec<String>>,
    size: Cell<u64>,
}

unsafe extern "C" fn create_object(_class_id: *const Guid, interface_id: *const Guid, out: *mut NativeHandle) -> i32 {
    record(Event::CreateObject);
    let kind = if unsafe { *interface_id } == Guid::IID_OUT_ARCHIVE {
        "IOutArchive"
    } else {
        "IInArchive"
    };
    unsafe { out.write(into_handle(StubArchive::default(), kind)) };
    0
}

unsafe extern "C" fn cast_alias(this: NativeHandle) -> NativeHandle {
    this
}

unsafe extern "C" fn in_open(
    this: NativeHandle,
    stream: NativeHandle,
    _max_check_start_position: *const u64,
    callback: NativeHandle,
) -> i32 {
    status(unsafe { open_archive(this, stream, callback) })
}

unsafe fn open_archive(this: NativeHandle, stream: NativeHandle, callback: NativeHandle) -> Result<(), i32> {
    let archive = unsafe { object::<StubArchive>(this) };
    let cb = unsafe { object::<OpenCallbackObj>(callback) };
    check(unsafe { (cb.set_total)(callback, ptr::null(), ptr::null()) })?;

    if let Some(password) = cb.password {
        unsafe { ask_password(password, callback) }?;
    }

    if let Some(volume_property) = cb.volume_property {
        let mut raw = RawPropVariant::EMPTY;
        check(unsafe { volume_property(callback, PropId::NAME.0, &mut raw) })?;
        let name = unsafe { take_variant(&mut raw, CONV) };
        record(Event::VolumeName(name.as_str().unwrap_or_default().to_string()));
    }

    if let Some(volume_stream) = cb.volume_stream {
        for name in ["archive.002", "archive.003"] {
            let wide = NativeString::new(name, CONV).map_err(|_| HResult::E_OUTOFMEMORY.0)?;
            let mut volume = NativeHandle::NULL;
            let hr = unsafe { volume_stream(callback, wide.as_ptr(), &mut volume) };
            record(Event::Volume(name.to_string(), hr));
            check(hr)?;
            if !volume.is_null() {
                unsafe { read_all(volume) }?;
            }
        }
    }

    let data = unsafe { read_all(stream) }?;
    archive.size.set(data.len() as u64);
    *archive.items.borrow_mut() = String::from_utf8_lossy(&data).lines().map(str::to_string).collect();

    let files = archive.items.borrow().len() as u64;
    check(unsafe { (cb.set_completed)(callback, &files, ptr::null()) })
}

/// Ask the host for a password and record what came back.
unsafe fn ask_password(password: PasswordFn, callback: NativeHandle) -> Result<(), i32> {
    let mut raw: RawString = ptr::null_mut();
    check(unsafe { password(callback, &mut raw) })?;
    let text = unsafe { NativeString::from_raw(raw, CONV) }
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    record(Event::Password(text));
    Ok(())
}

unsafe extern "C" fn in_close(this: NativeHandle) {
    let archive = unsafe { object::<StubArchive>(this) };
    archive.items.borrow_mut().clear();
    record(Event::Closed);
}

unsafe extern "C" fn in_number_of_items(this: NativeHandle, count: *mut u32) -> u32 {
    let archive = unsafe { object::<StubArchive>(this) };
    unsafe { count.write(archive.items.borrow().len() as u32) };
    0
}

unsafe extern "C" fn in_property(this: NativeHandle, index: u32, prop_id: u32, value: *mut RawPropVariant) {
    let archive = unsafe { object::<StubArchive>(this) };
    let items = archive.items.borrow();
    let prop = match items.get(index as usize) {
        Some(name) if prop_id == PropId::PATH.0 => PropVariant::String(name.clone()),
        Some(name) if prop_id == PropId::SIZE.0 => PropVariant::U64(name.len() as u64),
        Some(_) if prop_id == PropId::IS_DIR.0 => PropVariant::Bool(false),
        _ => PropVariant::Empty,
    };
    unsafe { write_variant(value, &prop) };
}

unsafe extern "C" fn in_archive_property(this: NativeHandle, prop_id: u32, value: *mut RawPropVariant) {
    let archive = unsafe { object::<StubArchive>(this) };
    let prop = if prop_id == PropId::PHY_SIZE.0 {
        PropVariant::U64(archive.size.get())
    } else {
        PropVariant::Empty
    };
    unsafe { write_variant(value, &prop) };
}

unsafe extern "C" fn in_number_of_properties(_this: NativeHandle, count: *mut u32) -> u32 {
    unsafe { count.write(2) };
    0
}

unsafe extern "C" fn in_property_info(
    _this: NativeHandle,
    index: u32,
    name: *mut RawString,
    prop_id: *mut u32,
    var_type: *mut u16,
) {
    let (id, vt, label) = match index {
        0 => (PropId::PATH, VarType::BSTR, None),
        _ => (PropId::SIZE, VarType::UI8, Some("Size")),
    };
    let label = label
        .and_then(|l| NativeString::new(l, CONV).ok())
        .map_or(ptr::null_mut(), NativeString::into_raw);
    unsafe {
        name.write(label);
        prop_id.write(id.0);
        var_type.write(vt.0);
    }
}

unsafe extern "C" fn in_number_of_archive_properties(_this: NativeHandle, count: *mut u32) -> u32 {
    unsafe { count.write(1) };
    0
}

unsafe extern "C" fn in_archive_property_info(
    _this: NativeHandle,
    _index: u32,
    name: *mut RawString,
    prop_id: *mut u32,
    var_type: *mut u16,
) {
    unsafe {
        name.write(ptr::null_mut());
        prop_id.write(PropId::PHY_SIZE.0);
        var_type.write(VarType::UI8.0);
    }
}

unsafe extern "C" fn in_extract(
    this: NativeHandle,
    indices: *const u32,
    num_items: u32,
    test_mode: i32,
    callback: NativeHandle,
) -> i32 {
    record(Event::CallbackRegistered(ObjectRegistry::global().contains(callback)));
    status(unsafe { extract_items(this, indices, num_items, test_mode, callback) })
}

unsafe fn extract_items(
    this: NativeHandle,
    indices: *const u32,
    num_items: u32,
    test_mode: i32,
    callback: NativeHandle,
) -> Result<(), i32> {
    let archive = unsafe { object::<StubArchive>(this) };
    let cb = unsafe { object::<ExtractCallbackObj>(callback) };
    let items = archive.items.borrow().clone();

    let selected: Vec<u32> = if indices.is_null() {
        if num_items != u32::MAX {
            return Err(HResult::E_INVALIDARG.0);
        }
        (0..items.len() as u32).collect()
    } else {
        unsafe { std::slice::from_raw_parts(indices, num_items as usize) }.to_vec()
    };
    let ask_mode = i32::from(test_mode != 0);

    if let Some(password) = cb.password {
        unsafe { ask_password(password, callback) }?;
    }
    check(unsafe { (cb.set_total)(callback, selected.len() as u64) })?;
    for (done, index) in selected.into_iter().enumerate() {
        record(Event::GetStream(index));
        let mut out = NativeHandle::NULL;
        check(unsafe { (cb.get_stream)(callback, index, &mut out, ask_mode) })?;
        check(unsafe { (cb.prepare_operation)(callback, ask_mode) })?;
        if !out.is_null() {
            let data = items.get(index as usize).ok_or(HResult::E_INVALIDARG.0)?;
            unsafe { write_all(out, data.as_bytes()) }?;
        }
        check(unsafe { (cb.set_operation_result)(callback, 0) })?;
        let done = done as u64 + 1;
        check(unsafe { (cb.set_completed)(callback, &done) })?;
    }
    Ok(())
}

unsafe extern "C" fn in_release(this: NativeHandle) {
    unsafe { destroy::<StubArchive>(this, "IInArchive") }
}

unsafe extern "C" fn out_update_items(
    _this: NativeHandle,
    out_stream: NativeHandle,
    num_items: u32,
    callback: NativeHandle,
) -> i32 {
    status(unsafe { update_items(out_stream, num_items, callback) })
}

unsafe fn update_items(out: NativeHandle, num_items: u32, callback: NativeHandle) -> Result<(), i32> {
    let cb = unsafe { object::<UpdateCallbackObj>(callback) };
    if let Some(password) = cb.password {
        unsafe { ask_password(password, callback) }?;
    }
    check(unsafe { (cb.set_total)(callback, num_items as u64) })?;

    let mut written = 0u64;
    for index in 0..num_items {
        let (mut new_data, mut new_properties, mut source) = (0i32, 0i32, 0u32);
        check(unsafe { (cb.update_item_info)(callback, index, &mut new_data, &mut new_properties, &mut source) })?;

        let mut raw = RawPropVariant::EMPTY;
        check(unsafe { (cb.get_property)(callback, index, PropId::PATH.0, &mut raw) })?;
        let path = unsafe { take_variant(&mut raw, CONV) };
        record(Event::Item(path.as_str().unwrap_or_default().to_string()));

        if new_data != 0 {
            let mut input = NativeHandle::NULL;
            check(unsafe { (cb.get_stream)(callback, index, &mut input) })?;
            if !input.is_null() {
                let data = unsafe { read_all(input) }?;
                unsafe { write_all(out, &data) }?;
                written += data.len() as u64;
            }
        }
        check(unsafe { (cb.set_operation_result)(callback, 0) })?;
        check(unsafe { (cb.set_completed)(callback, &written) })?;
    }

    let stream = unsafe { object::<OutStreamObj>(out) };
    if let (Some(seek), Some(set_size)) = (stream.seek, stream.set_size) {
        let mut end = 0u64;
        check(unsafe { seek(out, 0, 2, &mut end) })?;
        if end != written {
            return Err(HResult::E_FAIL.0);
        }
        check(unsafe { set_size(out, written) })?;
    }
    Ok(())
}

unsafe extern "C" fn out_file_time_type(_this: NativeHandle, time_type: *mut u32) {
    unsafe { time_type.write(1) };
}

unsafe extern "C" fn out_release(this: NativeHandle) {
    unsafe { destroy::<StubArchive>(this, "IOutArchive") }
}

unsafe extern "C" fn set_properties(
    _this: NativeHandle,
    names: *const RawString,
    values: *const RawPropVariant,
    num_properties: u32,
) -> i32 {
    for i in 0..num_properties as usize {
        let name = unsafe { decode_string(*names.add(i), CONV) }.unwrap_or_default();
        let value = unsafe { decode_variant(&*values.add(i), CONV) };
        record(Event::SetProperty(name, value));
    }
    0
}
