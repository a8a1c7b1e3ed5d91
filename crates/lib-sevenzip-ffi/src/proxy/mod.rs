//! Interface proxies: host-side handles to engine objects.
//!
//! A proxy resolves its symbol family when it is constructed, so a module
//! missing a required entry point never yields a proxy. Calls that drive a
//! callback return an [`Outcome`]: the engine's status, unchanged, plus
//! whatever host objects were lent to the call.

mod in_archive;
mod out_archive;
mod set_properties;

pub use in_archive::InArchive;
pub use out_archive::OutArchive;
pub use set_properties::PropertySetter;

use crate::abi::{GetCountFn, GetPropertyInfoFn, NativeHandle};
use crate::codec::{NativeString, RawString, StringConvention};
use crate::error::{BridgeResult, HResultExt};
use lib_archive_types::{HResult, PropId, PropertyInfo, VarType};
use std::ptr;

/// Status of a native call and the host objects handed back after it.
#[derive(Debug)]
#[must_use]
pub struct Outcome<T> {
    pub status: HResult,
    pub value: T,
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The value if the engine reported success, else `NativeCallFailed`.
    pub fn check(self) -> BridgeResult<T> {
        self.status.check()?;
        Ok(self.value)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            status: self.status,
            value: f(self.value),
        }
    }
}

/// Whether a proxy owns its native reference.
///
/// Cast results are aliases of the object they were cast from and never
/// release it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Ownership {
    Primary,
    Alias,
}

/// Call a `GetNumberOf*` entry point.
fn read_count(f: GetCountFn, handle: NativeHandle) -> BridgeResult<u32> {
    let mut count = 0u32;
    // SAFETY: `handle` is a live engine object and `count` a valid out slot.
    let status = HResult(unsafe { f(handle, &mut count) } as i32);
    status.check()?;
    Ok(count)
}

/// Call a `Get*PropertyInfo` entry point.
fn read_property_info(f: GetPropertyInfoFn, handle: NativeHandle, index: u32) -> PropertyInfo {
    let mut name: RawString = ptr::null_mut();
    let mut id = 0u32;
    let mut var_type = 0u16;
    // SAFETY: `handle` is a live engine object; all three out slots are valid.
    unsafe { f(handle, index, &mut name, &mut id, &mut var_type) };
    // SAFETY: the engine hands ownership of the name (or null) to the caller.
    let name = unsafe { NativeString::from_raw(name, StringConvention::NATIVE) };
    PropertyInfo {
        name: name.map(|s| s.to_string_lossy()),
        id: PropId(id),
        var_type: VarType(var_type),
    }
}
