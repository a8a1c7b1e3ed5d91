//! Length-prefixed wide strings.
//!
//! Both conventions put a 4-byte little-endian *byte* length immediately
//! before the first code unit and terminate the units with a null unit.
//! The pointer handed across the boundary points at the first unit.
//!
//! | convention | unit | allocator                                   |
//! |------------|------|---------------------------------------------|
//! | `Utf16`    | u16  | `SysAllocStringLen` on Windows, else malloc |
//! | `Utf32`    | u32  | malloc (engine frees `ptr - 4`)             |

use crate::error::{BridgeError, BridgeResult};
use lib_archive_types::HResult;
use std::fmt;
use std::ptr::NonNull;

/// Wide string pointer as it crosses the boundary.
pub type RawString = *mut libc::wchar_t;

const PREFIX: usize = std::mem::size_of::<u32>();

/// Which wide-string layout the engine expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StringConvention {
    /// UTF-16 `BSTR`.
    Utf16,
    /// UTF-32 `wchar_t` string with a `BSTR`-style prefix.
    Utf32,
}

impl StringConvention {
    /// The convention the engine build for this platform uses.
    #[cfg(windows)]
    pub const NATIVE: Self = Self::Utf16;
    #[cfg(not(windows))]
    pub const NATIVE: Self = Self::Utf32;

    /// Size in bytes of one code unit.
    pub const fn unit_size(self) -> usize {
        match self {
            Self::Utf16 => 2,
            Self::Utf32 => 4,
        }
    }

    fn units(self, s: &str) -> Vec<u32> {
        match self {
            Self::Utf16 => s.encode_utf16().map(u32::from).collect(),
            Self::Utf32 => s.chars().map(u32::from).collect(),
        }
    }
}

/// An owned, natively allocated wide string.
///
/// Freed on drop unless handed to the engine with [`NativeString::into_raw`].
pub struct NativeString {
    ptr: NonNull<u8>,
    convention: StringConvention,
}

impl NativeString {
    /// Allocate `s` in the given convention.
    pub fn new(s: &str, convention: StringConvention) -> BridgeResult<Self> {
        let units = convention.units(s);
        let ptr = match convention {
            #[cfg(windows)]
            StringConvention::Utf16 => bstr::alloc(&units),
            _ => alloc_prefixed(&units, convention),
        };
        NonNull::new(ptr)
            .map(|ptr| Self { ptr, convention })
            .ok_or(BridgeError::native(HResult::E_OUTOFMEMORY))
    }

    /// Take ownership of a string allocated by the engine.
    ///
    /// # Safety
    ///
    /// `raw` must be null or a string in `convention` that the caller owns.
    pub unsafe fn from_raw(raw: RawString, convention: StringConvention) -> Option<Self> {
        NonNull::new(raw as *mut u8).map(|ptr| Self { ptr, convention })
    }

    pub fn as_ptr(&self) -> RawString {
        self.ptr.as_ptr() as RawString
    }

    /// Hand ownership to the engine, which frees the string itself.
    pub fn into_raw(self) -> RawString {
        let raw = self.as_ptr();
        std::mem::forget(self);
        raw
    }

    pub fn convention(&self) -> StringConvention {
        self.convention
    }

    /// Payload length in bytes, as recorded in the prefix.
    pub fn byte_len(&self) -> u32 {
        // SAFETY: every NativeString carries a valid prefix.
        unsafe { read_prefix(self.ptr.as_ptr()) }
    }

    pub fn to_string_lossy(&self) -> String {
        // SAFETY: the pointer is live and in `self.convention`.
        unsafe { decode_string(self.as_ptr(), self.convention) }.unwrap_or_default()
    }
}

impl Drop for NativeString {
    fn drop(&mut self) {
        // SAFETY: we own the allocation and drop runs once.
        unsafe { free_string(self.as_ptr(), self.convention) }
    }
}

impl fmt::Debug for NativeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeString")
            .field("convention", &self.convention)
            .field("value", &self.to_string_lossy())
            .finish()
    }
}

/// Allocate `s` as a native string. Alias for [`NativeString::new`].
pub fn encode_string(s: &str, convention: StringConvention) -> BridgeResult<NativeString> {
    NativeString::new(s, convention)
}

/// Copy a native string into a Rust `String` without taking ownership.
///
/// Returns `None` for a null pointer. Invalid code units are replaced with
/// U+FFFD.
///
/// # Safety
///
/// `raw` must be null or point at the first unit of a live string in
/// `convention` with a valid length prefix.
pub unsafe fn decode_string(raw: *const libc::wchar_t, convention: StringConvention) -> Option<String> {
    if raw.is_null() {
        return None;
    }
    let bytes = unsafe { read_prefix(raw as *const u8) } as usize;
    let len = bytes / convention.unit_size();

    let decoded = match convention {
        StringConvention::Utf16 => {
            // SAFETY: prefix says `len` units follow.
            let units = unsafe { std::slice::from_raw_parts(raw as *const u16, len) };
            String::from_utf16_lossy(units)
        }
        StringConvention::Utf32 => {
            // SAFETY: as above.
            let units = unsafe { std::slice::from_raw_parts(raw as *const u32, len) };
            units
                .iter()
                .map(|&u| char::from_u32(u).unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        }
    };
    Some(decoded)
}

/// Copy a null-terminated wide string (no length prefix).
///
/// # Safety
///
/// `raw` must be null or point at a null-terminated string of
/// `convention` units.
pub unsafe fn decode_wide_cstr(raw: *const libc::wchar_t, convention: StringConvention) -> Option<String> {
    if raw.is_null() {
        return None;
    }
    let decoded = match convention {
        StringConvention::Utf16 => {
            let start = raw as *const u16;
            // SAFETY: the caller guarantees a terminating null unit.
            let len = unsafe { (0..).take_while(|&i| *start.add(i) != 0).count() };
            // SAFETY: `len` units precede the terminator.
            String::from_utf16_lossy(unsafe { std::slice::from_raw_parts(start, len) })
        }
        StringConvention::Utf32 => {
            let start = raw as *const u32;
            // SAFETY: as above.
            let len = unsafe { (0..).take_while(|&i| *start.add(i) != 0).count() };
            // SAFETY: as above.
            unsafe { std::slice::from_raw_parts(start, len) }
                .iter()
                .map(|&u| char::from_u32(u).unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        }
    };
    Some(decoded)
}

/// Free a native string. Null is ignored.
///
/// # Safety
///
/// `raw` must be null or an owned string allocated in `convention`, and
/// must not be used afterwards.
pub unsafe fn free_string(raw: RawString, convention: StringConvention) {
    if raw.is_null() {
        return;
    }
    match convention {
        #[cfg(windows)]
        StringConvention::Utf16 => unsafe { bstr::free(raw as *mut u16) },
        // SAFETY: allocated by `alloc_prefixed` (or the engine's matching malloc).
        _ => unsafe { libc::free((raw as *mut u8).sub(PREFIX) as *mut libc::c_void) },
    }
}

unsafe fn read_prefix(first_unit: *const u8) -> u32 {
    // SAFETY: caller guarantees four prefix bytes precede the first unit.
    let bytes = unsafe { std::ptr::read_unaligned(first_unit.sub(PREFIX) as *const [u8; 4]) };
    u32::from_le_bytes(bytes)
}

/// malloc `[prefix][units][null]` and return a pointer to the first unit.
fn alloc_prefixed(units: &[u32], convention: StringConvention) -> *mut u8 {
    let unit = convention.unit_size();
    let payload = units.len() * unit;
    let Ok(prefix) = u32::try_from(payload) else {
        return std::ptr::null_mut();
    };

    // SAFETY: size is non-zero; null is handled by the caller.
    let base = unsafe { libc::malloc(PREFIX + payload + unit) } as *mut u8;
    if base.is_null() {
        return base;
    }

    // SAFETY: `base` has room for prefix, payload and terminator.
    unsafe {
        std::ptr::copy_nonoverlapping(prefix.to_le_bytes().as_ptr(), base, PREFIX);
        let first = base.add(PREFIX);
        match convention {
            StringConvention::Utf16 => {
                let dst = first as *mut u16;
                for (i, &u) in units.iter().enumerate() {
                    dst.add(i).write_unaligned(u as u16);
                }
                dst.add(units.len()).write_unaligned(0);
            }
            StringConvention::Utf32 => {
                let dst = first as *mut u32;
                for (i, &u) in units.iter().enumerate() {
                    dst.add(i).write_unaligned(u);
                }
                dst.add(units.len()).write_unaligned(0);
            }
        }
        first
    }
}

#[cfg(windows)]
mod bstr {
    #[link(name = "oleaut32")]
    extern "system" {
        fn SysAllocStringLen(str_in: *const u16, len: u32) -> *mut u16;
        fn SysFreeString(bstr: *mut u16);
    }

    pub(super) fn alloc(units: &[u32]) -> *mut u8 {
        let wide: Vec<u16> = units.iter().map(|&u| u as u16).collect();
        let Ok(len) = u32::try_from(wide.len()) else {
            return std::ptr::null_mut();
        };
        // SAFETY: `wide` holds `len` units; oleaut32 copies them.
        unsafe { SysAllocStringLen(wide.as_ptr(), len) as *mut u8 }
    }

    pub(super) unsafe fn free(bstr: *mut u16) {
        // SAFETY: caller passes a BSTR from SysAllocStringLen.
        unsafe { SysFreeString(bstr) }
    }
}
