//! `PROPVARIANT` layout and conversion.

use super::string::{decode_string, free_string, NativeString, RawString, StringConvention};
use crate::error::BridgeResult;
use lib_archive_types::{FileTime, PropVariant, VarType};

/// `VARIANT_TRUE`.
const VARIANT_TRUE: i16 = -1;

/// Split `FILETIME` as stored in the variant payload.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawFileTime {
    pub low: u32,
    pub high: u32,
}

/// Payload of a [`RawPropVariant`].
#[repr(C, align(8))]
#[derive(Clone, Copy)]
pub union RawPropValue {
    pub bool_val: i16,
    pub i8_val: i8,
    pub i16_val: i16,
    pub i32_val: i32,
    pub i64_val: i64,
    pub u8_val: u8,
    pub u16_val: u16,
    pub u32_val: u32,
    pub u64_val: u64,
    pub bstr_val: RawString,
    pub filetime: RawFileTime,
    _pad: [usize; 2],
}

/// The engine's `PROPVARIANT`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawPropVariant {
    pub vt: u16,
    pub reserved1: u16,
    pub reserved2: u16,
    pub reserved3: u16,
    pub value: RawPropValue,
}

impl RawPropVariant {
    pub const EMPTY: Self = Self {
        vt: 0,
        reserved1: 0,
        reserved2: 0,
        reserved3: 0,
        value: RawPropValue { _pad: [0; 2] },
    };

    fn with(vt: VarType, value: RawPropValue) -> Self {
        Self {
            vt: vt.0,
            value,
            ..Self::EMPTY
        }
    }

    pub fn var_type(&self) -> VarType {
        VarType(self.vt)
    }
}

impl Default for RawPropVariant {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl std::fmt::Debug for RawPropVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawPropVariant").field("vt", &self.vt).finish_non_exhaustive()
    }
}

/// A raw variant produced by [`encode_variant`].
///
/// Owns any string payload until [`EncodedVariant::into_raw`] hands it to
/// the engine.
pub struct EncodedVariant {
    raw: RawPropVariant,
    convention: StringConvention,
}

impl EncodedVariant {
    pub fn as_raw(&self) -> &RawPropVariant {
        &self.raw
    }

    /// Give up ownership of the payload.
    pub fn into_raw(self) -> RawPropVariant {
        let raw = self.raw;
        std::mem::forget(self);
        raw
    }
}

impl Drop for EncodedVariant {
    fn drop(&mut self) {
        if self.raw.var_type() == VarType::BSTR {
            // SAFETY: the string was allocated by `encode_variant` and is still owned.
            unsafe { free_string(self.raw.value.bstr_val, self.convention) }
        }
    }
}

/// Build the native representation of `value`.
pub fn encode_variant(value: &PropVariant, convention: StringConvention) -> BridgeResult<EncodedVariant> {
    let raw = match value {
        PropVariant::Empty => RawPropVariant::EMPTY,
        PropVariant::Bool(v) => RawPropVariant::with(
            VarType::BOOL,
            RawPropValue {
                bool_val: if *v { VARIANT_TRUE } else { 0 },
            },
        ),
        PropVariant::I8(v) => RawPropVariant::with(VarType::I1, RawPropValue { i8_val: *v }),
        PropVariant::I16(v) => RawPropVariant::with(VarType::I2, RawPropValue { i16_val: *v }),
        PropVariant::I32(v) => RawPropVariant::with(VarType::I4, RawPropValue { i32_val: *v }),
        PropVariant::I64(v) => RawPropVariant::with(VarType::I8, RawPropValue { i64_val: *v }),
        PropVariant::U8(v) => RawPropVariant::with(VarType::UI1, RawPropValue { u8_val: *v }),
        PropVariant::U16(v) => RawPropVariant::with(VarType::UI2, RawPropValue { u16_val: *v }),
        PropVariant::U32(v) => RawPropVariant::with(VarType::UI4, RawPropValue { u32_val: *v }),
        PropVariant::U64(v) => RawPropVariant::with(VarType::UI8, RawPropValue { u64_val: *v }),
        PropVariant::String(s) => {
            let bstr = NativeString::new(s, convention)?.into_raw();
            RawPropVariant::with(VarType::BSTR, RawPropValue { bstr_val: bstr })
        }
        PropVariant::FileTime(t) => {
            let (low, high) = t.to_parts();
            RawPropVariant::with(
                VarType::FILETIME,
                RawPropValue {
                    filetime: RawFileTime { low, high },
                },
            )
        }
    };
    Ok(EncodedVariant { raw, convention })
}

/// Read a native variant without taking ownership of its payload.
///
/// `VT_INT`/`VT_UINT` read as `I32`/`U32`. Unknown tags read as `Empty`.
///
/// # Safety
///
/// A `VT_BSTR` payload must be null or a live string in `convention`.
pub unsafe fn decode_variant(raw: &RawPropVariant, convention: StringConvention) -> PropVariant {
    // SAFETY: each arm reads the union field selected by the tag.
    unsafe {
        match raw.var_type() {
            VarType::EMPTY => PropVariant::Empty,
            VarType::BOOL => PropVariant::Bool(raw.value.bool_val != 0),
            VarType::I1 => PropVariant::I8(raw.value.i8_val),
            VarType::I2 => PropVariant::I16(raw.value.i16_val),
            VarType::I4 | VarType::INT => PropVariant::I32(raw.value.i32_val),
            VarType::I8 => PropVariant::I64(raw.value.i64_val),
            VarType::UI1 => PropVariant::U8(raw.value.u8_val),
            VarType::UI2 => PropVariant::U16(raw.value.u16_val),
            VarType::UI4 | VarType::UINT => PropVariant::U32(raw.value.u32_val),
            VarType::UI8 => PropVariant::U64(raw.value.u64_val),
            VarType::BSTR => decode_string(raw.value.bstr_val, convention)
                .map(PropVariant::String)
                .unwrap_or_default(),
            VarType::FILETIME => {
                let ft = raw.value.filetime;
                PropVariant::FileTime(FileTime::from_parts(ft.low, ft.high))
            }
            other => {
                tracing::debug!(vt = other.0, "Unknown variant tag, reading as empty");
                PropVariant::Empty
            }
        }
    }
}

/// Decode a variant the engine filled in for us, then free its payload.
///
/// `raw` is left as `VT_EMPTY`.
///
/// # Safety
///
/// A `VT_BSTR` payload must be null or a string in `convention` that the
/// caller now owns.
pub unsafe fn take_variant(raw: &mut RawPropVariant, convention: StringConvention) -> PropVariant {
    let value = unsafe { decode_variant(raw, convention) };
    if raw.var_type() == VarType::BSTR {
        // SAFETY: ownership of the string was transferred to us.
        unsafe { free_string(raw.value.bstr_val, convention) };
    }
    *raw = RawPropVariant::EMPTY;
    value
}
