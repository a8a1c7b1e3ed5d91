//! Property variant values.
//!
//! `PropVariant` is the host-side view of the engine's tagged union. Reads
//! are best-effort: asking for the wrong type yields the caller's default
//! instead of an error, because a missing or differently typed property is
//! normal (most formats only fill a subset of properties).

use crate::props::VarType;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Windows `FILETIME`: 100-nanosecond ticks since 1601-01-01 UTC.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileTime(pub u64);

impl FileTime {
    /// Ticks between 1601-01-01 and 1970-01-01.
    pub const UNIX_EPOCH_TICKS: u64 = 116_444_736_000_000_000;

    /// Build from the split `dwLowDateTime`/`dwHighDateTime` representation.
    pub fn from_parts(low: u32, high: u32) -> Self {
        Self(((high as u64) << 32) | low as u64)
    }

    /// Split into (`dwLowDateTime`, `dwHighDateTime`).
    pub fn to_parts(self) -> (u32, u32) {
        (self.0 as u32, (self.0 >> 32) as u32)
    }

    /// Convert to `SystemTime`. Times before 1970 return `None`.
    pub fn to_system_time(self) -> Option<SystemTime> {
        let ticks = self.0.checked_sub(Self::UNIX_EPOCH_TICKS)?;
        let secs = ticks / 10_000_000;
        let nanos = (ticks % 10_000_000) * 100;
        UNIX_EPOCH.checked_add(Duration::new(secs, nanos as u32))
    }

    /// Convert from `SystemTime`, clamping pre-1970 times to the Unix epoch.
    pub fn from_system_time(time: SystemTime) -> Self {
        let since = time.duration_since(UNIX_EPOCH).unwrap_or_default();
        let ticks = since.as_secs() * 10_000_000 + (since.subsec_nanos() / 100) as u64;
        Self(Self::UNIX_EPOCH_TICKS + ticks)
    }
}

/// A typed property value exchanged with the engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropVariant {
    /// No value (`VT_EMPTY`).
    #[default]
    Empty,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    String(String),
    FileTime(FileTime),
}

impl PropVariant {
    /// The `VARTYPE` tag this value is written with.
    pub fn var_type(&self) -> VarType {
        match self {
            Self::Empty => VarType::EMPTY,
            Self::Bool(_) => VarType::BOOL,
            Self::I8(_) => VarType::I1,
            Self::I16(_) => VarType::I2,
            Self::I32(_) => VarType::I4,
            Self::I64(_) => VarType::I8,
            Self::U8(_) => VarType::UI1,
            Self::U16(_) => VarType::UI2,
            Self::U32(_) => VarType::UI4,
            Self::U64(_) => VarType::UI8,
            Self::String(_) => VarType::BSTR,
            Self::FileTime(_) => VarType::FILETIME,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Extract a `T` if the tag matches exactly.
    pub fn get<T: FromVariant>(&self) -> Option<T> {
        T::from_variant(self)
    }

    /// Widening numeric read: any integer tag that fits in `u64`.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::U8(v) => Some(v as u64),
            Self::U16(v) => Some(v as u64),
            Self::U32(v) => Some(v as u64),
            Self::U64(v) => Some(v),
            Self::I8(v) => u64::try_from(v).ok(),
            Self::I16(v) => u64::try_from(v).ok(),
            Self::I32(v) => u64::try_from(v).ok(),
            Self::I64(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Types that can be read out of a [`PropVariant`] with an exact tag match.
pub trait FromVariant: Sized {
    fn from_variant(variant: &PropVariant) -> Option<Self>;
}

macro_rules! impl_from_variant {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromVariant for $ty {
                fn from_variant(variant: &PropVariant) -> Option<Self> {
                    match variant {
                        PropVariant::$variant(v) => Some(v.clone()),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for PropVariant {
                fn from(value: $ty) -> Self {
                    PropVariant::$variant(value)
                }
            }
        )*
    };
}

impl_from_variant! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    String => String,
    FileTime => FileTime,
}

impl From<&str> for PropVariant {
    fn from(value: &str) -> Self {
        PropVariant::String(value.to_string())
    }
}

impl<T: Into<PropVariant>> From<Option<T>> for PropVariant {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(PropVariant::Empty)
    }
}

/// Best-effort typed read.
///
/// Returns `default` whenever the variant's tag does not match `T`. A
/// mismatch means "unset", never corruption.
pub fn safe_cast<T: FromVariant>(variant: &PropVariant, default: T) -> T {
    T::from_variant(variant).unwrap_or(default)
}
