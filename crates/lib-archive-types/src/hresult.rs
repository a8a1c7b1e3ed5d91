//! Native status codes.
//!
//! The engine reports every outcome as a COM-style `HRESULT`. The bridge
//! forwards these values untouched; interpreting them is left to callers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A status code returned by (or to) the native engine.
///
/// Non-negative values are successes, negative values are failures.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HResult(pub i32);

impl HResult {
    pub const S_OK: HResult = HResult(0);
    pub const S_FALSE: HResult = HResult(1);
    pub const E_NOTIMPL: HResult = HResult(0x8000_4001_u32 as i32);
    pub const E_NOINTERFACE: HResult = HResult(0x8000_4002_u32 as i32);
    pub const E_ABORT: HResult = HResult(0x8000_4004_u32 as i32);
    pub const E_FAIL: HResult = HResult(0x8000_4005_u32 as i32);
    pub const E_OUTOFMEMORY: HResult = HResult(0x8007_000E_u32 as i32);
    pub const E_INVALIDARG: HResult = HResult(0x8007_0057_u32 as i32);

    /// Raw integer value as passed across the boundary.
    pub fn code(self) -> i32 {
        self.0
    }

    /// True for `S_OK`, `S_FALSE` and every other non-negative code.
    pub fn is_success(self) -> bool {
        self.0 >= 0
    }

    /// True for negative codes.
    pub fn is_failure(self) -> bool {
        self.0 < 0
    }

    /// Symbolic name for well-known codes.
    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::S_OK => Some("S_OK"),
            Self::S_FALSE => Some("S_FALSE"),
            Self::E_NOTIMPL => Some("E_NOTIMPL"),
            Self::E_NOINTERFACE => Some("E_NOINTERFACE"),
            Self::E_ABORT => Some("E_ABORT"),
            Self::E_FAIL => Some("E_FAIL"),
            Self::E_OUTOFMEMORY => Some("E_OUTOFMEMORY"),
            Self::E_INVALIDARG => Some("E_INVALIDARG"),
            _ => None,
        }
    }
}

impl Default for HResult {
    fn default() -> Self {
        Self::S_OK
    }
}

impl From<i32> for HResult {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

impl From<HResult> for i32 {
    fn from(hr: HResult) -> Self {
        hr.0
    }
}

impl From<std::io::Error> for HResult {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::InvalidInput => Self::E_INVALIDARG,
            std::io::ErrorKind::OutOfMemory => Self::E_OUTOFMEMORY,
            std::io::ErrorKind::Unsupported => Self::E_NOTIMPL,
            std::io::ErrorKind::Interrupted => Self::E_ABORT,
            _ => Self::E_FAIL,
        }
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} (0x{:08X})", self.0 as u32),
            None => write!(f, "0x{:08X}", self.0 as u32),
        }
    }
}

/// Result type for host-side callback implementations.
///
/// `Err` carries the status handed back to the engine.
pub type HostResult<T> = Result<T, HResult>;
