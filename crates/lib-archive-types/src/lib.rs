//! # lib-archive-types
//!
//! Value types shared by the 7-Zip native bridge.
//!
//! This crate carries no FFI code. It defines the host-side vocabulary the
//! bridge translates to and from:
//! - Native status codes (`HResult`)
//! - Property identifiers and variant tags
//! - Property variant values with best-effort typed reads
//! - Archive formats, ask modes and per-item operation results

pub mod hresult;
pub mod props;
pub mod variant;
pub mod archive;

pub use hresult::*;
pub use props::*;
pub use variant::*;
pub use archive::*;
