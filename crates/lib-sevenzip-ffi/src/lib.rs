//! # lib-sevenzip-ffi
//!
//! Safe bridge to the 7-Zip native engine (`7z.dll` / `7z.so`).
//!
//! The engine is a native module exporting flat C entry points for its COM
//! style objects. This crate handles:
//!
//! - Loading the module exactly once per manager (`dlopen` / `LoadLibrary`)
//! - Resolving and caching entry points by family
//! - Converting strings and `PROPVARIANT`s across the boundary
//! - Proxies for archive readers, writers and property setters
//! - Trampolines that let the engine call back into host code
//!
//! # Safety
//!
//! The engine is foreign code that calls back into Rust. The bridge keeps
//! that boundary sound with a few rules:
//!
//! 1. **Registry lookup**: every callback resolves its `this` handle through
//!    the [`ObjectRegistry`]; a stale handle fails with `E_FAIL`
//! 2. **Panic catching**: `catch_unwind` keeps host panics from unwinding
//!    into the engine
//! 3. **Scoped release**: native wrappers are released on drop, exactly once
//! 4. **No blocking re-entry**: a callback that finds its host object busy
//!    fails instead of deadlocking
//!
//! # Example
//!
//! ```ignore
//! use lib_sevenzip_ffi::{InArchive, LibraryManager, NoOpenCallback, SeekableReadStream};
//! use lib_archive_types::ArchiveFormat;
//!
//! let manager = LibraryManager::instance();
//! let mut archive = InArchive::create(&manager, ArchiveFormat::SevenZip)?;
//! archive.open(SeekableReadStream::open("data.7z")?, None, NoOpenCallback)?.check()?;
//! for index in 0..archive.number_of_items()? {
//!     println!("{}", archive.item(index).path);
//! }
//! ```

pub mod abi;
pub mod codec;
pub mod config;
pub mod error;
pub mod host;
pub mod io;
pub mod loader;
pub mod manager;
pub mod proxy;
pub mod registry;
mod sync;
pub mod trampoline;

pub use abi::NativeHandle;
pub use config::{load_config, LibraryConfig};
pub use error::{BridgeError, BridgeResult, HResultExt};
pub use host::{
    ArchiveExtractCallback, ArchiveOpenCallback, ArchiveUpdateCallback, FixedPassword, NoOpenCallback,
    OutStreamSeek, PasswordOpenCallback, PasswordProvider, SequentialInStream, SequentialOutStream, StreamSeek,
    VolumeProvider,
};
pub use io::{ReadStream, SeekableReadStream, SeekableWriteStream, SharedBuffer, WriteStream};
pub use loader::{native_loader, PlatformLoader};
pub use manager::LibraryManager;
pub use proxy::{InArchive, OutArchive, Outcome, PropertySetter};
pub use registry::{BundleKind, ObjectRegistry};
pub use trampoline::Trampoline;
