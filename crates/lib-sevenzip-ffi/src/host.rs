//! Host-side callback and stream contracts.
//!
//! These are the traits client code implements so the engine can call back
//! into it. Every method returns a [`HostResult`]; an `Err` status is
//! handed to the engine unchanged.
//!
//! Optional capabilities (password entry, multi-volume access, seeking) are
//! exposed through accessor methods that return `None` by default. The
//! bridge asks once, when it builds the native wrapper, and leaves the
//! corresponding slot empty if the capability is missing.

use lib_archive_types::{AskMode, HostResult, OperationResult, PropId, PropVariant, UpdateItemInfo};
use std::io::SeekFrom;

/// Random access for a stream.
pub trait StreamSeek {
    /// Move the cursor; return the new absolute position.
    fn seek(&mut self, pos: SeekFrom) -> HostResult<u64>;
}

/// Random access plus resizing for an output stream.
pub trait OutStreamSeek: StreamSeek {
    fn set_size(&mut self, size: u64) -> HostResult<()>;
}

/// A source of bytes for the engine.
pub trait SequentialInStream: Send {
    /// Fill as much of `buf` as is available. `Ok(0)` means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> HostResult<usize>;

    /// Seek capability. Streams that return `Some` are exposed as `IInStream`.
    fn seeker(&mut self) -> Option<&mut dyn StreamSeek> {
        None
    }
}

/// A sink for bytes produced by the engine.
pub trait SequentialOutStream: Send {
    /// Consume bytes from `buf`; return how many were taken.
    fn write(&mut self, buf: &[u8]) -> HostResult<usize>;

    /// Seek capability. Streams that return `Some` are exposed as `IOutStream`.
    fn seeker(&mut self) -> Option<&mut dyn OutStreamSeek> {
        None
    }
}

/// Supplies the password for encrypted archives.
pub trait PasswordProvider {
    fn password(&mut self) -> HostResult<String>;
}

/// Supplies the other parts of a multi-volume archive.
pub trait VolumeProvider {
    /// A property of the volume currently being opened (usually its name).
    fn volume_property(&mut self, prop_id: PropId) -> HostResult<PropVariant>;

    /// Open the volume called `name`. `Ok(None)` means it does not exist.
    ///
    /// The stream must be seekable.
    fn volume_stream(&mut self, name: &str) -> HostResult<Option<Box<dyn SequentialInStream>>>;
}

/// Progress and capability callback used while opening an archive.
pub trait ArchiveOpenCallback: Send {
    fn set_total(&mut self, _files: Option<u64>, _bytes: Option<u64>) -> HostResult<()> {
        Ok(())
    }

    fn set_completed(&mut self, _files: Option<u64>, _bytes: Option<u64>) -> HostResult<()> {
        Ok(())
    }

    fn password(&mut self) -> Option<&mut dyn PasswordProvider> {
        None
    }

    fn volumes(&mut self) -> Option<&mut dyn VolumeProvider> {
        None
    }
}

/// Callback driving an extraction or test run.
///
/// For each item the engine calls `get_stream`, then `prepare_operation`,
/// writes the data, then `set_operation_result`.
pub trait ArchiveExtractCallback: Send {
    fn set_total(&mut self, _total: u64) -> HostResult<()> {
        Ok(())
    }

    fn set_completed(&mut self, _completed: Option<u64>) -> HostResult<()> {
        Ok(())
    }

    /// Where to write item `index`. `Ok(None)` skips the item's data.
    fn get_stream(&mut self, index: u32, mode: AskMode) -> HostResult<Option<Box<dyn SequentialOutStream>>>;

    fn prepare_operation(&mut self, _mode: AskMode) -> HostResult<()> {
        Ok(())
    }

    fn set_operation_result(&mut self, _result: OperationResult) -> HostResult<()> {
        Ok(())
    }

    fn password(&mut self) -> Option<&mut dyn PasswordProvider> {
        None
    }
}

/// Callback describing the items of an archive being written.
pub trait ArchiveUpdateCallback: Send {
    fn set_total(&mut self, _total: u64) -> HostResult<()> {
        Ok(())
    }

    fn set_completed(&mut self, _completed: Option<u64>) -> HostResult<()> {
        Ok(())
    }

    /// What changed for output item `index`.
    fn update_item_info(&mut self, index: u32) -> HostResult<UpdateItemInfo>;

    /// Property `prop_id` of output item `index`. `Empty` when unknown.
    fn property(&mut self, index: u32, prop_id: PropId) -> HostResult<PropVariant>;

    /// Data of output item `index`. `Ok(None)` for items without data.
    fn get_stream(&mut self, index: u32) -> HostResult<Option<Box<dyn SequentialInStream>>>;

    fn set_operation_result(&mut self, _result: OperationResult) -> HostResult<()> {
        Ok(())
    }

    fn password(&mut self) -> Option<&mut dyn PasswordProvider> {
        None
    }
}

impl<T: SequentialInStream + ?Sized> SequentialInStream for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> HostResult<usize> {
        (**self).read(buf)
    }

    fn seeker(&mut self) -> Option<&mut dyn StreamSeek> {
        (**self).seeker()
    }
}

impl<T: SequentialOutStream + ?Sized> SequentialOutStream for Box<T> {
    fn write(&mut self, buf: &[u8]) -> HostResult<usize> {
        (**self).write(buf)
    }

    fn seeker(&mut self) -> Option<&mut dyn OutStreamSeek> {
        (**self).seeker()
    }
}

impl<T: ArchiveOpenCallback + ?Sized> ArchiveOpenCallback for Box<T> {
    fn set_total(&mut self, files: Option<u64>, bytes: Option<u64>) -> HostResult<()> {
        (**self).set_total(files, bytes)
    }

    fn set_completed(&mut self, files: Option<u64>, bytes: Option<u64>) -> HostResult<()> {
        (**self).set_completed(files, bytes)
    }

    fn password(&mut self) -> Option<&mut dyn PasswordProvider> {
        (**self).password()
    }

    fn volumes(&mut self) -> Option<&mut dyn VolumeProvider> {
        (**self).volumes()
    }
}

impl<T: ArchiveExtractCallback + ?Sized> ArchiveExtractCallback for Box<T> {
    fn set_total(&mut self, total: u64) -> HostResult<()> {
        (**self).set_total(total)
    }

    fn set_completed(&mut self, completed: Option<u64>) -> HostResult<()> {
        (**self).set_completed(completed)
    }

    fn get_stream(&mut self, index: u32, mode: AskMode) -> HostResult<Option<Box<dyn SequentialOutStream>>> {
        (**self).get_stream(index, mode)
    }

    fn prepare_operation(&mut self, mode: AskMode) -> HostResult<()> {
        (**self).prepare_operation(mode)
    }

    fn set_operation_result(&mut self, result: OperationResult) -> HostResult<()> {
        (**self).set_operation_result(result)
    }

    fn password(&mut self) -> Option<&mut dyn PasswordProvider> {
        (**self).password()
    }
}

impl<T: ArchiveUpdateCallback + ?Sized> ArchiveUpdateCallback for Box<T> {
    fn set_total(&mut self, total: u64) -> HostResult<()> {
        (**self).set_total(total)
    }

    fn set_completed(&mut self, completed: Option<u64>) -> HostResult<()> {
        (**self).set_completed(completed)
    }

    fn update_item_info(&mut self, index: u32) -> HostResult<UpdateItemInfo> {
        (**self).update_item_info(index)
    }

    fn property(&mut self, index: u32, prop_id: PropId) -> HostResult<PropVariant> {
        (**self).property(index, prop_id)
    }

    fn get_stream(&mut self, index: u32) -> HostResult<Option<Box<dyn SequentialInStream>>> {
        (**self).get_stream(index)
    }

    fn set_operation_result(&mut self, result: OperationResult) -> HostResult<()> {
        (**self).set_operation_result(result)
    }

    fn password(&mut self) -> Option<&mut dyn PasswordProvider> {
        (**self).password()
    }
}

/// Open callback that reports nothing and offers no capabilities.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpenCallback;

impl ArchiveOpenCallback for NoOpenCallback {}

/// Open or extract with a fixed password.
#[derive(Clone, Debug, Default)]
pub struct FixedPassword(pub String);

impl PasswordProvider for FixedPassword {
    fn password(&mut self) -> HostResult<String> {
        Ok(self.0.clone())
    }
}

/// Open callback that only answers password requests.
#[derive(Clone, Debug, Default)]
pub struct PasswordOpenCallback {
    password: FixedPassword,
}

impl PasswordOpenCallback {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: FixedPassword(password.into()),
        }
    }
}

impl ArchiveOpenCallback for PasswordOpenCallback {
    fn password(&mut self) -> Option<&mut dyn PasswordProvider> {
        Some(&mut self.password)
    }
}
