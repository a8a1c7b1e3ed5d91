//! Adapters from `std::io` types to the host stream traits.

use crate::host::{OutStreamSeek, SequentialInStream, SequentialOutStream, StreamSeek};
use lib_archive_types::{HResult, HostResult};
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Forward-only reader.
#[derive(Debug)]
pub struct ReadStream<R>(R);

impl<R: Read + Send> ReadStream<R> {
    pub fn new(inner: R) -> Self {
        Self(inner)
    }

    pub fn into_inner(self) -> R {
        self.0
    }
}

impl<R: Read + Send> SequentialInStream for ReadStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> HostResult<usize> {
        Ok(self.0.read(buf)?)
    }
}

/// Reader with random access, exposed to the engine as `IInStream`.
#[derive(Debug)]
pub struct SeekableReadStream<R>(R);

impl<R: Read + Seek + Send> SeekableReadStream<R> {
    pub fn new(inner: R) -> Self {
        Self(inner)
    }

    pub fn into_inner(self) -> R {
        self.0
    }
}

impl SeekableReadStream<File> {
    /// Open a file for reading.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        File::open(path).map(Self)
    }
}

impl<R: Read + Seek + Send> SequentialInStream for SeekableReadStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> HostResult<usize> {
        Ok(self.0.read(buf)?)
    }

    fn seeker(&mut self) -> Option<&mut dyn StreamSeek> {
        Some(self)
    }
}

impl<R: Read + Seek + Send> StreamSeek for SeekableReadStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> HostResult<u64> {
        Ok(self.0.seek(pos)?)
    }
}

/// Forward-only writer.
#[derive(Debug)]
pub struct WriteStream<W>(W);

impl<W: Write + Send> WriteStream<W> {
    pub fn new(inner: W) -> Self {
        Self(inner)
    }

    pub fn into_inner(self) -> W {
        self.0
    }
}

impl<W: Write + Send> SequentialOutStream for WriteStream<W> {
    fn write(&mut self, buf: &[u8]) -> HostResult<usize> {
        self.0.write_all(buf)?;
        Ok(buf.len())
    }
}

/// Writers whose length can be changed.
pub trait SetLen {
    fn set_len(&mut self, size: u64) -> std::io::Result<()>;
}

impl SetLen for File {
    fn set_len(&mut self, size: u64) -> std::io::Result<()> {
        File::set_len(self, size)
    }
}

impl SetLen for Cursor<Vec<u8>> {
    fn set_len(&mut self, size: u64) -> std::io::Result<()> {
        let size = usize::try_from(size).map_err(|_| std::io::ErrorKind::InvalidInput)?;
        self.get_mut().resize(size, 0);
        Ok(())
    }
}

/// Writer with random access, exposed to the engine as `IOutStream`.
#[derive(Debug)]
pub struct SeekableWriteStream<W>(W);

impl<W: Write + Seek + SetLen + Send> SeekableWriteStream<W> {
    pub fn new(inner: W) -> Self {
        Self(inner)
    }

    pub fn into_inner(self) -> W {
        self.0
    }
}

impl SeekableWriteStream<File> {
    /// Create (or truncate) a file for writing.
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        File::create(path).map(Self)
    }
}

impl<W: Write + Seek + SetLen + Send> SequentialOutStream for SeekableWriteStream<W> {
    fn write(&mut self, buf: &[u8]) -> HostResult<usize> {
        self.0.write_all(buf)?;
        Ok(buf.len())
    }

    fn seeker(&mut self) -> Option<&mut dyn OutStreamSeek> {
        Some(self)
    }
}

impl<W: Write + Seek + SetLen + Send> StreamSeek for SeekableWriteStream<W> {
    fn seek(&mut self, pos: SeekFrom) -> HostResult<u64> {
        Ok(self.0.seek(pos)?)
    }
}

impl<W: Write + Seek + SetLen + Send> OutStreamSeek for SeekableWriteStream<W> {
    fn set_size(&mut self, size: u64) -> HostResult<()> {
        Ok(self.0.set_len(size)?)
    }
}

/// In-memory sink whose contents stay readable after the stream is handed
/// to the engine.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().map(|data| data.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|data| data.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SequentialOutStream for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> HostResult<usize> {
        let mut data = self.0.lock().map_err(|_| HResult::E_FAIL)?;
        data.extend_from_slice(buf);
        Ok(buf.len())
    }
}
