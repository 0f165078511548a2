//! # fio — file I/O abstraction
//!
//! Every byte the engine reads or writes goes through an [`IoManager`]. Two
//! variants exist:
//!
//! - [`FileIo`]: an ordinary file opened for append + positional read.
//!   Supports every operation.
//! - [`MmapIo`]: a read-only memory mapping, used only to accelerate the
//!   startup scan. `write` and `sync` fail with
//!   [`std::io::ErrorKind::Unsupported`]; the engine reopens every file as
//!   [`FileIo`] before serving writes.
//!
//! Handles are closed by `Drop`.

mod file_io;
mod mmap;

pub use file_io::FileIo;
pub use mmap::MmapIo;

use std::io;
use std::path::Path;

/// Which [`IoManager`] variant backs a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoType {
    /// Buffered syscall I/O. The only variant that can write.
    Standard,
    /// Read-only memory mapping, for startup-time scans.
    Mmap,
}

/// Positional file access as the engine sees it.
pub trait IoManager: Send + Sync {
    /// Reads into `buf` starting at `offset`, returning the number of bytes
    /// read. A short count means end of file was reached.
    fn read(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Appends `buf` at the end of the file, returning the bytes written.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Forces dirty data down to durable storage.
    fn sync(&self) -> io::Result<()>;

    /// Current file size in bytes.
    fn size(&self) -> io::Result<u64>;
}

/// Opens `path` with the requested I/O variant, creating the file if absent.
pub fn new_io_manager(path: &Path, io_type: IoType) -> io::Result<Box<dyn IoManager>> {
    match io_type {
        IoType::Standard => Ok(Box::new(FileIo::new(path)?)),
        IoType::Mmap => Ok(Box::new(MmapIo::new(path)?)),
    }
}
