use std::fs::OpenOptions;
use std::io;
use std::path::Path;

use memmap2::Mmap;

use crate::IoManager;

/// Read-only memory-mapped I/O.
///
/// Only `read` and `size` are usable; `write` and `sync` fail with
/// `ErrorKind::Unsupported`. The engine swaps every file back to [`FileIo`]
/// after the startup scan.
///
/// [`FileIo`]: crate::FileIo
pub struct MmapIo {
    // A zero-length file cannot be mapped, so the mapping is optional.
    map: Option<Mmap>,
}

impl MmapIo {
    /// Maps `path` read-only, creating the file first if it does not exist.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).read(true).open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(Self { map: None });
        }
        // Safety: the engine holds the directory lock, and data files are
        // append-only; mapped bytes are never mutated while mapped.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self { map: Some(map) })
    }

    fn unsupported() -> io::Error {
        io::Error::new(
            io::ErrorKind::Unsupported,
            "mmap io is read-only; reopen with standard io first",
        )
    }
}

impl IoManager for MmapIo {
    fn read(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let data: &[u8] = match &self.map {
            Some(m) => m,
            None => return Ok(0),
        };
        if offset >= data.len() as u64 {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(Self::unsupported())
    }

    fn sync(&self) -> io::Result<()> {
        Err(Self::unsupported())
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.map.as_ref().map_or(0, |m| m.len() as u64))
    }
}
