use std::path::PathBuf;

use index::IndexType;

use crate::errors::{Error, Result};

/// Engine configuration, validated by [`Engine::open`].
///
/// [`Engine::open`]: crate::Engine::open
#[derive(Debug, Clone)]
pub struct Options {
    /// Data directory. Created if absent.
    pub dir_path: PathBuf,

    /// Rotation threshold: the active file is retired once the next record
    /// would push it past this many bytes.
    pub data_file_size: u64,

    /// Fsync after this many accumulated written bytes. 0 disables the
    /// accumulator; `sync_write` still applies.
    pub bytes_per_sync: u64,

    /// Fsync after every single write.
    pub sync_write: bool,

    /// Which index implementation backs the engine.
    pub index_type: IndexType,

    /// Load data files through read-only memory maps at startup, then swap
    /// back to buffered I/O before serving writes.
    pub mmap_at_startup: bool,

    /// Minimum `reclaimable / directory_size` ratio before a merge is
    /// allowed to run. 0 disables the gate.
    pub data_file_merge_ratio: f32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir_path: std::env::temp_dir().join("driftcask"),
            data_file_size: 256 * 1024 * 1024,
            bytes_per_sync: 0,
            sync_write: false,
            index_type: IndexType::BTree,
            mmap_at_startup: true,
            data_file_merge_ratio: 0.5,
        }
    }
}

impl Options {
    pub(crate) fn check(&self) -> Result<()> {
        if self.dir_path.as_os_str().is_empty() {
            return Err(Error::InvalidOptions("database dir path is empty"));
        }
        if self.data_file_size == 0 {
            return Err(Error::InvalidOptions(
                "database data file size must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.data_file_merge_ratio) {
            return Err(Error::InvalidOptions(
                "invalid merge ratio, must between 0 and 1",
            ));
        }
        Ok(())
    }
}

/// Configuration for [`Engine::iterator`].
///
/// [`Engine::iterator`]: crate::Engine::iterator
#[derive(Debug, Clone, Default)]
pub struct IteratorOptions {
    /// Only yield keys starting with this prefix. Empty matches everything.
    pub prefix: Vec<u8>,
    /// Walk keys in descending order.
    pub reverse: bool,
}

/// Configuration for [`Engine::new_write_batch`].
///
/// [`Engine::new_write_batch`]: crate::Engine::new_write_batch
#[derive(Debug, Clone)]
pub struct WriteBatchOptions {
    /// Largest number of records a single batch may hold.
    pub max_batch_num: usize,
    /// Fsync the active file once the commit marker is written.
    pub sync_writes: bool,
}

impl Default for WriteBatchOptions {
    fn default() -> Self {
        Self {
            max_batch_num: 10_000,
            sync_writes: true,
        }
    }
}
