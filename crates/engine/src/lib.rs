//! # Engine — Driftcask storage engine
//!
//! A single-writer, log-structured key-value store in the Bitcask mould,
//! tying together the [`fio`], [`datafile`], and [`index`] crates.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌──────────────────────────────────────────────────┐
//! │                    ENGINE                        │
//! │                                                  │
//! │ write.rs → encode record → active data file      │
//! │               |        (rotation at size limit)  │
//! │               v                                  │
//! │          index.put(key, position)                │
//! │                                                  │
//! │ read.rs  → index.get → positional read → value   │
//! │                                                  │
//! │ batch.rs → sequence-tagged records + commit mark │
//! │ merge.rs → live-data rewrite into side directory │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Module responsibilities
//!
//! | Module        | Purpose                                                |
//! |---------------|--------------------------------------------------------|
//! | `lib.rs`      | `Engine` struct, open/close/sync/stat/backup           |
//! | [`write`]     | `put()`, `delete()`, append-with-rotation              |
//! | [`read`]      | `get()`, `list_keys()`, `fold()`                       |
//! | [`recovery`]  | directory scan, ordered replay, txn reassembly         |
//! | [`merge`]     | compaction, hint emission, next-open fold-in           |
//! | [`batch`]     | atomic write batches                                   |
//! | [`iterator`]  | prefix-filtered ordered iteration                      |
//!
//! ## Crash safety
//!
//! Every mutation is a CRC-framed record appended to the active data file
//! before the index is touched. Recovery replays the log in file order,
//! holding transactional records back until their commit marker appears.
//! Merge writes into a sibling `-merge` directory and never mutates the live
//! one; the atomic swap happens at the next open, inside a well-defined
//! recovery point.

mod batch;
mod errors;
mod iterator;
mod merge;
mod options;
mod read;
mod recovery;
mod util;
mod write;

pub use batch::WriteBatch;
pub use errors::{Error, Result};
pub use iterator::EngineIterator;
pub use options::{IteratorOptions, Options, WriteBatchOptions};

pub use index::IndexType;

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::RwLock;

use datafile::{encode_log_record, DataFile, LogRecord, LogRecordType};
use fs4::FileExt;
use index::Indexer;

/// Key of the single record inside the `seq-no` file.
const SEQ_NO_KEY: &[u8] = b"seq-no";
/// Advisory lock file guaranteeing one engine instance per directory.
const FILE_LOCK_NAME: &str = "flock";

/// Engine statistics returned by [`Engine::stat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    /// Number of live keys.
    pub key_num: usize,
    /// Number of data files, active included.
    pub data_file_num: usize,
    /// Bytes the next merge would reclaim.
    pub reclaim_size: i64,
    /// Bytes the data directory occupies on disk.
    pub disk_size: u64,
}

/// File state guarded by the engine-level reader-writer lock.
pub(crate) struct EngineInner {
    /// The only file open for write; the highest-numbered one.
    pub(crate) active_file: Option<DataFile>,
    /// Previously active files, read-only.
    pub(crate) older_files: HashMap<u32, DataFile>,
    /// File ids discovered at startup, ascending. Only used during load.
    pub(crate) file_ids: Vec<u32>,
    /// Bytes written since the last fsync, for the `bytes_per_sync` policy.
    pub(crate) bytes_write: u64,
}

/// A Bitcask-style storage engine instance.
///
/// Writers (put, delete, batch commit, merge setup) take the inner lock
/// exclusively; readers (get, iterator values, fold) take it shared. The
/// index synchronises itself, and the sequence number and reclaim counter
/// are atomics, so read paths never need the write lock.
///
/// One instance per directory is enforced with an advisory lock on
/// `{dir}/flock`; a second [`Engine::open`] fails with
/// [`Error::DatabaseIsUsing`] until [`Engine::close`] releases it.
pub struct Engine {
    pub(crate) options: Options,
    pub(crate) inner: RwLock<EngineInner>,
    pub(crate) index: Box<dyn Indexer>,
    /// Latest transaction sequence number handed out.
    pub(crate) seq_no: AtomicU64,
    /// Bytes of superseded or tombstoned records awaiting merge.
    pub(crate) reclaim_size: AtomicI64,
    pub(crate) is_merging: AtomicBool,
    /// Whether a `seq-no` file was present at open (persistent index only).
    pub(crate) seq_no_file_exists: bool,
    /// Whether this open created (or found empty) the data directory.
    pub(crate) is_initial: bool,
    file_lock: fs::File,
}

impl Engine {
    /// Opens an engine on `options.dir_path`, creating the directory if
    /// needed and running full recovery.
    ///
    /// # Recovery steps
    ///
    /// 1. Validate options and take the directory lock.
    /// 2. Fold a finished sibling `-merge` directory in, if one exists.
    /// 3. Open every `.data` file, highest id becoming the active file
    ///    (memory-mapped when `mmap_at_startup` is set).
    /// 4. Rebuild the index: hint-file replay, then ordered data-file replay
    ///    with transaction reassembly. The persistent index skips both and
    ///    recovers the sequence number from `seq-no` instead.
    /// 5. Reopen every file with buffered I/O before serving writes.
    pub fn open(options: Options) -> Result<Engine> {
        options.check()?;

        let dir = options.dir_path.clone();
        let mut is_initial = false;
        if !dir.is_dir() {
            is_initial = true;
            fs::create_dir_all(&dir)?;
        }

        // one engine per directory
        let file_lock = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(dir.join(FILE_LOCK_NAME))?;
        if let Err(e) = file_lock.try_lock_exclusive() {
            return Err(if e.kind() == io::ErrorKind::WouldBlock {
                Error::DatabaseIsUsing
            } else {
                Error::Io(e)
            });
        }

        let mut entries = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != FILE_LOCK_NAME);
        if entries.next().is_none() {
            is_initial = true;
        }
        drop(entries);

        // fold a committed merge in before anything reads the directory
        let folded_merge = merge::load_merge_files(&options)?;

        let index = index::new_indexer(options.index_type, &dir, options.sync_write)?;

        // only the persistent index trusts seq-no; the others rebuild the
        // sequence number from the log below
        let mut seq_no = 0;
        let mut seq_no_file_exists = false;
        if options.index_type == IndexType::BPlusTree {
            if let Some(n) = recovery::load_seq_no_file(&dir)? {
                seq_no = n;
                seq_no_file_exists = true;
            }
        }

        let engine = Engine {
            options,
            inner: RwLock::new(EngineInner {
                active_file: None,
                older_files: HashMap::new(),
                file_ids: Vec::new(),
                bytes_write: 0,
            }),
            index,
            seq_no: AtomicU64::new(seq_no),
            reclaim_size: AtomicI64::new(0),
            is_merging: AtomicBool::new(false),
            seq_no_file_exists,
            is_initial,
            file_lock,
        };

        engine.load_data_files()?;

        if engine.options.index_type != IndexType::BPlusTree {
            engine.load_index_from_hint_file()?;
            engine.load_index_from_data_files()?;
        } else {
            if folded_merge {
                // the persistent index never replays data files, so the hint
                // file is its only way to learn the rewritten positions
                engine.load_index_from_hint_file()?;
            }
            let mut inner = engine.inner.write().unwrap();
            if let Some(active) = inner.active_file.as_mut() {
                active.write_offset = active.size()?;
            }
        }

        // the mmap variant cannot write; swap every file back
        if engine.options.mmap_at_startup {
            engine.reset_io_type()?;
        }

        Ok(engine)
    }

    /// Flushes the active file to durable storage.
    pub fn sync(&self) -> Result<()> {
        let inner = self.inner.write().unwrap();
        if let Some(active) = inner.active_file.as_ref() {
            active.sync()?;
        }
        Ok(())
    }

    /// Closes the engine: persists the sequence number, closes the index,
    /// syncs and drops every file handle, and releases the directory lock.
    ///
    /// The lock is released on every exit path, error returns included;
    /// a directory must never stay locked by an engine that reported
    /// itself closed.
    ///
    /// # Panics
    ///
    /// Panics if the directory lock cannot be released — there is no way to
    /// recover a directory another opener will consider free.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let _unlock = UnlockGuard(&self.file_lock);

        self.index.close()?;

        if inner.active_file.is_some() {
            // rewrite seq-no so the next persistent-index open can trust it
            let seq_no_path = self.options.dir_path.join(datafile::SEQ_NO_FILE_NAME);
            if seq_no_path.is_file() {
                fs::remove_file(&seq_no_path)?;
            }
            let mut seq_no_file = DataFile::open_seq_no_file(&self.options.dir_path)?;
            let record = LogRecord {
                key: SEQ_NO_KEY.to_vec(),
                value: self.seq_no.load(Ordering::SeqCst).to_string().into_bytes(),
                rec_type: LogRecordType::Normal,
            };
            let (enc, _) = encode_log_record(&record);
            seq_no_file.write(&enc)?;
            seq_no_file.sync()?;

            if let Some(active) = inner.active_file.as_ref() {
                active.sync()?;
            }
        }

        inner.active_file = None;
        inner.older_files.clear();
        Ok(())
    }

    /// Returns key count, file count, reclaimable bytes, and directory size.
    pub fn stat(&self) -> Result<Stat> {
        let inner = self.inner.read().unwrap();

        let mut data_file_num = inner.older_files.len();
        if inner.active_file.is_some() {
            data_file_num += 1;
        }
        Ok(Stat {
            key_num: self.index.size(),
            data_file_num,
            reclaim_size: self.reclaim_size.load(Ordering::SeqCst),
            disk_size: util::dir_size(&self.options.dir_path)?,
        })
    }

    /// Copies the data directory into `dest`, excluding the lock file.
    pub fn backup(&self, dest: &Path) -> Result<()> {
        let _inner = self.inner.read().unwrap();
        util::copy_dir(&self.options.dir_path, dest, &[FILE_LOCK_NAME])?;
        Ok(())
    }
}

/// Releases the directory lock when dropped, so [`Engine::close`] cannot
/// leave the lock held on an error return.
struct UnlockGuard<'a>(&'a fs::File);

impl Drop for UnlockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.0.unlock() {
            panic!("failed to unlock the directory, {}", e);
        }
    }
}

/// Best-effort flush on drop for engines that were never closed cleanly.
impl Drop for Engine {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.read() {
            if let Some(active) = inner.active_file.as_ref() {
                let _ = active.sync();
            }
        }
    }
}

#[cfg(test)]
mod tests;
