//! Merge (compaction): rewrite live records into a sibling `-merge`
//! directory, emit a hint index, and mark completion.
//!
//! Merge never mutates the live directory. The atomic swap — deleting the
//! rewritten originals and renaming the merge output in — happens at the
//! *next* open ([`load_merge_files`]), placing the cutover inside a
//! well-defined recovery point instead of at process runtime.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use datafile::{
    data_file_name, decode_log_record_pos, encode_log_record, DataFile, LogRecord, LogRecordType,
    HINT_FILE_NAME, MERGE_FINISHED_FILE_NAME,
};
use fio::IoType;
use index::BPTREE_INDEX_DIR;

use crate::batch::{key_with_seq, parse_key_seq, NON_TRANSACTION_SEQ_NO};
use crate::errors::{Error, Result};
use crate::{util, Engine, FILE_LOCK_NAME};

const MERGE_DIR_SUFFIX: &str = "-merge";
const MERGE_FINISHED_KEY: &[u8] = b"merge-finished";

/// Clears the merging flag however merge exits.
struct MergeGuard<'a>(&'a AtomicBool);

impl Drop for MergeGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// `{parent}/{base}-merge` for a data directory `{parent}/{base}`.
pub(crate) fn merge_path(dir: &Path) -> PathBuf {
    let base = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match dir.parent() {
        Some(parent) => parent.join(base + MERGE_DIR_SUFFIX),
        None => PathBuf::from(base + MERGE_DIR_SUFFIX),
    }
}

impl Engine {
    /// Rewrites every live record into a side instance, reclaiming the space
    /// held by superseded and tombstoned records at the next open.
    ///
    /// Fails with [`Error::MergeInProgress`] if a merge is already running,
    /// [`Error::MergeRatioUnreached`] while reclaimable bytes stay under
    /// `data_file_merge_ratio`, and [`Error::NotEnoughSpaceForMerge`] when
    /// the rewrite could not fit on disk.
    pub fn merge(&self) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.active_file.is_none() {
            return Ok(());
        }
        if self.is_merging.swap(true, Ordering::SeqCst) {
            return Err(Error::MergeInProgress);
        }
        let _merging = MergeGuard(&self.is_merging);

        let total_size = util::dir_size(&self.options.dir_path)?;
        let reclaim_size = self.reclaim_size.load(Ordering::SeqCst).max(0) as u64;
        if self.options.data_file_merge_ratio > 0.0
            && (reclaim_size as f32) < total_size as f32 * self.options.data_file_merge_ratio
        {
            return Err(Error::MergeRatioUnreached);
        }
        if total_size.saturating_sub(reclaim_size)
            >= util::available_disk_size(&self.options.dir_path)?
        {
            return Err(Error::NotEnoughSpaceForMerge);
        }

        // rotate: everything below the new active file id is merge input
        if let Some(active) = inner.active_file.as_ref() {
            active.sync()?;
        }
        self.set_active_data_file(&mut inner)?;
        let non_merge_file_id = match inner.active_file.as_ref() {
            Some(f) => f.file_id,
            None => return Err(Error::DataFileNotFound),
        };
        let mut merge_file_ids: Vec<u32> = inner.older_files.keys().copied().collect();
        drop(inner);
        merge_file_ids.sort_unstable();

        log::info!(
            "merging {} data file(s) below file id {}",
            merge_file_ids.len(),
            non_merge_file_id
        );

        let merge_path = merge_path(&self.options.dir_path);
        if merge_path.exists() {
            fs::remove_dir_all(&merge_path)?;
        }
        fs::create_dir_all(&merge_path)?;

        // side instance with durability under manual control
        let mut merge_options = self.options.clone();
        merge_options.dir_path = merge_path.clone();
        merge_options.sync_write = false;
        merge_options.data_file_merge_ratio = 0.0;
        let merge_engine = Engine::open(merge_options)?;

        let mut hint_file = DataFile::open_hint_file(&merge_path)?;

        for file_id in merge_file_ids {
            // a fresh read-only handle; the file is immutable once retired
            let data_file =
                DataFile::open_data_file(&self.options.dir_path, file_id, IoType::Standard)?;
            let mut offset = 0;
            while let Some((mut record, size)) = data_file.read_log_record(offset)? {
                let (real_key, _) = parse_key_seq(&record.key);
                // live iff the index still points at this very record
                if let Some(pos) = self.index.get(&real_key) {
                    if pos.file_id == file_id && pos.offset == offset as i64 {
                        // committed data needs no transaction tag anymore
                        record.key = key_with_seq(&real_key, NON_TRANSACTION_SEQ_NO);
                        let new_pos = merge_engine.append_log_record_with_lock(&record)?;
                        hint_file.write_hint_record(&real_key, &new_pos)?;
                    }
                }
                offset += size;
            }
        }

        hint_file.sync()?;
        merge_engine.sync()?;

        // committing marker: fold-in only trusts a directory that has one
        let mut finished_file = DataFile::open_merge_finished_file(&merge_path)?;
        let record = LogRecord {
            key: MERGE_FINISHED_KEY.to_vec(),
            value: non_merge_file_id.to_string().into_bytes(),
            rec_type: LogRecordType::Normal,
        };
        let (enc, _) = encode_log_record(&record);
        finished_file.write(&enc)?;
        finished_file.sync()?;

        log::info!("merge finished, boundary file id {}", non_merge_file_id);
        Ok(())
    }

    /// Streams `hint-index` records straight into the index. Each record's
    /// key is the real key (merge strips the sequence prefix) and its value
    /// decodes to a position.
    pub(crate) fn load_index_from_hint_file(&self) -> Result<()> {
        if !self.options.dir_path.join(HINT_FILE_NAME).is_file() {
            return Ok(());
        }
        let hint_file = DataFile::open_hint_file(&self.options.dir_path)?;
        let mut offset = 0;
        while let Some((record, size)) = hint_file.read_log_record(offset)? {
            let pos = decode_log_record_pos(&record.value).ok_or(Error::DataDirectoryCorrupted)?;
            self.index.put(record.key, pos);
            offset += size;
        }
        Ok(())
    }
}

/// Folds a committed merge directory into the data directory: deletes the
/// rewritten originals, renames the merge output in, and discards the merge
/// directory. An uncommitted merge directory is discarded outright.
///
/// Returns whether a fold-in happened.
pub(crate) fn load_merge_files(options: &crate::Options) -> Result<bool> {
    let merge_path = merge_path(&options.dir_path);
    if !merge_path.is_dir() {
        return Ok(false);
    }
    let result = fold_in(options, &merge_path);
    let _ = fs::remove_dir_all(&merge_path);
    result
}

fn fold_in(options: &crate::Options, merge_path: &Path) -> Result<bool> {
    let mut merge_finished = false;
    let mut file_names = Vec::new();
    for entry in fs::read_dir(merge_path)? {
        let entry = entry?;
        let name = entry.file_name();
        if name == MERGE_FINISHED_FILE_NAME {
            merge_finished = true;
        }
        // the side instance's own lock and index are not data
        if name == FILE_LOCK_NAME || name == BPTREE_INDEX_DIR {
            continue;
        }
        file_names.push(name);
    }
    if !merge_finished {
        log::warn!("discarding merge directory without a finished marker");
        return Ok(false);
    }

    let non_merge_file_id = no_merge_file_id(merge_path)?;

    // drop the originals the merge rewrote
    for file_id in 0..non_merge_file_id {
        let path = data_file_name(&options.dir_path, file_id);
        if path.is_file() {
            fs::remove_file(&path)?;
        }
    }
    for name in file_names {
        fs::rename(merge_path.join(&name), options.dir_path.join(&name))?;
    }
    log::info!(
        "folded merge output in, boundary file id {}",
        non_merge_file_id
    );
    Ok(true)
}

/// Reads the smallest unmerged file id out of a `merge-finished` marker.
pub(crate) fn no_merge_file_id(dir: &Path) -> Result<u32> {
    let finished_file = DataFile::open_merge_finished_file(dir)?;
    let (record, _) = finished_file
        .read_log_record(0)?
        .ok_or(Error::DataDirectoryCorrupted)?;
    std::str::from_utf8(&record.value)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(Error::DataDirectoryCorrupted)
}
