//! Startup recovery: directory scan, ordered replay with transaction
//! reassembly, and the mmap-to-buffered I/O switchover.
//!
//! Replay applies non-transactional records immediately. Sequence-tagged
//! records are held in a pending buffer until their `TxnFinished` marker
//! appears; a sequence whose marker never shows up (a crash mid-commit) is
//! dropped wholesale.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::Ordering;

use datafile::{DataFile, LogRecord, LogRecordPos, LogRecordType, DATA_FILE_SUFFIX,
    MERGE_FINISHED_FILE_NAME, SEQ_NO_FILE_NAME};
use fio::IoType;

use crate::batch::{parse_key_seq, NON_TRANSACTION_SEQ_NO};
use crate::errors::{Error, Result};
use crate::{merge, Engine};

/// Reads the sequence number persisted by the last clean close, if any.
pub(crate) fn load_seq_no_file(dir: &Path) -> Result<Option<u64>> {
    if !dir.join(SEQ_NO_FILE_NAME).is_file() {
        return Ok(None);
    }
    let seq_no_file = DataFile::open_seq_no_file(dir)?;
    let (record, _) = seq_no_file
        .read_log_record(0)?
        .ok_or(Error::DataDirectoryCorrupted)?;
    let seq_no = std::str::from_utf8(&record.value)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(Error::DataDirectoryCorrupted)?;
    Ok(Some(seq_no))
}

impl Engine {
    /// Enumerates `.data` files, opens them ascending, and installs the
    /// highest-numbered one as the active file.
    pub(crate) fn load_data_files(&self) -> Result<()> {
        let mut file_ids: Vec<u32> = Vec::new();
        for entry in std::fs::read_dir(&self.options.dir_path)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(DATA_FILE_SUFFIX) {
                let file_id = stem
                    .parse::<u32>()
                    .map_err(|_| Error::DataDirectoryCorrupted)?;
                file_ids.push(file_id);
            }
        }
        file_ids.sort_unstable();

        let io_type = if self.options.mmap_at_startup {
            IoType::Mmap
        } else {
            IoType::Standard
        };

        let mut inner = self.inner.write().unwrap();
        for (i, file_id) in file_ids.iter().enumerate() {
            let data_file = DataFile::open_data_file(&self.options.dir_path, *file_id, io_type)?;
            if i == file_ids.len() - 1 {
                inner.active_file = Some(data_file);
            } else {
                inner.older_files.insert(*file_id, data_file);
            }
        }
        inner.file_ids = file_ids;
        Ok(())
    }

    /// Rebuilds the in-memory index by scanning every data file at or above
    /// the merge boundary, in ascending file order.
    pub(crate) fn load_index_from_data_files(&self) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.file_ids.is_empty() {
            return Ok(());
        }

        // files below the boundary were rewritten by merge and are already
        // covered by the hint file
        let mut non_merge_file_id = 0;
        if self
            .options
            .dir_path
            .join(MERGE_FINISHED_FILE_NAME)
            .is_file()
        {
            non_merge_file_id = merge::no_merge_file_id(&self.options.dir_path)?;
        }

        let update_index = |key: Vec<u8>, rec_type: LogRecordType, pos: LogRecordPos| {
            let old = if rec_type == LogRecordType::Deleted {
                self.reclaim_size.fetch_add(pos.size as i64, Ordering::SeqCst);
                self.index.delete(&key).0
            } else {
                self.index.put(key, pos)
            };
            if let Some(old) = old {
                self.reclaim_size.fetch_add(old.size as i64, Ordering::SeqCst);
            }
        };

        // records of a batch wait here for their commit marker
        let mut txn_records: HashMap<u64, Vec<(LogRecord, LogRecordPos)>> = HashMap::new();
        let mut current_seq_no = NON_TRANSACTION_SEQ_NO;

        let file_ids = inner.file_ids.clone();
        let mut active_offset = 0;
        for (i, file_id) in file_ids.iter().enumerate() {
            if *file_id < non_merge_file_id {
                continue;
            }
            let data_file = match inner.active_file.as_ref() {
                Some(active) if active.file_id == *file_id => active,
                _ => inner
                    .older_files
                    .get(file_id)
                    .ok_or(Error::DataFileNotFound)?,
            };

            let mut offset = 0;
            while let Some((record, size)) = data_file.read_log_record(offset)? {
                let pos = LogRecordPos {
                    file_id: *file_id,
                    offset: offset as i64,
                    size: size as u32,
                };
                let (real_key, seq_no) = parse_key_seq(&record.key);
                if seq_no == NON_TRANSACTION_SEQ_NO {
                    update_index(real_key, record.rec_type, pos);
                } else if record.rec_type == LogRecordType::TxnFinished {
                    // the whole sequence is committed; apply in arrival order
                    for (txn_record, txn_pos) in txn_records.remove(&seq_no).unwrap_or_default() {
                        update_index(txn_record.key, txn_record.rec_type, txn_pos);
                    }
                } else {
                    let mut record = record;
                    record.key = real_key;
                    txn_records.entry(seq_no).or_default().push((record, pos));
                }
                if seq_no > current_seq_no {
                    current_seq_no = seq_no;
                }
                offset += size;
            }

            // the final scan position of the active file is where the next
            // append lands
            if i == file_ids.len() - 1 {
                active_offset = offset;
            }
        }

        if !txn_records.is_empty() {
            log::warn!(
                "dropped {} torn transaction(s) with no commit marker",
                txn_records.len()
            );
        }

        if let Some(active) = inner.active_file.as_mut() {
            active.write_offset = active_offset;
        }
        self.seq_no.store(current_seq_no, Ordering::SeqCst);
        Ok(())
    }

    /// Reopens every data file with buffered I/O after an mmap-backed load.
    pub(crate) fn reset_io_type(&self) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(active) = inner.active_file.as_mut() {
            active.set_io_manager(&self.options.dir_path, IoType::Standard)?;
        }
        for data_file in inner.older_files.values_mut() {
            data_file.set_io_manager(&self.options.dir_path, IoType::Standard)?;
        }
        Ok(())
    }
}
