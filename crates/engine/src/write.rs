//! Write path: `put()`, `delete()`, and the append-with-rotation core that
//! every mutation (including batch commits and merge rewrites) flows
//! through.

use std::sync::atomic::Ordering;

use datafile::{encode_log_record, DataFile, LogRecord, LogRecordPos, LogRecordType};
use fio::IoType;

use crate::batch::{key_with_seq, NON_TRANSACTION_SEQ_NO};
use crate::errors::{Error, Result};
use crate::{Engine, EngineInner};

impl Engine {
    /// Stores `value` under `key`, replacing any previous value.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }

        let record = LogRecord {
            key: key_with_seq(key, NON_TRANSACTION_SEQ_NO),
            value: value.to_vec(),
            rec_type: LogRecordType::Normal,
        };
        let pos = self.append_log_record_with_lock(&record)?;

        // a replaced record becomes garbage for the next merge
        if let Some(old) = self.index.put(key.to_vec(), pos) {
            self.reclaim_size.fetch_add(old.size as i64, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Removes `key` by appending a tombstone.
    ///
    /// Fails with [`Error::KeyNotFound`] if the key does not exist.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        if self.index.get(key).is_none() {
            return Err(Error::KeyNotFound);
        }

        let record = LogRecord {
            key: key_with_seq(key, NON_TRANSACTION_SEQ_NO),
            value: Vec::new(),
            rec_type: LogRecordType::Deleted,
        };
        let pos = self.append_log_record_with_lock(&record)?;
        // the tombstone itself is reclaimable the moment it lands
        self.reclaim_size.fetch_add(pos.size as i64, Ordering::SeqCst);

        let (old, existed) = self.index.delete(key);
        if !existed {
            return Err(Error::IndexUpdateFailed);
        }
        if let Some(old) = old {
            self.reclaim_size.fetch_add(old.size as i64, Ordering::SeqCst);
        }
        Ok(())
    }

    pub(crate) fn append_log_record_with_lock(&self, record: &LogRecord) -> Result<LogRecordPos> {
        let mut inner = self.inner.write().unwrap();
        self.append_log_record(&mut inner, record)
    }

    /// Appends `record` to the active file, rotating first when the record
    /// would push it past `data_file_size`. Caller holds the write lock.
    pub(crate) fn append_log_record(
        &self,
        inner: &mut EngineInner,
        record: &LogRecord,
    ) -> Result<LogRecordPos> {
        // the first append of a fresh engine creates file 0 lazily
        if inner.active_file.is_none() {
            self.set_active_data_file(inner)?;
        }

        let (enc, size) = encode_log_record(record);

        let rotate = inner
            .active_file
            .as_ref()
            .map(|f| f.write_offset + size as u64 > self.options.data_file_size)
            .unwrap_or(false);
        if rotate {
            // retire the full file only once its contents are durable
            if let Some(active) = inner.active_file.as_ref() {
                active.sync()?;
            }
            self.set_active_data_file(inner)?;
        }

        let active = inner.active_file.as_mut().expect("active data file is set");
        let write_offset = active.write_offset;
        active.write(&enc)?;

        inner.bytes_write += size as u64;
        let need_sync = self.options.sync_write
            || (self.options.bytes_per_sync > 0 && inner.bytes_write >= self.options.bytes_per_sync);
        if need_sync {
            active.sync()?;
            inner.bytes_write = 0;
        }

        Ok(LogRecordPos {
            file_id: active.file_id,
            offset: write_offset as i64,
            size: size as u32,
        })
    }

    /// Opens the successor of the current active file (or file 0) and
    /// demotes the current one into the older-files map. Caller holds the
    /// write lock.
    pub(crate) fn set_active_data_file(&self, inner: &mut EngineInner) -> Result<()> {
        let initial_file_id = match inner.active_file.as_ref() {
            Some(f) => f.file_id + 1,
            None => 0,
        };
        let data_file =
            DataFile::open_data_file(&self.options.dir_path, initial_file_id, IoType::Standard)?;
        if let Some(old) = inner.active_file.take() {
            inner.older_files.insert(old.file_id, old);
        }
        inner.active_file = Some(data_file);
        Ok(())
    }
}
