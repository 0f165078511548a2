//! Atomic write batches.
//!
//! A batch buffers records in memory and commits them in one critical
//! section: every record is appended with a shared sequence-number key
//! prefix, then a `TxnFinished` marker seals the sequence. Recovery only
//! applies a sequence once it has seen the marker, so a crash mid-commit
//! rolls the whole batch back.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use datafile::{put_uvarint, uvarint, LogRecord, LogRecordType};

use crate::errors::{Error, Result};
use crate::options::WriteBatchOptions;
use crate::{Engine, IndexType};

/// Sequence number marking a record as non-transactional.
pub(crate) const NON_TRANSACTION_SEQ_NO: u64 = 0;

/// Key of the commit-marker record; only meaningful with its seq prefix.
const TXN_FIN_KEY: &[u8] = b"txn-fin";

/// Prefixes `key` with the unsigned-varint `seq_no`, the form every key
/// takes on disk.
pub(crate) fn key_with_seq(key: &[u8], seq_no: u64) -> Vec<u8> {
    let mut enc = Vec::with_capacity(datafile::MAX_VARINT_LEN64 + key.len());
    put_uvarint(&mut enc, seq_no);
    enc.extend_from_slice(key);
    enc
}

/// Splits a disk key back into the logical key and its sequence number.
pub(crate) fn parse_key_seq(key: &[u8]) -> (Vec<u8>, u64) {
    match uvarint(key) {
        Some((seq_no, n)) => (key[n..].to_vec(), seq_no),
        None => (key.to_vec(), NON_TRANSACTION_SEQ_NO),
    }
}

/// A buffered set of writes committed atomically.
pub struct WriteBatch<'a> {
    options: WriteBatchOptions,
    engine: &'a Engine,
    pending: Mutex<HashMap<Vec<u8>, LogRecord>>,
}

impl Engine {
    /// Creates an empty write batch.
    ///
    /// A persistent-index engine that is neither fresh nor carries a
    /// `seq-no` file cannot prove which sequences on disk are committed, so
    /// it refuses with [`Error::SeqNoFileNotFound`].
    pub fn new_write_batch(&self, options: WriteBatchOptions) -> Result<WriteBatch<'_>> {
        if self.options.index_type == IndexType::BPlusTree
            && !self.seq_no_file_exists
            && !self.is_initial
        {
            return Err(Error::SeqNoFileNotFound);
        }
        Ok(WriteBatch {
            options,
            engine: self,
            pending: Mutex::new(HashMap::new()),
        })
    }
}

impl WriteBatch<'_> {
    /// Buffers a put. Nothing reaches disk until [`commit`](Self::commit).
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        let mut pending = self.pending.lock().unwrap();
        pending.insert(
            key.to_vec(),
            LogRecord {
                key: key.to_vec(),
                value: value.to_vec(),
                rec_type: LogRecordType::Normal,
            },
        );
        Ok(())
    }

    /// Buffers a delete.
    ///
    /// Deleting a key that exists neither in the engine nor in this batch is
    /// a no-op; a key only pending in this batch is simply un-buffered.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        let mut pending = self.pending.lock().unwrap();
        if self.engine.index.get(key).is_none() {
            pending.remove(key);
            return Ok(());
        }
        pending.insert(
            key.to_vec(),
            LogRecord {
                key: key.to_vec(),
                value: Vec::new(),
                rec_type: LogRecordType::Deleted,
            },
        );
        Ok(())
    }

    /// Writes every buffered record under a fresh sequence number, seals the
    /// sequence with a `TxnFinished` marker, and applies the index updates.
    ///
    /// The engine write lock is held end-to-end, so readers never observe a
    /// partial batch.
    pub fn commit(&self) -> Result<()> {
        let mut pending = self.pending.lock().unwrap();
        if pending.is_empty() {
            return Ok(());
        }
        if pending.len() > self.options.max_batch_num {
            return Err(Error::ExceedMaxBatchNum);
        }

        let mut inner = self.engine.inner.write().unwrap();

        let seq_no = self.engine.seq_no.fetch_add(1, Ordering::SeqCst) + 1;

        let mut positions = HashMap::with_capacity(pending.len());
        for (key, record) in pending.iter() {
            let pos = self.engine.append_log_record(
                &mut inner,
                &LogRecord {
                    key: key_with_seq(key, seq_no),
                    value: record.value.clone(),
                    rec_type: record.rec_type,
                },
            )?;
            positions.insert(key.clone(), pos);
        }

        // the marker is what makes the sequence visible to recovery
        self.engine.append_log_record(
            &mut inner,
            &LogRecord {
                key: key_with_seq(TXN_FIN_KEY, seq_no),
                value: Vec::new(),
                rec_type: LogRecordType::TxnFinished,
            },
        )?;

        if self.options.sync_writes {
            if let Some(active) = inner.active_file.as_ref() {
                active.sync()?;
            }
        }

        for (key, record) in pending.iter() {
            let pos = positions[key];
            let old = match record.rec_type {
                LogRecordType::Normal => self.engine.index.put(key.clone(), pos),
                LogRecordType::Deleted => {
                    self.engine
                        .reclaim_size
                        .fetch_add(pos.size as i64, Ordering::SeqCst);
                    self.engine.index.delete(key).0
                }
                LogRecordType::TxnFinished => None,
            };
            if let Some(old) = old {
                self.engine
                    .reclaim_size
                    .fetch_add(old.size as i64, Ordering::SeqCst);
            }
        }

        pending.clear();
        Ok(())
    }
}
