//! Read path: point lookups plus whole-index walks (`list_keys`, `fold`).
//!
//! A read is one index lookup and one positional file read, verified by the
//! record CRC on the way in.

use datafile::{LogRecordPos, LogRecordType};

use crate::errors::{Error, Result};
use crate::{Engine, EngineInner};

impl Engine {
    /// Returns the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let inner = self.inner.read().unwrap();

        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        let pos = self.index.get(key).ok_or(Error::KeyNotFound)?;
        self.get_value_by_position(&inner, &pos)
    }

    /// Resolves a position to its record's value. Caller holds at least the
    /// read lock.
    pub(crate) fn get_value_by_position(
        &self,
        inner: &EngineInner,
        pos: &LogRecordPos,
    ) -> Result<Vec<u8>> {
        let data_file = match inner.active_file.as_ref() {
            Some(active) if active.file_id == pos.file_id => Some(active),
            _ => inner.older_files.get(&pos.file_id),
        };
        let Some(data_file) = data_file else {
            return Err(Error::DataFileNotFound);
        };

        let (record, _) = data_file
            .read_log_record(pos.offset as u64)?
            .ok_or(Error::InvalidRecordCrc)?;

        // unreachable with a sound index, but enforced
        if record.rec_type == LogRecordType::Deleted {
            return Err(Error::DataAlreadyDeleted);
        }
        Ok(record.value)
    }

    /// Returns every live key in ascending order.
    pub fn list_keys(&self) -> Vec<Vec<u8>> {
        let mut iter = self.index.iterator(false);
        let mut keys = Vec::with_capacity(self.index.size());
        iter.rewind();
        while iter.valid() {
            keys.push(iter.key().to_vec());
            iter.next();
        }
        keys
    }

    /// Calls `f` with every live key-value pair, in ascending key order,
    /// until `f` returns `false`.
    pub fn fold<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], Vec<u8>) -> bool,
    {
        let inner = self.inner.read().unwrap();
        let mut iter = self.index.iterator(false);
        iter.rewind();
        while iter.valid() {
            let value = self.get_value_by_position(&inner, &iter.value())?;
            if !f(iter.key(), value) {
                break;
            }
            iter.next();
        }
        Ok(())
    }
}
