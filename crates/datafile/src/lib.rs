//! # datafile — log records on disk
//!
//! A data directory holds numbered append-only data files plus three
//! single-record companions:
//!
//! | File             | Contents                                            |
//! |------------------|-----------------------------------------------------|
//! | `{:09}.data`     | log records, laid out contiguously from offset 0    |
//! | `hint-index`     | `(key, position)` records emitted by merge          |
//! | `merge-finished` | the smallest unmerged file id when merge committed  |
//! | `seq-no`         | the latest transaction sequence number              |
//!
//! [`DataFile`] wraps an [`fio::IoManager`] with a file id and a write
//! offset; [`DataFile::read_log_record`] is the one decoding path shared by
//! startup replay, merge, and point reads.

mod record;
mod varint;

pub use record::{
    decode_log_record_pos, encode_log_record, encode_log_record_pos, LogRecord, LogRecordPos,
    LogRecordType, MAX_LOG_RECORD_HEADER_SIZE,
};
pub use varint::{put_uvarint, put_varint, uvarint, varint, MAX_VARINT_LEN64};

use std::io;
use std::path::{Path, PathBuf};

use fio::{new_io_manager, IoManager, IoType};
use thiserror::Error;

/// Suffix of numbered data files.
pub const DATA_FILE_SUFFIX: &str = ".data";
/// Name of the hint index produced by merge.
pub const HINT_FILE_NAME: &str = "hint-index";
/// Name of the merge-commit marker file.
pub const MERGE_FINISHED_FILE_NAME: &str = "merge-finished";
/// Name of the sequence-number file written on close.
pub const SEQ_NO_FILE_NAME: &str = "seq-no";

/// Errors from reading or writing a data file.
#[derive(Debug, Error)]
pub enum DataFileError {
    /// An underlying filesystem error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record failed CRC validation or carried an unknown type byte.
    #[error("invalid crc value, log record maybe corrupted")]
    Corrupt,
}

/// Full path of the data file with the given id, zero-padded to nine digits.
pub fn data_file_name(dir: &Path, file_id: u32) -> PathBuf {
    dir.join(format!("{:09}{}", file_id, DATA_FILE_SUFFIX))
}

/// A single on-disk log file with its append cursor.
pub struct DataFile {
    pub file_id: u32,
    /// Byte offset the next append lands at. Maintained by the engine; equal
    /// to the file length at every quiescent moment.
    pub write_offset: u64,
    io: Box<dyn IoManager>,
}

impl DataFile {
    /// Opens the numbered data file `{dir}/{:09}.data`.
    pub fn open_data_file(dir: &Path, file_id: u32, io_type: IoType) -> Result<Self, DataFileError> {
        Self::open(data_file_name(dir, file_id), file_id, io_type)
    }

    /// Opens `{dir}/hint-index`.
    pub fn open_hint_file(dir: &Path) -> Result<Self, DataFileError> {
        Self::open(dir.join(HINT_FILE_NAME), 0, IoType::Standard)
    }

    /// Opens `{dir}/merge-finished`.
    pub fn open_merge_finished_file(dir: &Path) -> Result<Self, DataFileError> {
        Self::open(dir.join(MERGE_FINISHED_FILE_NAME), 0, IoType::Standard)
    }

    /// Opens `{dir}/seq-no`.
    pub fn open_seq_no_file(dir: &Path) -> Result<Self, DataFileError> {
        Self::open(dir.join(SEQ_NO_FILE_NAME), 0, IoType::Standard)
    }

    fn open(path: PathBuf, file_id: u32, io_type: IoType) -> Result<Self, DataFileError> {
        let io = new_io_manager(&path, io_type)?;
        Ok(Self {
            file_id,
            write_offset: 0,
            io,
        })
    }

    /// Appends `buf`, advancing the write offset.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, DataFileError> {
        let n = self.io.write(buf)?;
        self.write_offset += n as u64;
        Ok(n)
    }

    /// Appends a hint record: the real key mapped to an encoded position.
    pub fn write_hint_record(
        &mut self,
        key: &[u8],
        pos: &LogRecordPos,
    ) -> Result<(), DataFileError> {
        let record = LogRecord {
            key: key.to_vec(),
            value: encode_log_record_pos(pos),
            rec_type: LogRecordType::Normal,
        };
        let (enc, _) = encode_log_record(&record);
        self.write(&enc)?;
        Ok(())
    }

    pub fn sync(&self) -> Result<(), DataFileError> {
        Ok(self.io.sync()?)
    }

    pub fn size(&self) -> Result<u64, DataFileError> {
        Ok(self.io.size()?)
    }

    /// Reads the record at `offset`, returning it together with its encoded
    /// length, or `None` at a clean end of file.
    ///
    /// A partially written record at the tail (a crash mid-append) also
    /// decodes as `None`: a scan keeps every complete record before it. A
    /// complete record whose CRC does not match fails with
    /// [`DataFileError::Corrupt`].
    pub fn read_log_record(&self, offset: u64) -> Result<Option<(LogRecord, u64)>, DataFileError> {
        let file_size = self.io.size()?;
        if offset >= file_size {
            return Ok(None);
        }

        // The header shrinks near EOF; never read past the end of the file.
        let header_bytes = (MAX_LOG_RECORD_HEADER_SIZE as u64).min(file_size - offset) as usize;
        let header_buf = self.read_n_bytes(header_bytes, offset)?;

        let Some((header, header_size)) = record::decode_log_record_header(&header_buf) else {
            return Ok(None);
        };
        if header.crc == 0 && header.key_size == 0 && header.value_size == 0 {
            return Ok(None);
        }

        let key_size = header.key_size as usize;
        let value_size = header.value_size as usize;
        let kv = self.read_n_bytes(key_size + value_size, offset + header_size as u64)?;
        if kv.len() < key_size + value_size {
            // torn tail record
            return Ok(None);
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header_buf[4..header_size]);
        hasher.update(&kv);
        if hasher.finalize() != header.crc {
            return Err(DataFileError::Corrupt);
        }
        let rec_type = LogRecordType::from_u8(header.type_byte).ok_or(DataFileError::Corrupt)?;

        let total = (header_size + key_size + value_size) as u64;
        Ok(Some((
            LogRecord {
                key: kv[..key_size].to_vec(),
                value: kv[key_size..].to_vec(),
                rec_type,
            },
            total,
        )))
    }

    /// Positional read helper; the returned buffer may be short at EOF.
    pub fn read_n_bytes(&self, n: usize, offset: u64) -> Result<Vec<u8>, DataFileError> {
        let mut buf = vec![0u8; n];
        let got = self.io.read(&mut buf, offset)?;
        buf.truncate(got);
        Ok(buf)
    }

    /// Closes the current handle and reopens the file with the requested I/O
    /// variant. Used to swap mmap-loaded files back to buffered I/O.
    pub fn set_io_manager(&mut self, dir: &Path, io_type: IoType) -> Result<(), DataFileError> {
        self.io = new_io_manager(&data_file_name(dir, self.file_id), io_type)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
