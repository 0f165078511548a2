//! Log record and position codecs.
//!
//! ## Record layout
//!
//! ```text
//! [crc: u32 LE][type: u8][key_size: varint][value_size: varint][key][value]
//! ```
//!
//! The CRC-32 (IEEE) covers every byte after the CRC field. Sizes are
//! zig-zag signed varints, so the header is at most 15 bytes. An all-zero
//! header (crc 0, both sizes 0) marks a clean end of file.

use byteorder::{ByteOrder, LittleEndian};

use crate::varint;

/// Upper bound on an encoded record header:
/// crc (4) + type (1) + two varint32 sizes (5 each).
pub const MAX_LOG_RECORD_HEADER_SIZE: usize = 4 + 1 + 2 * varint::MAX_VARINT_LEN32;

/// What a log record means to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRecordType {
    /// A live key-value pair.
    Normal = 0,
    /// A tombstone; the key is logically removed.
    Deleted = 1,
    /// Commit marker: every record with the same sequence number is durable.
    TxnFinished = 2,
}

impl LogRecordType {
    pub(crate) fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Normal),
            1 => Some(Self::Deleted),
            2 => Some(Self::TxnFinished),
            _ => None,
        }
    }
}

/// The atomic unit persisted to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub rec_type: LogRecordType,
}

/// In-memory index entry: where a record lives on disk.
///
/// `size` is the byte length of the whole encoded record, used for reclaim
/// accounting; positions decoded from the pair form carry `size == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecordPos {
    pub file_id: u32,
    pub offset: i64,
    pub size: u32,
}

/// Decoded record header plus raw type byte (validated after the CRC check).
pub(crate) struct LogRecordHeader {
    pub crc: u32,
    pub type_byte: u8,
    pub key_size: u32,
    pub value_size: u32,
}

/// Encodes `record`, returning the bytes and their total length.
pub fn encode_log_record(record: &LogRecord) -> (Vec<u8>, usize) {
    let mut buf =
        Vec::with_capacity(MAX_LOG_RECORD_HEADER_SIZE + record.key.len() + record.value.len());

    // crc filled in last
    buf.extend_from_slice(&[0u8; 4]);
    buf.push(record.rec_type as u8);
    varint::put_varint(&mut buf, record.key.len() as i64);
    varint::put_varint(&mut buf, record.value.len() as i64);
    buf.extend_from_slice(&record.key);
    buf.extend_from_slice(&record.value);

    let crc = crc32fast::hash(&buf[4..]);
    LittleEndian::write_u32(&mut buf[..4], crc);

    let n = buf.len();
    (buf, n)
}

/// Decodes a record header from the front of `buf`.
///
/// Returns `None` when `buf` is too short to hold a header, which a caller
/// scanning a file treats as end of file.
pub(crate) fn decode_log_record_header(buf: &[u8]) -> Option<(LogRecordHeader, usize)> {
    if buf.len() <= 4 {
        return None;
    }
    let crc = LittleEndian::read_u32(&buf[..4]);
    let type_byte = buf[4];
    let mut idx = 5;
    let (key_size, n) = varint::varint(&buf[idx..])?;
    idx += n;
    let (value_size, n) = varint::varint(&buf[idx..])?;
    idx += n;
    Some((
        LogRecordHeader {
            crc,
            type_byte,
            key_size: key_size as u32,
            value_size: value_size as u32,
        },
        idx,
    ))
}

/// Encodes a position as the varint pair `(file_id, offset)`.
///
/// Used as the value of hint-file records and of persistent-index entries.
pub fn encode_log_record_pos(pos: &LogRecordPos) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 * varint::MAX_VARINT_LEN64);
    varint::put_varint(&mut buf, pos.file_id as i64);
    varint::put_varint(&mut buf, pos.offset);
    buf
}

/// Decodes a position encoded by [`encode_log_record_pos`].
pub fn decode_log_record_pos(buf: &[u8]) -> Option<LogRecordPos> {
    let (file_id, n) = varint::varint(buf)?;
    let (offset, _) = varint::varint(&buf[n..])?;
    Some(LogRecordPos {
        file_id: file_id as u32,
        offset,
        size: 0,
    })
}
