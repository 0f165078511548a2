use super::*;
use fio::IoType;
use tempfile::tempdir;

fn sample(key: &[u8], value: &[u8], rec_type: LogRecordType) -> LogRecord {
    LogRecord {
        key: key.to_vec(),
        value: value.to_vec(),
        rec_type,
    }
}

// -------------------- codec --------------------

#[test]
fn encode_then_read_back() {
    let dir = tempdir().unwrap();
    let mut df = DataFile::open_data_file(dir.path(), 0, IoType::Standard).unwrap();

    let rec = sample(b"name", b"driftcask", LogRecordType::Normal);
    let (enc, n) = encode_log_record(&rec);
    assert!(n > 5 + rec.key.len() + rec.value.len() - 1);
    df.write(&enc).unwrap();

    let (got, total) = df.read_log_record(0).unwrap().unwrap();
    assert_eq!(got, rec);
    assert_eq!(total as usize, n);
    assert_eq!(df.write_offset, total);
}

#[test]
fn empty_value_and_tombstone() {
    let dir = tempdir().unwrap();
    let mut df = DataFile::open_data_file(dir.path(), 1, IoType::Standard).unwrap();

    let rec = sample(b"k", b"", LogRecordType::Deleted);
    let (enc, _) = encode_log_record(&rec);
    df.write(&enc).unwrap();

    let (got, _) = df.read_log_record(0).unwrap().unwrap();
    assert_eq!(got.rec_type, LogRecordType::Deleted);
    assert!(got.value.is_empty());
}

#[test]
fn sequential_scan_over_multiple_records() {
    let dir = tempdir().unwrap();
    let mut df = DataFile::open_data_file(dir.path(), 2, IoType::Standard).unwrap();

    let recs = vec![
        sample(b"a", b"1", LogRecordType::Normal),
        sample(b"bb", b"22", LogRecordType::Normal),
        sample(b"ccc", b"", LogRecordType::Deleted),
    ];
    for r in &recs {
        let (enc, _) = encode_log_record(r);
        df.write(&enc).unwrap();
    }

    let mut offset = 0;
    let mut got = Vec::new();
    while let Some((rec, n)) = df.read_log_record(offset).unwrap() {
        got.push(rec);
        offset += n;
    }
    assert_eq!(got, recs);
    assert_eq!(offset, df.write_offset);
}

#[test]
fn read_past_end_is_eof() {
    let dir = tempdir().unwrap();
    let df = DataFile::open_data_file(dir.path(), 3, IoType::Standard).unwrap();
    assert!(df.read_log_record(0).unwrap().is_none());
    assert!(df.read_log_record(100).unwrap().is_none());
}

#[test]
fn flipped_byte_fails_crc() {
    let dir = tempdir().unwrap();
    let path = data_file_name(dir.path(), 4);
    {
        let mut df = DataFile::open_data_file(dir.path(), 4, IoType::Standard).unwrap();
        let (enc, _) = encode_log_record(&sample(b"key", b"value", LogRecordType::Normal));
        df.write(&enc).unwrap();
    }

    // flip the last byte (inside the value)
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&path, &bytes).unwrap();

    let df = DataFile::open_data_file(dir.path(), 4, IoType::Standard).unwrap();
    assert!(matches!(df.read_log_record(0), Err(DataFileError::Corrupt)));
}

#[test]
fn torn_tail_record_reads_as_eof() {
    let dir = tempdir().unwrap();
    let path = data_file_name(dir.path(), 5);
    let first_len;
    {
        let mut df = DataFile::open_data_file(dir.path(), 5, IoType::Standard).unwrap();
        let (enc, n) = encode_log_record(&sample(b"whole", b"record", LogRecordType::Normal));
        first_len = n as u64;
        df.write(&enc).unwrap();
        let (enc, _) = encode_log_record(&sample(b"torn", b"record", LogRecordType::Normal));
        df.write(&enc).unwrap();
    }

    // cut the second record in half
    let f = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    f.set_len(first_len + 6).unwrap();
    drop(f);

    let df = DataFile::open_data_file(dir.path(), 5, IoType::Standard).unwrap();
    let (rec, n) = df.read_log_record(0).unwrap().unwrap();
    assert_eq!(rec.key, b"whole");
    assert!(df.read_log_record(n).unwrap().is_none());
}

// -------------------- positions and hint records --------------------

#[test]
fn position_pair_round_trip() {
    let pos = LogRecordPos {
        file_id: 42,
        offset: 1 << 33,
        size: 99,
    };
    let enc = encode_log_record_pos(&pos);
    let got = decode_log_record_pos(&enc).unwrap();
    assert_eq!(got.file_id, 42);
    assert_eq!(got.offset, 1 << 33);
    // size is not part of the pair encoding
    assert_eq!(got.size, 0);
}

#[test]
fn hint_record_round_trip() {
    let dir = tempdir().unwrap();
    let mut hint = DataFile::open_hint_file(dir.path()).unwrap();
    let pos = LogRecordPos {
        file_id: 7,
        offset: 1234,
        size: 56,
    };
    hint.write_hint_record(b"real-key", &pos).unwrap();
    hint.sync().unwrap();

    let hint = DataFile::open_hint_file(dir.path()).unwrap();
    let (rec, _) = hint.read_log_record(0).unwrap().unwrap();
    assert_eq!(rec.key, b"real-key");
    let got = decode_log_record_pos(&rec.value).unwrap();
    assert_eq!((got.file_id, got.offset), (7, 1234));
}

// -------------------- io switchover --------------------

#[test]
fn mmap_read_then_switch_to_standard() {
    let dir = tempdir().unwrap();
    {
        let mut df = DataFile::open_data_file(dir.path(), 6, IoType::Standard).unwrap();
        let (enc, _) = encode_log_record(&sample(b"k", b"v", LogRecordType::Normal));
        df.write(&enc).unwrap();
        df.sync().unwrap();
    }

    let mut df = DataFile::open_data_file(dir.path(), 6, IoType::Mmap).unwrap();
    let (rec, n) = df.read_log_record(0).unwrap().unwrap();
    assert_eq!(rec.value, b"v");

    // the mmap variant cannot append
    let (enc, _) = encode_log_record(&sample(b"k2", b"v2", LogRecordType::Normal));
    assert!(df.write(&enc).is_err());

    df.set_io_manager(dir.path(), IoType::Standard).unwrap();
    df.write_offset = n;
    df.write(&enc).unwrap();
    let (rec, _) = df.read_log_record(n).unwrap().unwrap();
    assert_eq!(rec.key, b"k2");
}
