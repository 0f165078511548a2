use super::helpers::{open, test_options};
use crate::batch::key_with_seq;
use crate::{Engine, Error, IndexType, WriteBatchOptions};
use datafile::{data_file_name, encode_log_record, LogRecord, LogRecordType};
use std::sync::atomic::Ordering;
use tempfile::tempdir;

fn batch_options() -> WriteBatchOptions {
    WriteBatchOptions {
        max_batch_num: 10_000,
        sync_writes: true,
    }
}

#[test]
fn batch_is_invisible_before_commit() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());

    let batch = engine.new_write_batch(batch_options()).unwrap();
    batch.put(b"a", b"1").unwrap();
    batch.put(b"b", b"2").unwrap();
    batch.delete(b"c").unwrap();
    assert!(matches!(engine.get(b"a"), Err(Error::KeyNotFound)));

    batch.commit().unwrap();
    assert_eq!(engine.get(b"a").unwrap(), b"1");
    assert_eq!(engine.get(b"b").unwrap(), b"2");
    assert!(matches!(engine.get(b"c"), Err(Error::KeyNotFound)));
}

#[test]
fn batch_delete_of_existing_key() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    engine.put(b"doomed", b"v").unwrap();

    let batch = engine.new_write_batch(batch_options()).unwrap();
    batch.delete(b"doomed").unwrap();
    batch.commit().unwrap();
    assert!(matches!(engine.get(b"doomed"), Err(Error::KeyNotFound)));
}

#[test]
fn batch_delete_unbuffers_pending_put() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());

    let batch = engine.new_write_batch(batch_options()).unwrap();
    batch.put(b"k", b"v").unwrap();
    // the key exists nowhere outside this batch, so the pair cancels out
    batch.delete(b"k").unwrap();
    batch.commit().unwrap();
    assert!(matches!(engine.get(b"k"), Err(Error::KeyNotFound)));
}

#[test]
fn empty_commit_is_a_noop() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    let batch = engine.new_write_batch(batch_options()).unwrap();
    batch.commit().unwrap();
    assert_eq!(engine.stat().unwrap().data_file_num, 0);
}

#[test]
fn oversized_batch_is_rejected() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    let batch = engine
        .new_write_batch(WriteBatchOptions {
            max_batch_num: 2,
            sync_writes: false,
        })
        .unwrap();
    batch.put(b"a", b"1").unwrap();
    batch.put(b"b", b"2").unwrap();
    batch.put(b"c", b"3").unwrap();
    assert!(matches!(batch.commit(), Err(Error::ExceedMaxBatchNum)));
}

#[test]
fn batch_survives_restart() {
    let dir = tempdir().unwrap();
    {
        let engine = open(dir.path());
        let batch = engine.new_write_batch(batch_options()).unwrap();
        batch.put(b"a", b"1").unwrap();
        batch.put(b"b", b"2").unwrap();
        batch.commit().unwrap();
        engine.close().unwrap();
    }

    let engine = open(dir.path());
    assert_eq!(engine.get(b"a").unwrap(), b"1");
    assert_eq!(engine.get(b"b").unwrap(), b"2");
    // replay recovered the committed sequence number
    assert_eq!(engine.seq_no.load(Ordering::SeqCst), 1);
}

#[test]
fn torn_batch_is_rolled_back_on_restart() {
    let dir = tempdir().unwrap();
    {
        let engine = open(dir.path());
        let batch = engine.new_write_batch(batch_options()).unwrap();
        batch.put(b"a", b"1").unwrap();
        batch.put(b"b", b"2").unwrap();
        batch.commit().unwrap();
        engine.close().unwrap();
    }

    // simulate a crash after the data records but before the commit marker:
    // cut exactly the TxnFinished record off the tail of the active file
    let fin = LogRecord {
        key: key_with_seq(b"txn-fin", 1),
        value: Vec::new(),
        rec_type: LogRecordType::TxnFinished,
    };
    let (_, fin_len) = encode_log_record(&fin);
    let path = data_file_name(dir.path(), 0);
    let len = std::fs::metadata(&path).unwrap().len();
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - fin_len as u64).unwrap();
    drop(file);

    // none of the batch's effects may be visible
    let engine = open(dir.path());
    assert!(matches!(engine.get(b"a"), Err(Error::KeyNotFound)));
    assert!(matches!(engine.get(b"b"), Err(Error::KeyNotFound)));
}

#[test]
fn mixed_batched_and_plain_writes_replay_correctly() {
    let dir = tempdir().unwrap();
    {
        let engine = open(dir.path());
        engine.put(b"plain", b"1").unwrap();
        let batch = engine.new_write_batch(batch_options()).unwrap();
        batch.put(b"batched", b"2").unwrap();
        batch.commit().unwrap();
        engine.put(b"plain", b"3").unwrap();
        engine.close().unwrap();
    }

    let engine = open(dir.path());
    assert_eq!(engine.get(b"plain").unwrap(), b"3");
    assert_eq!(engine.get(b"batched").unwrap(), b"2");
}

// --------------------- persistent-index precondition ---------------------

#[test]
fn bptree_refuses_batch_without_seq_no_file() {
    let dir = tempdir().unwrap();
    let mut options = test_options(dir.path());
    options.index_type = IndexType::BPlusTree;

    {
        // a fresh engine may hand out batches
        let engine = Engine::open(options.clone()).unwrap();
        assert!(engine.new_write_batch(batch_options()).is_ok());
        engine.put(b"k", b"v").unwrap();
        // dropped without close: no seq-no file is written
    }

    {
        let engine = Engine::open(options.clone()).unwrap();
        assert!(matches!(
            engine.new_write_batch(batch_options()),
            Err(Error::SeqNoFileNotFound)
        ));
        engine.close().unwrap();
    }

    // a clean close restores batching
    let engine = Engine::open(options).unwrap();
    let batch = engine.new_write_batch(batch_options()).unwrap();
    batch.put(b"via-batch", b"v").unwrap();
    batch.commit().unwrap();
    assert_eq!(engine.get(b"via-batch").unwrap(), b"v");
    engine.close().unwrap();
}
