use super::helpers::{open, test_options};
use crate::{Engine, Error};
use tempfile::tempdir;

#[test]
fn get_missing_key() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    assert!(matches!(engine.get(b"nope"), Err(Error::KeyNotFound)));
}

#[test]
fn list_keys_is_sorted() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    for key in [b"mango".as_ref(), b"apple", b"peach", b"banana"] {
        engine.put(key, b"x").unwrap();
    }
    engine.delete(b"peach").unwrap();

    assert_eq!(
        engine.list_keys(),
        vec![b"apple".to_vec(), b"banana".to_vec(), b"mango".to_vec()]
    );
}

#[test]
fn fold_visits_all_pairs_in_order() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    engine.put(b"a", b"1").unwrap();
    engine.put(b"b", b"2").unwrap();
    engine.put(b"c", b"3").unwrap();

    let mut seen = Vec::new();
    engine
        .fold(|key, value| {
            seen.push((key.to_vec(), value));
            true
        })
        .unwrap();
    assert_eq!(
        seen,
        vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
            (b"c".to_vec(), b"3".to_vec())
        ]
    );
}

#[test]
fn fold_stops_when_callback_returns_false() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    for key in [b"a".as_ref(), b"b", b"c", b"d"] {
        engine.put(key, b"x").unwrap();
    }

    let mut count = 0;
    engine
        .fold(|_, _| {
            count += 1;
            count < 2
        })
        .unwrap();
    assert_eq!(count, 2);
}

// --------------------- stat ---------------------

#[test]
fn stat_tracks_keys_files_and_garbage() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());

    let stat = engine.stat().unwrap();
    assert_eq!(stat.key_num, 0);
    assert_eq!(stat.data_file_num, 0);
    assert_eq!(stat.reclaim_size, 0);

    engine.put(b"a", b"1").unwrap();
    engine.put(b"b", b"2").unwrap();
    let stat = engine.stat().unwrap();
    assert_eq!(stat.key_num, 2);
    assert_eq!(stat.data_file_num, 1);
    assert_eq!(stat.reclaim_size, 0);
    assert!(stat.disk_size > 0);

    // an overwrite strands the old record
    engine.put(b"a", b"1'").unwrap();
    let overwritten = engine.stat().unwrap();
    assert!(overwritten.reclaim_size > 0);

    // a delete strands the old record and the tombstone itself
    engine.delete(b"b").unwrap();
    let deleted = engine.stat().unwrap();
    assert_eq!(deleted.key_num, 1);
    assert!(deleted.reclaim_size > overwritten.reclaim_size);
}

// --------------------- backup ---------------------

#[test]
fn backup_copies_everything_but_the_lock() {
    let dir = tempdir().unwrap();
    let backup_dir = tempdir().unwrap();
    let dest = backup_dir.path().join("snapshot");

    let engine = open(dir.path());
    engine.put(b"k1", b"v1").unwrap();
    engine.put(b"k2", b"v2").unwrap();
    engine.sync().unwrap();
    engine.backup(&dest).unwrap();
    engine.close().unwrap();

    assert!(!dest.join("flock").exists());

    // a backup is a complete, openable database
    let restored = Engine::open(test_options(&dest)).unwrap();
    assert_eq!(restored.get(b"k1").unwrap(), b"v1");
    assert_eq!(restored.get(b"k2").unwrap(), b"v2");
}
