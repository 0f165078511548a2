use std::io;
use std::path::Path;

use datafile::{decode_log_record_pos, encode_log_record_pos, LogRecordPos};
use sled::Db;

use crate::{IndexIterator, Indexer, SnapshotIterator, BPTREE_INDEX_DIR};

/// Persistent index: an on-disk `sled` tree under `{dir}/bptree-index`.
///
/// Position values are stored with the same varint pair codec used by hint
/// files. This is the only index the engine does not rebuild by log replay,
/// so it must see every put and delete as it happens.
///
/// Mutation failures here are storage-invariant violations (the tree is the
/// source of truth for the whole index), so they abort rather than bubble.
pub struct BPlusTreeIndex {
    tree: Db,
    sync_write: bool,
}

impl BPlusTreeIndex {
    /// Opens (or creates) the index tree inside `dir`.
    pub fn open(dir: &Path, sync_write: bool) -> io::Result<Self> {
        let tree = sled::Config::default()
            .path(dir.join(BPTREE_INDEX_DIR))
            .open()
            .map_err(to_io)?;
        Ok(Self { tree, sync_write })
    }

    fn maybe_flush(&self) {
        if self.sync_write {
            self.tree.flush().expect("failed to flush bptree index");
        }
    }
}

fn to_io(err: sled::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

impl Indexer for BPlusTreeIndex {
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> Option<LogRecordPos> {
        let old = self
            .tree
            .insert(key, encode_log_record_pos(&pos))
            .expect("failed to put value in bptree index");
        self.maybe_flush();
        old.and_then(|v| decode_log_record_pos(&v))
    }

    fn get(&self, key: &[u8]) -> Option<LogRecordPos> {
        self.tree
            .get(key)
            .expect("failed to get value in bptree index")
            .and_then(|v| decode_log_record_pos(&v))
    }

    fn delete(&self, key: &[u8]) -> (Option<LogRecordPos>, bool) {
        let old = self
            .tree
            .remove(key)
            .expect("failed to delete value in bptree index");
        self.maybe_flush();
        match old {
            Some(v) => (decode_log_record_pos(&v), true),
            None => (None, false),
        }
    }

    fn size(&self) -> usize {
        self.tree.len()
    }

    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator> {
        let mut items = Vec::with_capacity(self.tree.len());
        for kv in self.tree.iter() {
            let (k, v) = kv.expect("failed to iterate bptree index");
            if let Some(pos) = decode_log_record_pos(&v) {
                items.push((k.to_vec(), pos));
            }
        }
        // sled iterates in key order already
        Box::new(SnapshotIterator::new(items, reverse))
    }

    fn close(&self) -> io::Result<()> {
        self.tree.flush().map_err(to_io)?;
        Ok(())
    }
}
