use std::collections::BTreeMap;
use std::io;
use std::sync::RwLock;

use datafile::LogRecordPos;

use crate::{IndexIterator, Indexer, SnapshotIterator};

/// Ordered in-memory index: a `BTreeMap` behind a reader-writer lock.
///
/// Writes take the lock exclusively; the engine's own write lock already
/// serialises them, so contention here is incidental.
pub struct BTreeIndex {
    tree: RwLock<BTreeMap<Vec<u8>, LogRecordPos>>,
}

impl BTreeIndex {
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for BTreeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl Indexer for BTreeIndex {
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> Option<LogRecordPos> {
        let mut tree = self.tree.write().unwrap();
        tree.insert(key, pos)
    }

    fn get(&self, key: &[u8]) -> Option<LogRecordPos> {
        let tree = self.tree.read().unwrap();
        tree.get(key).copied()
    }

    fn delete(&self, key: &[u8]) -> (Option<LogRecordPos>, bool) {
        let mut tree = self.tree.write().unwrap();
        match tree.remove(key) {
            Some(old) => (Some(old), true),
            None => (None, false),
        }
    }

    fn size(&self) -> usize {
        self.tree.read().unwrap().len()
    }

    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator> {
        let tree = self.tree.read().unwrap();
        let items = tree.iter().map(|(k, v)| (k.clone(), *v)).collect();
        Box::new(SnapshotIterator::new(items, reverse))
    }

    fn close(&self) -> io::Result<()> {
        Ok(())
    }
}
