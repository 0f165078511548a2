use std::io;
use std::sync::Mutex;

use crossbeam_skiplist::SkipMap;
use datafile::LogRecordPos;

use crate::{IndexIterator, Indexer, SnapshotIterator};

/// Skiplist-backed index: reads are lock-free, writers are serialised by a
/// mutex so that replace-and-return-old stays atomic.
pub struct SkipListIndex {
    map: SkipMap<Vec<u8>, LogRecordPos>,
    write_lock: Mutex<()>,
}

impl SkipListIndex {
    pub fn new() -> Self {
        Self {
            map: SkipMap::new(),
            write_lock: Mutex::new(()),
        }
    }
}

impl Default for SkipListIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl Indexer for SkipListIndex {
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> Option<LogRecordPos> {
        let _guard = self.write_lock.lock().unwrap();
        let old = self.map.get(&key).map(|e| *e.value());
        self.map.insert(key, pos);
        old
    }

    fn get(&self, key: &[u8]) -> Option<LogRecordPos> {
        self.map.get(key).map(|e| *e.value())
    }

    fn delete(&self, key: &[u8]) -> (Option<LogRecordPos>, bool) {
        let _guard = self.write_lock.lock().unwrap();
        match self.map.remove(key) {
            Some(entry) => (Some(*entry.value()), true),
            None => (None, false),
        }
    }

    fn size(&self) -> usize {
        self.map.len()
    }

    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator> {
        let items = self
            .map
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        Box::new(SnapshotIterator::new(items, reverse))
    }

    fn close(&self) -> io::Result<()> {
        Ok(())
    }
}
