//! User-facing iteration: wraps an index cursor, filters by prefix, and
//! materialises values on demand.

use index::IndexIterator;

use crate::errors::Result;
use crate::options::IteratorOptions;
use crate::Engine;

/// Ordered cursor over the engine's live keys.
///
/// Holds a non-owning reference to the engine and an owning index cursor;
/// [`value`](Self::value) takes the engine read lock for the positional
/// read, so the iterator can be interleaved with writers.
pub struct EngineIterator<'a> {
    index_iter: Box<dyn IndexIterator>,
    engine: &'a Engine,
    options: IteratorOptions,
}

impl Engine {
    /// Creates an iterator positioned at the first matching key.
    pub fn iterator(&self, options: IteratorOptions) -> EngineIterator<'_> {
        let index_iter = self.index.iterator(options.reverse);
        let mut iter = EngineIterator {
            index_iter,
            engine: self,
            options,
        };
        iter.rewind();
        iter
    }
}

impl EngineIterator<'_> {
    /// Back to the first matching key.
    pub fn rewind(&mut self) {
        self.index_iter.rewind();
        self.skip_to_next();
    }

    /// Positions on the first matching key `>= key` (`<=` when reversed).
    pub fn seek(&mut self, key: &[u8]) {
        self.index_iter.seek(key);
        self.skip_to_next();
    }

    /// Advances to the next matching key.
    pub fn next(&mut self) {
        self.index_iter.next();
        self.skip_to_next();
    }

    /// Whether the cursor points at a key.
    pub fn valid(&self) -> bool {
        self.index_iter.valid()
    }

    /// The current key.
    pub fn key(&self) -> &[u8] {
        self.index_iter.key()
    }

    /// Reads the current key's value from its data file.
    pub fn value(&self) -> Result<Vec<u8>> {
        let inner = self.engine.inner.read().unwrap();
        self.engine
            .get_value_by_position(&inner, &self.index_iter.value())
    }

    /// Advances the underlying cursor until its key carries the configured
    /// prefix (or the cursor is exhausted).
    fn skip_to_next(&mut self) {
        let prefix = &self.options.prefix;
        if prefix.is_empty() {
            return;
        }
        while self.index_iter.valid() {
            if self.index_iter.key().starts_with(prefix) {
                break;
            }
            self.index_iter.next();
        }
    }
}
