use std::path::Path;

use crate::{Engine, IndexType, Options};

/// Options tuned for tests: buffered startup, no durability gates, merge
/// ratio gate disabled.
pub(crate) fn test_options(dir: &Path) -> Options {
    Options {
        dir_path: dir.to_path_buf(),
        data_file_size: 64 * 1024 * 1024,
        bytes_per_sync: 0,
        sync_write: false,
        index_type: IndexType::BTree,
        mmap_at_startup: false,
        data_file_merge_ratio: 0.0,
    }
}

pub(crate) fn open(dir: &Path) -> Engine {
    Engine::open(test_options(dir)).unwrap()
}
