//! Directory helpers: recursive size, free-space probe, and copy with
//! exclusions (used by backup).

use std::fs;
use std::io;
use std::path::Path;

/// Total bytes of every regular file under `dir`, recursively.
pub(crate) fn dir_size(dir: &Path) -> io::Result<u64> {
    let mut size = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            size += dir_size(&entry.path())?;
        } else {
            size += meta.len();
        }
    }
    Ok(size)
}

/// Free bytes on the filesystem holding `dir`.
pub(crate) fn available_disk_size(dir: &Path) -> io::Result<u64> {
    fs4::available_space(dir)
}

/// Recursively copies `src` into `dest`, skipping entries whose file name
/// appears in `excludes`.
pub(crate) fn copy_dir(src: &Path, dest: &Path, excludes: &[&str]) -> io::Result<()> {
    if !dest.is_dir() {
        fs::create_dir_all(dest)?;
    }
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if excludes.iter().any(|e| name == *e) {
            continue;
        }
        let target = dest.join(&name);
        if entry.metadata()?.is_dir() {
            copy_dir(&entry.path(), &target, excludes)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
