//! Durability helpers shared by the queue stores and the ledger.
//!
//! Creating, renaming, or deleting a file changes its parent directory. On
//! POSIX the directory entry is only durable once the directory itself is
//! synced, so every operation here syncs both the file and its directory.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Syncs a file's contents and metadata to disk.
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Syncs a directory so that entry changes inside it survive power loss.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}

/// Replaces `target` with `bytes` atomically.
///
/// The bytes go to `staging` first, are synced, and then renamed over
/// `target`. Readers observe either the old contents or the new ones, never a
/// partial write. `staging` must live in the same directory as `target`.
pub fn write_atomic(dir: &Path, staging: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(staging)?;
        file.write_all(bytes)?;
        fsync_file(&file)?;
    }

    std::fs::rename(staging, target)?;
    fsync_dir(dir)
}
