//! The repository-wide write lock that serializes commits (spec.md §4.7,
//! §5). Acquisition is always non-blocking; there is no inherent timeout on
//! the lock itself, so bounded retry is the caller's responsibility
//! (spec.md §5, §9).

use fs2::FileExt;
use fsfs_core::{Error, Result};
use fsfs_storage::Layout;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;

/// Held for the duration of a single commit. Releases on drop.
pub struct RepoWriteLock {
    file: File,
}

impl RepoWriteLock {
    /// Attempts the non-blocking exclusive lock on `write-lock`. Returns
    /// [`Error::LockFailed`] immediately on contention; it is never retried
    /// internally.
    pub fn try_acquire(layout: &Layout) -> Result<Self> {
        let file = OpenOptions::new().create(true).write(true).open(layout.write_lock_file())?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(RepoWriteLock { file }),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                Err(Error::LockFailed("repository write lock is held by another committer".into()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for RepoWriteLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsfs_storage::ProtoRevLayout;
    use tempfile::tempdir;

    #[test]
    fn commits_are_serialized_by_the_write_lock() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path(), ProtoRevLayout::OutOfTree, None);
        let first = RepoWriteLock::try_acquire(&layout).unwrap();
        assert!(matches!(RepoWriteLock::try_acquire(&layout), Err(Error::LockFailed(_))));
        drop(first);
        assert!(RepoWriteLock::try_acquire(&layout).is_ok());
    }
}
