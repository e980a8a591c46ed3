//! The `txn-current` sequence counter: allocates the `seq` half of a
//! [`TxnId`] (spec.md §4.6 Begin step 1).

use fs2::FileExt;
use fsfs_core::ids::{from_base36, to_base36};
use fsfs_core::{Error, Result};
use fsfs_storage::Layout;
use std::fs::{self, OpenOptions};
use std::io::Write;

/// Reads, increments, and rewrites `txn-current` under its lock, returning
/// the freshly allocated sequence number. Blocks briefly for the lock since
/// this is a tiny, bounded critical section (unlike the proto-rev and repo
/// write locks, which fail fast).
pub fn next_txn_seq(layout: &Layout) -> Result<u64> {
    let lock_file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(layout.txn_current_lock_file())?;
    lock_file.lock_exclusive().map_err(|e| Error::LockFailed(e.to_string()))?;
    let result = (|| -> Result<u64> {
        let current = match fs::read_to_string(layout.txn_current_file()) {
            Ok(s) => from_base36(s.trim()).ok_or_else(|| Error::corrupt("malformed txn-current"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        let next = current.checked_add(1).ok_or(Error::UniqueNamesExhausted(0))?;
        let tmp_path = layout.txn_current_file().with_extension("tmp");
        {
            let mut tmp = fs::File::create(&tmp_path)?;
            write!(tmp, "{}\n", to_base36(next))?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, layout.txn_current_file())?;
        Ok(current)
    })();
    let _ = FileExt::unlock(&lock_file);
    result
}
