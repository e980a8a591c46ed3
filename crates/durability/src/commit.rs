//! Commit-pipeline mechanics shared between this crate's tests and the
//! orchestration in the engine crate (spec.md §4.7): syncing and publishing
//! the proto-rev file, publishing revision properties, and draining the
//! rep-cache insert batch outside the write lock.

use crate::rep_cache::RepCache;
use fsfs_core::{Rep, Result, Rev, TxnId};
use fsfs_storage::{maybe_create_shard, Layout};
use std::fs::{self, File};
use std::io;
use tracing::debug;

/// Fsyncs the proto-rev file before it is renamed into place, per spec.md
/// §4.7 step 8 (I4: a revision file is never visible at `revs/<rev>` before
/// its bytes are durable).
pub fn fsync_proto_rev(file: &File) -> Result<()> {
    file.sync_all()?;
    Ok(())
}

/// Renames a transaction's finished proto-rev file into `revs/<new_rev>`,
/// creating shard directories first if `new_rev` starts a new shard
/// (spec.md §4.7 steps 9-10). Must run while the repo write lock and the
/// proto-rev lock are both still held.
pub fn publish_revision(layout: &Layout, txn_id: &TxnId, new_rev: Rev) -> Result<()> {
    maybe_create_shard(layout, new_rev)?;
    let proto_path = layout.proto_rev_file(txn_id);
    let rev_path = layout.rev_file(new_rev);
    fs::rename(&proto_path, &rev_path)?;
    debug!(rev = new_rev.0, txn = %txn_id, "published revision file");
    Ok(())
}

/// Renames the transaction's property file into `revprops/<new_rev>`,
/// tolerating a transaction with no properties at all (spec.md §4.7
/// step 13).
pub fn publish_revprops(layout: &Layout, txn_id: &TxnId, new_rev: Rev) -> Result<()> {
    let src = layout.txn_props_file(txn_id);
    let dst = layout.revprops_file(new_rev);
    match fs::rename(&src, &dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fsfs_storage::props::write(&dst, &fsfs_storage::PropHash::new())
        }
        Err(e) => Err(e.into()),
    }
}

/// Batches the reps written by this commit into the rep-cache, to be called
/// only after the repo write lock is released (spec.md §4.7 step 16): a
/// slow sqlite write must never hold up the next committer.
pub fn insert_rep_cache_batch(cache: &mut RepCache, rows: &[(String, Rep)]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    cache.insert_batch(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsfs_concurrency::{get_writable_proto_rev, TxnRegistry};
    use fsfs_storage::ProtoRevLayout;
    use std::io::Write as _;
    use tempfile::tempdir;

    #[test]
    fn publish_moves_proto_rev_into_revs_dir() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path(), ProtoRevLayout::OutOfTree, Some(1000));
        let registry = TxnRegistry::new();
        let txn_id = TxnId::new(Rev(0), 1);
        let (mut file, cookie) = get_writable_proto_rev(&registry, &layout, &txn_id).unwrap();
        file.write_all(b"DELTA\nfoo").unwrap();
        fsync_proto_rev(&file).unwrap();
        drop(file);

        publish_revision(&layout, &txn_id, Rev(1)).unwrap();
        drop(cookie);

        assert!(layout.rev_file(Rev(1)).exists());
        assert!(!layout.proto_rev_file(&txn_id).exists());
    }

    #[test]
    fn publish_revprops_falls_back_to_empty_when_txn_has_no_props_file() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path(), ProtoRevLayout::OutOfTree, None);
        fs::create_dir_all(layout.revs_dir(Rev(0))).unwrap();
        fs::create_dir_all(layout.revprops_dir(Rev(0))).unwrap();
        let txn_id = TxnId::new(Rev(0), 1);
        publish_revprops(&layout, &txn_id, Rev(1)).unwrap();
        let props = fsfs_storage::props::read(&layout.revprops_file(Rev(1))).unwrap();
        assert!(props.0.is_empty());
    }
}
