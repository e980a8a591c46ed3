//! Canonical on-disk paths, per spec.md §6.
//!
//! All other crates compute paths through [`Layout`] rather than formatting
//! strings themselves, so the on-disk shape lives in exactly one place.

use fsfs_core::{Rev, TxnId};
use std::path::{Path, PathBuf};

/// Whether a transaction's proto-rev lives inside its own `.txn/` directory
/// (older formats) or in a sibling `txn-protorevs/` directory (modern
/// formats, spec.md §3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoRevLayout {
    InTxnDir,
    OutOfTree,
}

/// Computes canonical paths under a repository root.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
    proto_rev_layout: ProtoRevLayout,
    max_files_per_dir: Option<u32>,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>, proto_rev_layout: ProtoRevLayout, max_files_per_dir: Option<u32>) -> Self {
        Layout {
            root: root.into(),
            proto_rev_layout,
            max_files_per_dir,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn format_file(&self) -> PathBuf {
        self.root.join("format")
    }

    pub fn current_file(&self) -> PathBuf {
        self.root.join("current")
    }

    pub fn txn_current_file(&self) -> PathBuf {
        self.root.join("txn-current")
    }

    pub fn txn_current_lock_file(&self) -> PathBuf {
        self.root.join("txn-current-lock")
    }

    pub fn write_lock_file(&self) -> PathBuf {
        self.root.join("write-lock")
    }

    pub fn rep_cache_db(&self) -> PathBuf {
        self.root.join("rep-cache.db")
    }

    fn shard_dir(&self, base: &str, rev: Rev) -> PathBuf {
        match self.max_files_per_dir {
            Some(max) if max > 0 => self.root.join(base).join((rev.0 / max as u64).to_string()),
            _ => self.root.join(base),
        }
    }

    pub fn revs_dir(&self, rev: Rev) -> PathBuf {
        self.shard_dir("revs", rev)
    }

    pub fn rev_file(&self, rev: Rev) -> PathBuf {
        self.revs_dir(rev).join(rev.0.to_string())
    }

    pub fn revprops_dir(&self, rev: Rev) -> PathBuf {
        self.shard_dir("revprops", rev)
    }

    pub fn revprops_file(&self, rev: Rev) -> PathBuf {
        self.revprops_dir(rev).join(rev.0.to_string())
    }

    /// True when `rev` is the first revision of a new shard, i.e. the shard
    /// directories must be created before writing into it (spec.md §4.7 step 9).
    pub fn starts_new_shard(&self, rev: Rev) -> bool {
        match self.max_files_per_dir {
            Some(max) if max > 0 => rev.0 % max as u64 == 0,
            _ => rev.0 == 0,
        }
    }

    pub fn txn_dir(&self, txn_id: &TxnId) -> PathBuf {
        self.root.join("txns").join(format!("{txn_id}.txn"))
    }

    pub fn txn_props_file(&self, txn_id: &TxnId) -> PathBuf {
        self.txn_dir(txn_id).join("props")
    }

    pub fn txn_next_ids_file(&self, txn_id: &TxnId) -> PathBuf {
        self.txn_dir(txn_id).join("next-ids")
    }

    pub fn txn_changes_file(&self, txn_id: &TxnId) -> PathBuf {
        self.txn_dir(txn_id).join("changes")
    }

    /// The proto-rev append file, whose location depends on the proto-rev
    /// layout in effect for this repository (spec.md §3).
    pub fn proto_rev_file(&self, txn_id: &TxnId) -> PathBuf {
        match self.proto_rev_layout {
            ProtoRevLayout::InTxnDir => self.txn_dir(txn_id).join("rev"),
            ProtoRevLayout::OutOfTree => self.root.join("txn-protorevs").join(format!("{txn_id}.rev")),
        }
    }

    pub fn proto_rev_lock_file(&self, txn_id: &TxnId) -> PathBuf {
        match self.proto_rev_layout {
            ProtoRevLayout::InTxnDir => self.txn_dir(txn_id).join("rev-lock"),
            ProtoRevLayout::OutOfTree => self.root.join("txn-protorevs").join(format!("{txn_id}.rev-lock")),
        }
    }

    pub fn txn_node_children_file(&self, txn_id: &TxnId, node_id: &str) -> PathBuf {
        self.txn_dir(txn_id).join(format!("{node_id}.children"))
    }

    pub fn txn_node_props_file(&self, txn_id: &TxnId, node_id: &str) -> PathBuf {
        self.txn_dir(txn_id).join(format!("{node_id}.props"))
    }

    /// Intra-txn sha1 sidecar file used by rep-sharing (spec.md §4.4 step 4).
    pub fn txn_sha1_sidecar_file(&self, txn_id: &TxnId, sha1_hex: &str) -> PathBuf {
        self.txn_dir(txn_id).join(sha1_hex)
    }
}

/// Creates the shard directories for `rev` if `rev` starts a new shard,
/// tolerating `EEXIST` per spec.md §4.7 step 9.
pub fn maybe_create_shard(layout: &Layout, rev: Rev) -> std::io::Result<()> {
    if !layout.starts_new_shard(rev) {
        return Ok(());
    }
    for dir in [layout.revs_dir(rev), layout.revprops_dir(rev)] {
        match std::fs::create_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sharding_matches_max_files_per_dir() {
        let layout = Layout::new("/repo", ProtoRevLayout::OutOfTree, Some(1000));
        assert_eq!(layout.rev_file(Rev(1999)), Path::new("/repo/revs/1/1999"));
        assert!(layout.starts_new_shard(Rev(1000)));
        assert!(!layout.starts_new_shard(Rev(1001)));
    }

    #[test]
    fn unsharded_layout_flattens() {
        let layout = Layout::new("/repo", ProtoRevLayout::InTxnDir, None);
        assert_eq!(layout.rev_file(Rev(42)), Path::new("/repo/revs/42"));
    }

    #[test]
    fn proto_rev_paths_depend_on_layout() {
        let txn = TxnId::new(Rev(5), 1);
        let in_tree = Layout::new("/repo", ProtoRevLayout::InTxnDir, None);
        assert_eq!(in_tree.proto_rev_file(&txn), Path::new("/repo/txns/5-1.txn/rev"));
        let out_of_tree = Layout::new("/repo", ProtoRevLayout::OutOfTree, None);
        assert_eq!(
            out_of_tree.proto_rev_file(&txn),
            Path::new("/repo/txn-protorevs/5-1.rev")
        );
    }
}
