//! The embedder-facing entry point: opening/creating a repository and
//! driving transactions through mutation and commit (spec.md §4.6, §4.7).

use crate::commit;
use crate::config::RepoConfig;
use crate::noderev;
use crate::tree::{self, EngineDeltaSource, HistoryIndex};
use crate::txn::Transaction;
use fsfs_core::path::split_parent;
use fsfs_core::{ChangeKind, ChangeRecord, Error, NodeId, NodeKind, Result, Rev};
use fsfs_durability::{DeltaBase, RepCache, RepresentationWriter};
use fsfs_storage::current::init_current;
use fsfs_storage::{maybe_create_shard, Layout, PropHash, RevisionTrailer};
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::Path;

/// A single FSFS-style repository: the durable state a process needs to
/// begin, mutate, and commit transactions against one on-disk tree.
pub struct Repo {
    layout: Layout,
    registry: fsfs_concurrency::TxnRegistry,
    rep_cache: RepCache,
    config: RepoConfig,
    history: HistoryIndex,
    youngest: Rev,
}

impl Repo {
    /// Bootstraps a brand-new, empty repository at `root`: the directory
    /// skeleton, `format`, `current` at revision 0, and revision 0 itself
    /// (an empty root directory with no entries).
    pub fn create(root: impl AsRef<Path>, config: RepoConfig) -> Result<Repo> {
        let layout = Layout::new(root.as_ref(), config.proto_rev_layout, config.max_files_per_dir);
        std::fs::create_dir_all(layout.root())?;
        maybe_create_shard(&layout, Rev::ZERO)?;
        std::fs::write(layout.format_file(), format!("{}\n", fsfs_core::limits::FORMAT_VERSION))?;

        let root_id = NodeId::provisional("0").finalize(Rev::ZERO);
        let root_nr = fsfs_core::NodeRev::new_root(root_id.clone(), root_id.clone(), "/", Rev::ZERO);

        let mut rev_file = File::create(layout.rev_file(Rev::ZERO))?;
        let root_offset = 0u64;
        noderev::write_placeholder(&mut rev_file, &root_nr)?;
        let changed_paths_offset = rev_file.metadata()?.len();
        RevisionTrailer { root_offset, changed_paths_offset }.write(&mut rev_file)?;
        rev_file.sync_all()?;
        drop(rev_file);

        fsfs_storage::props::write(&layout.revprops_file(Rev::ZERO), &PropHash::new())?;
        init_current(&layout, config.current_format)?;

        let mut history = HistoryIndex::new();
        history.record_node_rev(root_id.clone(), root_nr);
        history.record_path("/".to_string(), root_id.clone());
        history.record_dir_listing(root_id, BTreeMap::new());

        let rep_cache = RepCache::open(&layout)?;
        Ok(Repo { layout, registry: fsfs_concurrency::TxnRegistry::new(), rep_cache, config, history, youngest: Rev::ZERO })
    }

    /// Resumes a repository this process is still holding state for.
    ///
    /// Reconstructing [`HistoryIndex`] from disk for an arbitrary revision
    /// requires the node/directory tree traversal API spec.md §1 treats as
    /// an external collaborator this core does not implement. This `open`
    /// therefore only succeeds when `current` still reads revision 0 (in
    /// which case the root is deterministically the empty directory created
    /// by [`Repo::create`], regardless of which process wrote it) or when
    /// the caller is this same process resuming a repository it created
    /// itself. Opening a multi-revision repository from a fresh process
    /// needs that traversal collaborator and is out of scope here.
    pub fn open(root: impl AsRef<Path>, config: RepoConfig) -> Result<Repo> {
        let layout = Layout::new(root.as_ref(), config.proto_rev_layout, config.max_files_per_dir);
        let current = fsfs_storage::current::read_current(&layout)?;
        let youngest = current.rev();
        if youngest != Rev::ZERO {
            return Err(Error::corrupt(
                "opening a repository past revision 0 requires the node/directory tree traversal collaborator, which this core does not implement",
            ));
        }

        let root_id = NodeId::provisional("0").finalize(Rev::ZERO);
        let root_nr = fsfs_core::NodeRev::new_root(root_id.clone(), root_id.clone(), "/", Rev::ZERO);
        let mut history = HistoryIndex::new();
        history.record_node_rev(root_id.clone(), root_nr);
        history.record_path("/".to_string(), root_id.clone());
        history.record_dir_listing(root_id, BTreeMap::new());

        let rep_cache = RepCache::open(&layout)?;
        Ok(Repo { layout, registry: fsfs_concurrency::TxnRegistry::new(), rep_cache, config, history, youngest })
    }

    /// The cached youngest revision, updated by [`Repo::commit`]. The
    /// commit pipeline always re-reads `current` itself before trusting
    /// this (spec.md §5: readers must consult `current` exclusively).
    pub fn youngest(&self) -> Rev {
        self.youngest
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Begin(rev) (spec.md §4.6): starts a transaction based on the
    /// repository's current root.
    pub fn begin(&self) -> Result<Transaction> {
        let root_id = self.history.path_id("/").cloned().ok_or_else(|| Error::corrupt("history has no repository root"))?;
        let root_nr = self.history.get(&root_id).ok_or_else(|| Error::corrupt("history is missing the root node-rev"))?;
        Transaction::begin(&self.layout, self.youngest, root_id, root_nr, &self.history)
    }

    /// Abandons `txn`: drops the in-process registry record and deletes the
    /// transaction directory (spec.md §4.6 Abort).
    pub fn abort(&mut self, txn: Transaction) -> Result<()> {
        self.registry.purge(&txn.id);
        match std::fs::remove_dir_all(self.layout.txn_dir(&txn.id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Creates a directory at `path`, copy-on-writing every ancestor that
    /// isn't already mutable in this transaction.
    pub fn make_dir(&mut self, txn: &mut Transaction, path: &str) -> Result<()> {
        let (_, name) = split_parent(path).ok_or_else(|| Error::corrupt("cannot create the repository root"))?;
        let parent_id = tree::cow_path_to_parent(&mut txn.tree, &self.history, &txn.root_id, path, &mut txn.next_node_ctr)?;
        txn.persist_next_ids(&self.layout)?;

        if txn.tree.children_of(&parent_id).map(|c| c.contains_key(name)).unwrap_or(false) {
            return Err(Error::corrupt(format!("{path} already exists")));
        }

        let id = txn.reserve_node_id(&self.layout)?;
        let copy_root = txn.tree.node(&parent_id).map(|n| n.copy_root.rev).unwrap_or(txn.base_rev);
        let node = tree::new_fresh_node(id.clone(), id.clone(), NodeKind::Dir, path, copy_root);
        txn.tree.insert_node(id.clone(), node);
        txn.tree.link_child(&parent_id, name, id.clone(), path.to_string());

        txn.journal.append(&ChangeRecord {
            path: path.to_string(),
            kind: ChangeKind::Add,
            node_rev_id: Some(id),
            text_mod: false,
            prop_mod: false,
            copyfrom: None,
            node_kind: NodeKind::Dir,
        })?;
        Ok(())
    }

    /// Writes `content` as the full text of the file at `path`, creating it
    /// (and copy-on-writing ancestors) if it doesn't already exist in this
    /// transaction. The representation is written to the proto-rev
    /// immediately, per spec.md §4.2.
    pub fn set_file_contents(&mut self, txn: &mut Transaction, path: &str, content: &[u8]) -> Result<()> {
        let existing = txn.tree.id_at(path).cloned();
        let (file_id, change_kind) = match existing {
            Some(id) => (id, ChangeKind::Modify),
            None => {
                let (_, name) = split_parent(path).ok_or_else(|| Error::corrupt("cannot write content to the repository root"))?;
                let parent_id = tree::cow_path_to_parent(&mut txn.tree, &self.history, &txn.root_id, path, &mut txn.next_node_ctr)?;
                txn.persist_next_ids(&self.layout)?;

                let committed_id = self.history.path_id(path).cloned();
                let id = txn.reserve_node_id(&self.layout)?;
                let fresh = match &committed_id {
                    Some(cid) => {
                        let base = self.history.get(cid).ok_or_else(|| Error::corrupt("committed path has no history entry"))?;
                        base.derive_successor(id.clone())
                    }
                    None => {
                        let copy_root = txn.tree.node(&parent_id).map(|n| n.copy_root.rev).unwrap_or(txn.base_rev);
                        tree::new_fresh_node(id.clone(), id.clone(), NodeKind::File, path, copy_root)
                    }
                };
                txn.tree.insert_node(id.clone(), fresh);
                txn.tree.link_child(&parent_id, name, id.clone(), path.to_string());

                let kind = if committed_id.is_some() { ChangeKind::Modify } else { ChangeKind::Add };
                (id, kind)
            }
        };

        let predecessor_count = txn.tree.node(&file_id).map(|n| n.predecessor_count).unwrap_or(0);
        let new_rev_guess = txn.base_rev.next();
        let base = if predecessor_count == 0 {
            None
        } else {
            let source = EngineDeltaSource { tree: &txn.tree, history: &self.history };
            fsfs_durability::choose_delta_base(&source, &file_id, predecessor_count, new_rev_guess, false, self.config.delta_limits)?
        };
        let delta_base = match &base {
            Some(rep) => Some(DeltaBase { rep: rep.clone(), expanded_content: fsfs_durability::reconstruct(&self.layout, rep)? }),
            None => None,
        };

        let (proto_rev, cookie) = fsfs_concurrency::get_writable_proto_rev(&self.registry, &self.layout, &txn.id)?;
        let mut writer = RepresentationWriter::begin(proto_rev, txn.id.clone(), delta_base, None)?;
        writer.write(content);
        let outcome = writer.close(&self.layout, Some(&self.rep_cache), None, self.youngest, self.config.enable_rep_sharing)?;

        if !outcome.shared {
            let chain_len = tree::next_chain_length(&self.history, base.as_ref());
            txn.pending_chain_lengths.push((outcome.rep.offset, chain_len));
        }

        drop(outcome.proto_rev);
        fsfs_concurrency::unlock_proto_rev(cookie);

        txn.tree.node_mut(&file_id).expect("just inserted").data_rep = Some(outcome.rep);

        txn.journal.append(&ChangeRecord {
            path: path.to_string(),
            kind: change_kind,
            node_rev_id: Some(file_id),
            text_mod: true,
            prop_mod: false,
            copyfrom: None,
            node_kind: NodeKind::File,
        })?;
        Ok(())
    }

    /// Deletes `path`, copy-on-writing its parent directory.
    pub fn delete(&mut self, txn: &mut Transaction, path: &str) -> Result<()> {
        let (_, name) = split_parent(path).ok_or_else(|| Error::corrupt("cannot delete the repository root"))?;
        let existing_id = txn
            .tree
            .id_at(path)
            .cloned()
            .or_else(|| self.history.path_id(path).cloned())
            .ok_or_else(|| Error::corrupt(format!("{path} does not exist")))?;
        let node_kind = txn
            .tree
            .node(&existing_id)
            .map(|n| n.kind)
            .or_else(|| self.history.get(&existing_id).map(|n| n.kind))
            .unwrap_or(NodeKind::File);

        let parent_id = tree::cow_path_to_parent(&mut txn.tree, &self.history, &txn.root_id, path, &mut txn.next_node_ctr)?;
        txn.persist_next_ids(&self.layout)?;
        txn.tree.unlink_child(&parent_id, name);
        txn.tree.remove_path(path);

        txn.journal.append(&ChangeRecord {
            path: path.to_string(),
            kind: ChangeKind::Delete,
            node_rev_id: Some(existing_id),
            text_mod: false,
            prop_mod: false,
            copyfrom: None,
            node_kind,
        })?;
        Ok(())
    }

    /// Runs the full commit pipeline (spec.md §4.7) and returns the newly
    /// published revision.
    pub fn commit(&mut self, txn: Transaction) -> Result<Rev> {
        commit::run(
            &self.layout,
            &self.registry,
            &mut self.rep_cache,
            &self.config,
            &mut self.history,
            &mut self.youngest,
            txn,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_bootstraps_revision_zero() {
        let dir = tempdir().unwrap();
        let repo = Repo::create(dir.path(), RepoConfig::default()).unwrap();
        assert_eq!(repo.youngest(), Rev::ZERO);
        assert!(dir.path().join("revs/0/0").exists() || dir.path().join("revs/0").exists());
    }

    #[test]
    fn begin_then_abort_leaves_no_txn_directory() {
        let dir = tempdir().unwrap();
        let mut repo = Repo::create(dir.path(), RepoConfig::default()).unwrap();
        let txn = repo.begin().unwrap();
        let txn_dir = repo.layout().txn_dir(&txn.id);
        assert!(txn_dir.exists());
        repo.abort(txn).unwrap();
        assert!(!txn_dir.exists());
    }
}
