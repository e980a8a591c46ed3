//! Transaction lifecycle (spec.md §4.6): creating a per-txn workspace,
//! deriving the txn's mutable root, reserving node/copy ids, and tearing
//! the workspace down on abort.

use crate::tree::{HistoryIndex, MutableTree};
use chrono::Utc;
use fsfs_core::ids::to_base36;
use fsfs_core::{NodeId, NodeRev, Result, Rev, TxnId};
use fsfs_storage::{ChangesJournalWriter, Layout, PropHash};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;

/// An in-progress transaction: the mutable tree it has built up so far, its
/// id-allocation counters, and its per-txn property hash. Dropped without
/// calling [`crate::repo::Repo::abort`] or
/// [`crate::repo::Repo::commit`] leaks the on-disk `txns/<id>.txn/`
/// directory, exactly as an unclean process exit would in spec.md §4.6.
pub struct Transaction {
    pub id: TxnId,
    pub base_rev: Rev,
    pub(crate) tree: MutableTree,
    pub(crate) root_id: NodeId,
    pub(crate) base_root_id: NodeId,
    pub(crate) next_node_ctr: u64,
    pub(crate) next_copy_ctr: u64,
    pub props: PropHash,
    pub(crate) journal: ChangesJournalWriter,
    pub held_locks: BTreeSet<String>,
    /// `(offset, chain_length)` recorded for every literal file rep written
    /// during this transaction, so the commit walk can seed
    /// [`HistoryIndex`]'s chain-length table without re-deriving it from a
    /// rep it can no longer see the delta base of (spec.md §4.3, §4.2).
    pub(crate) pending_chain_lengths: Vec<(u64, u32)>,
}

impl Transaction {
    /// Begin(rev) (spec.md §4.6): allocates a sequence number, creates the
    /// transaction directory, and derives the txn's mutable root from
    /// `base_root`.
    pub fn begin(
        layout: &Layout,
        base_rev: Rev,
        base_root_id: NodeId,
        base_root: &NodeRev,
        history: &HistoryIndex,
    ) -> Result<Self> {
        let seq = fsfs_concurrency::next_txn_seq(layout)?;
        let id = TxnId::new(base_rev, seq);

        let txn_dir = layout.txn_dir(&id);
        fs::create_dir_all(&txn_dir)?;
        fs::write(layout.txn_next_ids_file(&id), b"0 0\n")?;
        let journal = ChangesJournalWriter::create(&layout.txn_changes_file(&id))?;

        let mut next_node_ctr = 0u64;
        let root_ctr = next_node_ctr;
        next_node_ctr += 1;
        let root_id = NodeId::provisional(&to_base36(root_ctr));
        let mut root = base_root.derive_successor(root_id.clone());
        root.fresh_txn_root = true;

        let mut tree = MutableTree::new();
        tree.set_root(root_id.clone(), root);
        if let Some(listing) = history.dir_listing(&base_root_id) {
            tree.seed_children(&root_id, listing.clone());
        }

        let mut props = PropHash::new();
        props.set_str("svn:date", Utc::now().to_rfc3339());

        Ok(Transaction {
            id,
            base_rev,
            tree,
            root_id,
            base_root_id,
            next_node_ctr,
            next_copy_ctr: 0,
            props,
            journal,
            held_locks: BTreeSet::new(),
            pending_chain_lengths: Vec::new(),
        })
    }

    /// Reserves the next node id, persisting the advance to `next-ids`
    /// before returning (spec.md §4.6 "Reserve node/copy ids").
    pub(crate) fn reserve_node_id(&mut self, layout: &Layout) -> Result<NodeId> {
        let ctr = self.next_node_ctr;
        self.next_node_ctr += 1;
        self.persist_next_ids(layout)?;
        Ok(NodeId::provisional(&to_base36(ctr)))
    }

    pub(crate) fn reserve_copy_id(&mut self, layout: &Layout) -> Result<NodeId> {
        let ctr = self.next_copy_ctr;
        self.next_copy_ctr += 1;
        self.persist_next_ids(layout)?;
        Ok(NodeId::provisional(&to_base36(ctr)))
    }

    pub(crate) fn persist_next_ids(&self, layout: &Layout) -> Result<()> {
        let mut f = fs::File::create(layout.txn_next_ids_file(&self.id))?;
        write!(f, "{} {}\n", to_base36(self.next_node_ctr), to_base36(self.next_copy_ctr))?;
        Ok(())
    }

    pub fn root_id(&self) -> &NodeId {
        &self.root_id
    }
}
