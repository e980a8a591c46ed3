//! The mutable node/directory tree a transaction edits.
//!
//! spec.md §1 names the node/directory tree traversal API as an external
//! collaborator this core does not implement. [`MutableTree`] and
//! [`HistoryIndex`] are this crate's minimal stand-in for that collaborator:
//! enough to drive the commit pipeline and delta-base selection end to end
//! without pretending to be a full working-copy-grade tree implementation.

use fsfs_core::path::split_parent;
use fsfs_core::{CopyFrom, Error, NodeId, NodeKind, NodeRev, Rep, Result, Rev};
use fsfs_durability::PredecessorSource;
use std::collections::{BTreeMap, HashMap};

/// The nodes and directory listings touched so far by one transaction,
/// keyed by each node's id *as of this transaction* (provisional for newly
/// copy-on-write'd nodes, permanent for anything untouched since `begin`).
#[derive(Debug, Default)]
pub struct MutableTree {
    nodes: HashMap<NodeId, NodeRev>,
    children: HashMap<NodeId, BTreeMap<String, NodeId>>,
    paths: HashMap<String, NodeId>,
}

impl MutableTree {
    pub fn new() -> Self {
        MutableTree::default()
    }

    pub fn set_root(&mut self, root_id: NodeId, root: NodeRev) {
        self.paths.insert("/".to_string(), root_id.clone());
        self.children.entry(root_id.clone()).or_default();
        self.nodes.insert(root_id, root);
    }

    pub fn node(&self, id: &NodeId) -> Option<&NodeRev> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut NodeRev> {
        self.nodes.get_mut(id)
    }

    pub fn id_at(&self, path: &str) -> Option<&NodeId> {
        self.paths.get(path)
    }

    pub fn children_of(&self, dir_id: &NodeId) -> Option<&BTreeMap<String, NodeId>> {
        self.children.get(dir_id)
    }

    /// Inserts or replaces `name` in `dir_id`'s listing. `dir_id` must
    /// already be a mutable node in this tree, and `child_id` must already
    /// have been registered via [`MutableTree::insert_node`] (copy-on-write
    /// happens in the caller before this is reached).
    pub fn link_child(&mut self, dir_id: &NodeId, name: &str, child_id: NodeId, child_path: String) {
        self.children.entry(dir_id.clone()).or_default().insert(name.to_string(), child_id.clone());
        self.paths.insert(child_path, child_id);
    }

    pub fn insert_node(&mut self, id: NodeId, rev: NodeRev) {
        self.nodes.insert(id, rev);
    }

    /// Seeds `dir_id`'s listing from a prior commit's entries, so mutations
    /// within this transaction merge with (rather than replace) the
    /// directory's existing children. Must run before any [`Self::link_child`]
    /// calls against `dir_id`.
    pub fn seed_children(&mut self, dir_id: &NodeId, listing: BTreeMap<String, NodeId>) {
        self.children.insert(dir_id.clone(), listing);
    }

    pub fn unlink_child(&mut self, dir_id: &NodeId, name: &str) -> Option<NodeId> {
        self.children.get_mut(dir_id).and_then(|c| c.remove(name))
    }

    pub fn remove_path(&mut self, path: &str) {
        self.paths.remove(path);
    }

    /// Every (path, id) pair currently live in this tree, used by the
    /// commit walk to find mutable directories and files.
    pub fn paths(&self) -> impl Iterator<Item = (&str, &NodeId)> {
        self.paths.iter().map(|(p, id)| (p.as_str(), id))
    }
}

/// Committed node-revs and delta-chain lengths this process has observed,
/// keyed by permanent id. A real deployment reads this off disk through the
/// tree-traversal collaborator; here it is an in-memory record built up as
/// commits land, which is sufficient to exercise skip-delta selection
/// (spec.md §4.3) across multiple commits within one process lifetime.
#[derive(Debug, Default)]
pub struct HistoryIndex {
    node_revs: HashMap<NodeId, NodeRev>,
    chain_lengths: HashMap<(u64, u64), u32>,
    /// Latest permanent id at each live path, as of the last commit this
    /// process made. Stands in for the directory-listing reads a full
    /// tree-traversal collaborator would otherwise serve.
    committed_paths: HashMap<String, NodeId>,
    /// Full entries map for every directory this process has committed,
    /// keyed by permanent id.
    dir_listings: HashMap<NodeId, BTreeMap<String, NodeId>>,
}

impl HistoryIndex {
    pub fn new() -> Self {
        HistoryIndex::default()
    }

    pub fn record_node_rev(&mut self, id: NodeId, rev: NodeRev) {
        self.node_revs.insert(id, rev);
    }

    pub fn record_chain_length(&mut self, rep: &Rep, len: u32) {
        self.chain_lengths.insert((rep.revision.0, rep.offset), len);
    }

    pub fn get(&self, id: &NodeId) -> Option<&NodeRev> {
        self.node_revs.get(id)
    }

    pub fn path_id(&self, path: &str) -> Option<&NodeId> {
        self.committed_paths.get(path)
    }

    pub fn dir_listing(&self, dir_id: &NodeId) -> Option<&BTreeMap<String, NodeId>> {
        self.dir_listings.get(dir_id)
    }

    /// Records `path`'s latest permanent id and, for a directory, its full
    /// entries map, after a successful commit.
    pub fn record_path(&mut self, path: String, id: NodeId) {
        self.committed_paths.insert(path, id);
    }

    pub fn record_dir_listing(&mut self, dir_id: NodeId, listing: BTreeMap<String, NodeId>) {
        self.dir_listings.insert(dir_id, listing);
    }

    /// Drops `path` and every proper descendant from the committed-path
    /// index, mirroring a delete/replace landing in history.
    pub fn forget_path_prefix(&mut self, path: &str) {
        self.committed_paths.retain(|p, _| !fsfs_core::path::is_self_or_child(path, p));
    }
}

/// Bridges [`MutableTree`] (for the node currently being written, still
/// provisional) and [`HistoryIndex`] (for everything already committed)
/// into the `durability` crate's [`PredecessorSource`] seam.
pub struct EngineDeltaSource<'a> {
    pub tree: &'a MutableTree,
    pub history: &'a HistoryIndex,
}

impl PredecessorSource for EngineDeltaSource<'_> {
    fn predecessor_rep(&self, start: &NodeId, steps_back: u32, want_props: bool) -> Result<Option<Rep>> {
        if steps_back == 0 {
            return Ok(None);
        }
        let mut current_id = match self.tree.node(start) {
            Some(nr) => nr.predecessor_id.clone(),
            None => return Ok(None),
        };
        let mut remaining = steps_back - 1;
        loop {
            let Some(id) = current_id else { return Ok(None) };
            let Some(nr) = self.history.get(&id) else { return Ok(None) };
            if remaining == 0 {
                return Ok(if want_props { nr.prop_rep.clone() } else { nr.data_rep.clone() });
            }
            current_id = nr.predecessor_id.clone();
            remaining -= 1;
        }
    }

    fn chain_length(&self, rep: &Rep) -> Result<u32> {
        Ok(*self.history.chain_lengths.get(&(rep.revision.0, rep.offset)).unwrap_or(&0))
    }
}

/// Derives a chain length for a freshly-chosen base: one more than the
/// base's own chain length if the base is itself a delta, else 1 (a fresh
/// self-delta base starts a new chain of length 1).
pub fn next_chain_length(history: &HistoryIndex, base: Option<&Rep>) -> u32 {
    match base {
        Some(rep) => *history.chain_lengths.get(&(rep.revision.0, rep.offset)).unwrap_or(&0) + 1,
        None => 0,
    }
}

/// A fresh node-rev for a brand-new node (no predecessor), created at
/// `path` under copy-root `copy_root`.
pub fn new_fresh_node(id: NodeId, copy_id: NodeId, kind: NodeKind, path: &str, copy_root: Rev) -> NodeRev {
    NodeRev {
        id,
        copy_id,
        kind,
        predecessor_id: None,
        predecessor_count: 0,
        created_path: path.to_string(),
        copy_from: None,
        copy_root: CopyFrom { path: path.to_string(), rev: copy_root },
        data_rep: None,
        prop_rep: None,
        fresh_txn_root: false,
    }
}

/// Ensures every ancestor directory of `path` has a mutable (copy-on-write)
/// node-rev in `tree`, creating missing intermediate directories or, when a
/// directory already exists from a prior commit, copy-on-writing it via
/// [`NodeRev::derive_successor`] and seeding its listing so mutations merge
/// with rather than replace its existing entries. Returns the mutable id of
/// `path`'s immediate parent directory.
pub fn cow_path_to_parent(
    tree: &mut MutableTree,
    history: &HistoryIndex,
    root_id: &NodeId,
    path: &str,
    next_node_ctr: &mut u64,
) -> Result<NodeId> {
    let Some((parent, _name)) = split_parent(path) else {
        return Err(Error::corrupt("cannot compute parent of the repository root"));
    };

    let mut segments: Vec<&str> = Vec::new();
    let mut cur = parent;
    loop {
        if tree.id_at(cur).is_some() {
            break;
        }
        segments.push(cur);
        match split_parent(cur) {
            Some((p, _)) => cur = p,
            None => break,
        }
    }
    segments.reverse();

    let mut cur_id = tree.id_at(cur).cloned().unwrap_or_else(|| root_id.clone());
    for seg_path in segments {
        let (seg_parent, seg_name) = split_parent(seg_path).expect("non-root segment has a parent");
        debug_assert_eq!(tree.id_at(seg_parent).cloned(), Some(cur_id.clone()));
        let new_ctr = *next_node_ctr;
        *next_node_ctr += 1;
        let new_id = NodeId::provisional(&fsfs_core::ids::to_base36(new_ctr));

        let committed = history.path_id(seg_path).cloned();
        let fresh = match &committed {
            Some(committed_id) => {
                let base = history
                    .get(committed_id)
                    .ok_or_else(|| Error::corrupt("committed path has no history entry"))?;
                base.derive_successor(new_id.clone())
            }
            None => {
                let parent_rev = tree.node(&cur_id).ok_or_else(|| Error::corrupt("missing parent node while walking path"))?;
                new_fresh_node(new_id.clone(), new_id.clone(), NodeKind::Dir, seg_path, parent_rev.copy_root.rev)
            }
        };
        tree.insert_node(new_id.clone(), fresh);
        if let Some(committed_id) = &committed {
            if let Some(listing) = history.dir_listing(committed_id) {
                tree.seed_children(&new_id, listing.clone());
            }
        }
        tree.link_child(&cur_id, seg_name, new_id.clone(), seg_path.to_string());
        cur_id = new_id;
    }
    Ok(cur_id)
}

/// Serializes a directory's entries map into the bytes written as its
/// data-rep content. Text framing mirrors the rest of this core's on-disk
/// formats (revision trailers, rep headers): one `name\0id\n` line per
/// entry, sorted by name for determinism.
pub fn encode_entries(listing: &BTreeMap<String, NodeId>) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, id) in listing {
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.extend_from_slice(id.to_string().as_bytes());
        out.push(b'\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsfs_core::NodeKind;

    #[test]
    fn cow_path_to_parent_creates_missing_intermediate_directories() {
        let mut tree = MutableTree::new();
        let history = HistoryIndex::new();
        let root_id = NodeId::provisional("0");
        tree.set_root(root_id.clone(), new_fresh_node(root_id.clone(), root_id.clone(), NodeKind::Dir, "/", Rev::ZERO));

        let mut ctr = 1u64;
        let parent = cow_path_to_parent(&mut tree, &history, &root_id, "/a/b/c", &mut ctr).unwrap();
        assert_eq!(tree.id_at("/a"), Some(&tree.children_of(&root_id).unwrap()["a"]));
        assert_eq!(tree.id_at("/a/b"), Some(&parent));
    }
}
