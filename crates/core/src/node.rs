//! Node revisions and representations — the units of versioning.

use crate::ids::{CopyId, NodeId, Rev};
use serde::{Deserialize, Serialize};

/// File or directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    File,
    Dir,
}

/// Where a representation's bytes currently live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepOrigin {
    /// Living in a transaction's proto-rev file, not yet committed.
    Mutable { txn_id: String },
    /// Committed: a fixed byte range inside `revs/<revision>`.
    Committed,
}

/// `{revision, offset, size, expanded_size, md5, sha1?, txn_id?, uniquifier?}`
/// from spec.md §3. A rep is *shared* when more than one [`NodeRev`]
/// references the same `(revision, offset)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rep {
    pub revision: Rev,
    pub offset: u64,
    pub size: u64,
    pub expanded_size: u64,
    pub md5: [u8; 16],
    pub sha1: Option<[u8; 20]>,
    pub origin: RepOrigin,
    /// `"<txn>/<seq>"`, present only while `origin` is `Mutable`; distinguishes
    /// otherwise-identical in-flight reps.
    pub uniquifier: Option<String>,
}

impl Rep {
    pub fn is_mutable(&self) -> bool {
        matches!(self.origin, RepOrigin::Mutable { .. })
    }

    pub fn txn_id(&self) -> Option<&str> {
        match &self.origin {
            RepOrigin::Mutable { txn_id } => Some(txn_id),
            RepOrigin::Committed => None,
        }
    }

    /// Promotes a mutable rep to a committed one at the given final
    /// `(revision, offset)`, as the commit pipeline does in spec.md §4.7 step 5.
    pub fn finalize(&mut self, revision: Rev, offset: u64) {
        self.revision = revision;
        self.offset = offset;
        self.origin = RepOrigin::Committed;
    }
}

/// `{path, kind, node_rev_id?, copy_from?}` identifying where a node was
/// created and, if copied, where from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyFrom {
    pub path: String,
    pub rev: Rev,
}

/// The unit of versioning for one node, per spec.md §3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRev {
    pub id: NodeId,
    pub copy_id: CopyId,
    pub kind: NodeKind,
    pub predecessor_id: Option<NodeId>,
    pub predecessor_count: u32,
    pub created_path: String,
    pub copy_from: Option<CopyFrom>,
    pub copy_root: CopyFrom,
    pub data_rep: Option<Rep>,
    pub prop_rep: Option<Rep>,
    pub fresh_txn_root: bool,
}

impl NodeRev {
    /// A brand new node-rev with no predecessor (predecessor_count == 0).
    pub fn new_root(id: NodeId, copy_id: CopyId, path: &str, copy_root_rev: Rev) -> Self {
        NodeRev {
            id,
            copy_id,
            kind: NodeKind::Dir,
            predecessor_id: None,
            predecessor_count: 0,
            created_path: path.to_string(),
            copy_from: None,
            copy_root: CopyFrom {
                path: path.to_string(),
                rev: copy_root_rev,
            },
            data_rep: None,
            prop_rep: None,
            fresh_txn_root: false,
        }
    }

    /// Derives the txn's mutable successor of `self` (used by `begin` and by
    /// copy-on-write node mutation), bumping predecessor bookkeeping per
    /// spec.md §4.6 step 3.
    pub fn derive_successor(&self, new_id: NodeId) -> Self {
        NodeRev {
            id: new_id,
            copy_id: self.copy_id.clone(),
            kind: self.kind,
            predecessor_id: Some(self.id.clone()),
            predecessor_count: self.predecessor_count + 1,
            created_path: self.created_path.clone(),
            copy_from: None,
            copy_root: self.copy_root.clone(),
            data_rep: self.data_rep.clone(),
            prop_rep: self.prop_rep.clone(),
            fresh_txn_root: false,
        }
    }
}
