//! Changed-path records, per spec.md §3 and §4.5.

use crate::ids::{NodeId, Rev};
use crate::node::NodeKind;

/// The kind of a single changed-path record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Delete,
    Replace,
    Modify,
    Reset,
}

/// One entry in the changed-paths journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub path: String,
    pub kind: ChangeKind,
    pub node_rev_id: Option<NodeId>,
    pub text_mod: bool,
    pub prop_mod: bool,
    pub copyfrom: Option<(String, Rev)>,
    pub node_kind: NodeKind,
}

impl ChangeRecord {
    pub fn reset(path: impl Into<String>) -> Self {
        ChangeRecord {
            path: path.into(),
            kind: ChangeKind::Reset,
            node_rev_id: None,
            text_mod: false,
            prop_mod: false,
            copyfrom: None,
            node_kind: NodeKind::File,
        }
    }
}
