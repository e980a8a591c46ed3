//! Path-lock verification (spec.md §4.8): before a commit is allowed to
//! touch a path, the committer's held locks must cover it.

use fsfs_core::{ChangeKind, ChangeRecord, Error, Result};
use fsfs_core::path::is_self_or_child;
use std::collections::BTreeSet;

/// Checks every changed path against the set of paths the committer holds
/// locks on. `modify` only ever needs the exact path locked; `add`,
/// `delete` and `replace` need the path and everything beneath it, since
/// those operations can destroy or create locked descendants. Once a
/// recursive check passes for a path, its descendants in `changes` are
/// skipped — they cannot be locked without the ancestor also being locked
/// (spec.md §4.8 step 3).
pub fn check_locks(changes: &[ChangeRecord], held_locks: &BTreeSet<String>) -> Result<()> {
    let mut covered_prefixes: Vec<&str> = Vec::new();

    let mut sorted: Vec<&ChangeRecord> = changes.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    for change in sorted {
        if covered_prefixes.iter().any(|p| is_self_or_child(p, &change.path)) {
            continue;
        }

        let needs_recursive = matches!(change.kind, ChangeKind::Add | ChangeKind::Delete | ChangeKind::Replace);
        if needs_recursive {
            check_recursive(&change.path, held_locks)?;
            covered_prefixes.push(&change.path);
        } else if !held_locks.contains(&change.path) {
            return Err(Error::PathLocked(change.path.clone()));
        }
    }
    Ok(())
}

/// A recursive check only needs to confirm the path itself is locked: a
/// lock on a directory in this core's model always implies its subtree, so
/// there is nothing further on disk to walk (spec.md §4.8).
fn check_recursive(path: &str, held_locks: &BTreeSet<String>) -> Result<()> {
    if held_locks.contains(path) {
        Ok(())
    } else {
        Err(Error::PathLocked(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsfs_core::{NodeId, NodeKind};

    fn rec(path: &str, kind: ChangeKind) -> ChangeRecord {
        ChangeRecord {
            path: path.to_string(),
            kind,
            node_rev_id: Some(NodeId::Provisional("_1".to_string())),
            text_mod: true,
            prop_mod: false,
            copyfrom: None,
            node_kind: NodeKind::File,
        }
    }

    #[test]
    fn modify_needs_exact_path_locked() {
        let changes = vec![rec("/a/b", ChangeKind::Modify)];
        let mut locks = BTreeSet::new();
        assert!(check_locks(&changes, &locks).is_err());
        locks.insert("/a/b".to_string());
        assert!(check_locks(&changes, &locks).is_ok());
    }

    #[test]
    fn modify_is_not_satisfied_by_a_parent_lock() {
        let changes = vec![rec("/a/b", ChangeKind::Modify)];
        let mut locks = BTreeSet::new();
        locks.insert("/a".to_string());
        assert!(check_locks(&changes, &locks).is_err());
    }

    #[test]
    fn delete_of_a_directory_is_satisfied_by_locking_the_directory_itself() {
        let changes = vec![rec("/a", ChangeKind::Delete), rec("/a/b", ChangeKind::Delete)];
        let mut locks = BTreeSet::new();
        locks.insert("/a".to_string());
        assert!(check_locks(&changes, &locks).is_ok());
    }

    #[test]
    fn add_without_any_lock_fails() {
        let changes = vec![rec("/new", ChangeKind::Add)];
        let locks = BTreeSet::new();
        assert!(matches!(check_locks(&changes, &locks), Err(Error::PathLocked(_))));
    }
}
