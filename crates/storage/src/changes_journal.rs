//! The append-only changed-paths journal and its fold operation
//! (spec.md §4.5).

use fsfs_core::path::is_child;
use fsfs_core::{ChangeKind, ChangeRecord, Error, Result};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Appends one record to a transaction's `changes` file. The on-disk record
/// encoding is owned by the node-revision serializer named as an external
/// collaborator in spec.md §1; here we use a simple length-prefixed encoding
/// since this crate treats the format opaquely beyond the fold rules.
pub struct ChangesJournalWriter {
    file: BufWriter<File>,
}

impl ChangesJournalWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(ChangesJournalWriter { file: BufWriter::new(file) })
    }

    pub fn append(&mut self, change: &ChangeRecord) -> Result<()> {
        encode_record(&mut self.file, change)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

fn kind_tag(kind: ChangeKind) -> u8 {
    match kind {
        ChangeKind::Add => b'a',
        ChangeKind::Delete => b'd',
        ChangeKind::Replace => b'r',
        ChangeKind::Modify => b'm',
        ChangeKind::Reset => b'x',
    }
}

fn tag_kind(tag: u8) -> Result<ChangeKind> {
    Ok(match tag {
        b'a' => ChangeKind::Add,
        b'd' => ChangeKind::Delete,
        b'r' => ChangeKind::Replace,
        b'm' => ChangeKind::Modify,
        b'x' => ChangeKind::Reset,
        other => return Err(Error::corrupt(format!("unknown change tag {other:#x}"))),
    })
}

fn encode_record(w: &mut impl Write, c: &ChangeRecord) -> io::Result<()> {
    write!(w, "{}\0{}\0", kind_tag(c.kind) as char, c.path)?;
    match &c.node_rev_id {
        Some(id) => write!(w, "{id}\0")?,
        None => write!(w, "\0")?,
    }
    write!(w, "{}{}\0", c.text_mod as u8, c.prop_mod as u8)?;
    match &c.copyfrom {
        Some((path, rev)) => write!(w, "{}@{}\0", path, rev.0)?,
        None => write!(w, "\0")?,
    }
    writeln!(w)
}

/// Writes the folded changed-paths block into a revision file, in path
/// order, using the same record encoding as the per-txn journal (spec.md
/// §4.7 step 6). The revision file's copy is a one-shot snapshot, not an
/// appendable journal, but the wire shape is shared.
pub fn write_folded(w: &mut impl Write, folded: &BTreeMap<String, ChangeRecord>) -> Result<()> {
    for change in folded.values() {
        encode_record(w, change)?;
    }
    Ok(())
}

/// Reads every record appended so far, in order.
pub fn read_all(path: &Path) -> Result<Vec<ChangeRecord>> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut out = Vec::new();
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        out.push(decode_record(line)?);
    }
    Ok(out)
}

fn decode_record(line: &str) -> Result<ChangeRecord> {
    let mut fields = line.splitn(6, '\0');
    let kind_field = fields.next().ok_or_else(|| Error::corrupt("missing kind field"))?;
    let kind = tag_kind(kind_field.as_bytes().first().copied().unwrap_or(0))?;
    let path = fields.next().ok_or_else(|| Error::corrupt("missing path field"))?.to_string();
    let node_rev_id = fields.next().filter(|s| !s.is_empty()).map(|s| fsfs_core::NodeId::Provisional(s.to_string()));
    let flags = fields.next().ok_or_else(|| Error::corrupt("missing flags field"))?;
    let mut flag_bytes = flags.bytes();
    let text_mod = flag_bytes.next() == Some(b'1');
    let prop_mod = flag_bytes.next() == Some(b'1');
    let copyfrom_field = fields.next().unwrap_or("");
    let copyfrom = if copyfrom_field.is_empty() {
        None
    } else {
        let (p, r) = copyfrom_field
            .rsplit_once('@')
            .ok_or_else(|| Error::corrupt("malformed copyfrom field"))?;
        let rev = r.parse::<u64>().map_err(|_| Error::corrupt("malformed copyfrom revision"))?;
        Some((p.to_string(), fsfs_core::Rev(rev)))
    };
    Ok(ChangeRecord {
        path,
        kind,
        node_rev_id,
        text_mod,
        prop_mod,
        copyfrom,
        node_kind: fsfs_core::NodeKind::File,
    })
}

/// Folds an ordered change journal into the canonical per-path map
/// (spec.md §4.5). Idempotent: `fold(fold(records)) == fold(records)`
/// because folding an already-folded journal replays each kind's merge
/// rule against itself as a no-op.
pub fn fold(records: &[ChangeRecord]) -> Result<BTreeMap<String, ChangeRecord>> {
    let mut map: BTreeMap<String, ChangeRecord> = BTreeMap::new();
    for record in records {
        apply_one(&mut map, record.clone())?;
    }
    Ok(map)
}

fn apply_one(map: &mut BTreeMap<String, ChangeRecord>, new: ChangeRecord) -> Result<()> {
    if new.node_rev_id.is_none() && new.kind != ChangeKind::Reset {
        return Err(Error::corrupt(format!("change at {:?} has no node-rev id", new.path)));
    }

    match new.kind {
        ChangeKind::Reset => {
            map.remove(&new.path);
            return Ok(());
        }
        ChangeKind::Delete => {
            if let Some(prior) = map.get(&new.path) {
                if prior.kind == ChangeKind::Add {
                    map.remove(&new.path);
                    remove_children(map, &new.path);
                    return Ok(());
                }
                if prior.kind == ChangeKind::Delete {
                    return Err(Error::InvalidChangeOrdering(format!(
                        "delete of {:?} after delete with no intervening add",
                        new.path
                    )));
                }
                check_same_node(prior, &new)?;
                let path = new.path.clone();
                let mut promoted = prior.clone();
                promoted.kind = ChangeKind::Delete;
                promoted.copyfrom = None;
                promoted.node_rev_id = new.node_rev_id;
                map.insert(path.clone(), promoted);
                remove_children(map, &path);
            } else {
                let path = new.path.clone();
                map.insert(path.clone(), new);
                remove_children(map, &path);
            }
        }
        ChangeKind::Add | ChangeKind::Replace => {
            if let Some(prior) = map.get(&new.path) {
                if prior.kind != ChangeKind::Delete {
                    return Err(Error::InvalidChangeOrdering(format!(
                        "add/replace of {:?} over existing non-deleted change",
                        new.path
                    )));
                }
                let path = new.path.clone();
                let mut promoted = new;
                promoted.kind = ChangeKind::Replace;
                map.insert(path.clone(), promoted);
                remove_children(map, &path);
            } else {
                let path = new.path.clone();
                map.insert(path, new);
            }
        }
        ChangeKind::Modify => {
            if let Some(prior) = map.get_mut(&new.path) {
                if prior.kind == ChangeKind::Delete {
                    return Err(Error::InvalidChangeOrdering(format!(
                        "modify of {:?} after delete with no intervening add",
                        new.path
                    )));
                }
                check_same_node(prior, &new)?;
                prior.text_mod |= new.text_mod;
                prior.prop_mod |= new.prop_mod;
            } else {
                map.insert(new.path.clone(), new);
            }
        }
    }
    Ok(())
}

fn check_same_node(prior: &ChangeRecord, new: &ChangeRecord) -> Result<()> {
    if prior.kind != ChangeKind::Delete && prior.node_rev_id != new.node_rev_id {
        return Err(Error::corrupt(format!(
            "node-rev id changed for {:?} without an intervening delete",
            new.path
        )));
    }
    Ok(())
}

/// Removes every entry whose path is a proper child of `folded_path`,
/// narrowing the scan to the lexicographic range under `folded_path` rather
/// than a full O(n) pass, per spec.md §4.5's sorted-tree suggestion.
fn remove_children(map: &mut BTreeMap<String, ChangeRecord>, folded_path: &str) {
    let prefix = if folded_path.ends_with('/') {
        folded_path.to_string()
    } else {
        format!("{folded_path}/")
    };
    let upper = {
        let mut bytes = prefix.clone().into_bytes();
        *bytes.last_mut().unwrap() += 1;
        String::from_utf8(bytes).unwrap()
    };
    let doomed: Vec<String> = map
        .range(prefix.clone()..upper)
        .map(|(k, _)| k.clone())
        .filter(|k| is_child(folded_path, k))
        .collect();
    for k in doomed {
        map.remove(&k);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsfs_core::{NodeId, NodeKind, Rev};

    fn rec(path: &str, kind: ChangeKind, id: &str) -> ChangeRecord {
        ChangeRecord {
            path: path.to_string(),
            kind,
            node_rev_id: Some(NodeId::Provisional(id.to_string())),
            text_mod: kind == ChangeKind::Modify,
            prop_mod: false,
            copyfrom: None,
            node_kind: NodeKind::File,
        }
    }

    #[test]
    fn add_modify_delete_add_folds_to_replace() {
        let records = vec![
            rec("/x", ChangeKind::Add, "_1"),
            rec("/x", ChangeKind::Modify, "_1"),
            rec("/x", ChangeKind::Delete, "_1"),
            rec("/x", ChangeKind::Add, "_2"),
        ];
        let folded = fold(&records).unwrap();
        let entry = &folded["/x"];
        assert_eq!(entry.kind, ChangeKind::Replace);
        assert!(!entry.text_mod);
        assert!(!entry.prop_mod);
    }

    #[test]
    fn delete_of_directory_drops_descendants() {
        let records = vec![
            rec("/d", ChangeKind::Add, "_1"),
            rec("/d/f", ChangeKind::Add, "_2"),
            rec("/d", ChangeKind::Delete, "_1"),
        ];
        let folded = fold(&records).unwrap();
        assert!(folded.is_empty());
    }

    #[test]
    fn fold_is_idempotent() {
        let records = vec![
            rec("/x", ChangeKind::Add, "_1"),
            rec("/x", ChangeKind::Modify, "_1"),
        ];
        let once = fold(&records).unwrap();
        let replayed: Vec<ChangeRecord> = once.values().cloned().collect();
        let twice = fold(&replayed).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn modify_after_delete_is_invalid_ordering() {
        let records = vec![
            rec("/x", ChangeKind::Add, "_1"),
            rec("/x", ChangeKind::Delete, "_1"),
            rec("/x", ChangeKind::Modify, "_1"),
        ];
        assert!(matches!(fold(&records), Err(Error::InvalidChangeOrdering(_))));
    }

    #[test]
    fn delete_after_delete_is_invalid_ordering() {
        let records = vec![
            rec("/x", ChangeKind::Modify, "_1"),
            rec("/x", ChangeKind::Delete, "_1"),
            rec("/x", ChangeKind::Delete, "_1"),
        ];
        assert!(matches!(fold(&records), Err(Error::InvalidChangeOrdering(_))));
    }

    #[test]
    fn add_over_existing_non_deleted_is_invalid_ordering() {
        let records = vec![rec("/x", ChangeKind::Add, "_1"), rec("/x", ChangeKind::Add, "_2")];
        assert!(matches!(fold(&records), Err(Error::InvalidChangeOrdering(_))));
    }

    #[test]
    fn reset_removes_any_prior_state() {
        let records = vec![
            rec("/x", ChangeKind::Add, "_1"),
            ChangeRecord::reset("/x"),
        ];
        let folded = fold(&records).unwrap();
        assert!(folded.is_empty());
    }
}
