//! Node-revision record framing written into proto-rev/revision files.
//!
//! spec.md §1 names the node-revision serializer as an external collaborator
//! this core does not implement; §6 calls its wire shape "what the companion
//! low-level serializer emits" and says this core only needs to treat it
//! opaquely. This module is the minimal textual placeholder that keeps
//! `root_offset` and a node-rev's own offset well-defined on disk without
//! reproducing that serializer — nothing in this crate parses these records
//! back, since reading a historical tree belongs to that same out-of-scope
//! collaborator.

use fsfs_core::{NodeRev, Rep};
use std::io::{self, Write};

pub fn write_placeholder(w: &mut impl Write, nr: &NodeRev) -> io::Result<()> {
    writeln!(w, "id: {}", nr.id)?;
    writeln!(w, "kind: {:?}", nr.kind)?;
    writeln!(w, "pred-count: {}", nr.predecessor_count)?;
    if let Some(pred) = &nr.predecessor_id {
        writeln!(w, "pred-id: {pred}")?;
    }
    writeln!(w, "cpath: {}", nr.created_path)?;
    if let Some(copy_from) = &nr.copy_from {
        writeln!(w, "copyfrom: {}@{}", copy_from.path, copy_from.rev.0)?;
    }
    if let Some(rep) = &nr.data_rep {
        write_rep_line(w, "text", rep)?;
    }
    if let Some(rep) = &nr.prop_rep {
        write_rep_line(w, "props", rep)?;
    }
    writeln!(w, "END")
}

fn write_rep_line(w: &mut impl Write, tag: &str, rep: &Rep) -> io::Result<()> {
    writeln!(
        w,
        "{tag}: {} {} {} {} {}",
        rep.revision.0,
        rep.offset,
        rep.size,
        rep.expanded_size,
        hex_encode(&rep.md5)
    )
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
