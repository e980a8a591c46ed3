//! The `current` pointer: the single linearization point that publishes a
//! new revision (spec.md §4.7 step 14, §5).

use crate::layout::Layout;
use fsfs_core::{Error, Rev, Result};
use std::fs;
use std::io::Write;
use tracing::debug;

/// Whether `current` holds just the revision number (modern) or also the
/// legacy per-repo node/copy id counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentFormat {
    Modern,
    Legacy,
}

/// The parsed contents of `current` in legacy format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyCounters {
    pub next_node_id: u64,
    pub next_copy_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentContents {
    Modern(Rev),
    Legacy(Rev, LegacyCounters),
}

impl CurrentContents {
    pub fn rev(&self) -> Rev {
        match self {
            CurrentContents::Modern(r) => *r,
            CurrentContents::Legacy(r, _) => *r,
        }
    }
}

/// Reads the youngest revision from `current`. Per spec.md §5, readers must
/// consult this exclusively for "youngest"; directory listings are not a
/// valid substitute.
pub fn read_current(layout: &Layout) -> Result<CurrentContents> {
    let text = fs::read_to_string(layout.current_file())?;
    parse_current(&text)
}

fn parse_current(text: &str) -> Result<CurrentContents> {
    let mut parts = text.trim_end().split_ascii_whitespace();
    let rev = parts
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Rev)
        .ok_or_else(|| Error::corrupt("current file missing revision"))?;
    match (parts.next(), parts.next()) {
        (Some(node), Some(copy)) => {
            let next_node_id = node.parse::<u64>().map_err(|_| Error::corrupt("bad next_node_id in current"))?;
            let next_copy_id = copy.parse::<u64>().map_err(|_| Error::corrupt("bad next_copy_id in current"))?;
            Ok(CurrentContents::Legacy(rev, LegacyCounters { next_node_id, next_copy_id }))
        }
        (None, None) => Ok(CurrentContents::Modern(rev)),
        _ => Err(Error::corrupt("malformed current file")),
    }
}

/// Atomically rewrites `current` via write-to-temp + rename (spec.md §4.7
/// step 14, I4). Must only be called by the commit pipeline while holding
/// the repo write lock.
pub fn bump_current(layout: &Layout, contents: &CurrentContents) -> Result<()> {
    let body = match contents {
        CurrentContents::Modern(rev) => format!("{}\n", rev.0),
        CurrentContents::Legacy(rev, counters) => {
            format!("{} {} {}\n", rev.0, counters.next_node_id, counters.next_copy_id)
        }
    };
    let tmp_path = layout.current_file().with_extension("tmp");
    {
        let mut tmp = fs::File::create(&tmp_path)?;
        tmp.write_all(body.as_bytes())?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, layout.current_file())?;
    debug!(rev = contents.rev().0, "bumped current");
    Ok(())
}

/// Initializes a brand-new repository's `current` file at revision 0.
pub fn init_current(layout: &Layout, format: CurrentFormat) -> Result<()> {
    let contents = match format {
        CurrentFormat::Modern => CurrentContents::Modern(Rev::ZERO),
        CurrentFormat::Legacy => CurrentContents::Legacy(Rev::ZERO, LegacyCounters { next_node_id: 0, next_copy_id: 0 }),
    };
    bump_current(layout, &contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::ProtoRevLayout;
    use tempfile::tempdir;

    #[test]
    fn modern_current_roundtrip() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path(), ProtoRevLayout::OutOfTree, None);
        bump_current(&layout, &CurrentContents::Modern(Rev(3))).unwrap();
        assert_eq!(read_current(&layout).unwrap(), CurrentContents::Modern(Rev(3)));
    }

    #[test]
    fn legacy_current_roundtrip() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path(), ProtoRevLayout::OutOfTree, None);
        let contents = CurrentContents::Legacy(Rev(7), LegacyCounters { next_node_id: 12, next_copy_id: 4 });
        bump_current(&layout, &contents).unwrap();
        assert_eq!(read_current(&layout).unwrap(), contents);
    }
}
