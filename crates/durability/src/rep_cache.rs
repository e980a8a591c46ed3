//! The sha1 → rep rep-sharing index (spec.md §4.4): a sqlite-backed
//! `rep_cache.db`, a per-commit in-memory overlay, and intra-txn sha1
//! sidecar files for reps that haven't reached the cache yet.

use fsfs_core::node::RepOrigin;
use fsfs_core::{Error, Rep, Result, Rev, TxnId};
use fsfs_storage::Layout;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::fs;
use tracing::warn;

/// Opens (creating if absent) the sqlite rep-cache and ensures its schema
/// exists.
pub struct RepCache {
    conn: Connection,
}

impl RepCache {
    pub fn open(layout: &Layout) -> Result<Self> {
        let conn = Connection::open(layout.rep_cache_db()).map_err(sqlite_err)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS rep_cache (
                hash TEXT PRIMARY KEY,
                revision INTEGER NOT NULL,
                offset INTEGER NOT NULL,
                size INTEGER NOT NULL,
                expanded_size INTEGER NOT NULL
            );",
        )
        .map_err(sqlite_err)?;
        Ok(RepCache { conn })
    }

    /// Looks up `sha1_hex`, verifying against `youngest` per spec.md §4.4 and
    /// §9: a row pointing past `youngest` is treated as hard corruption, not
    /// a soft miss, since it can only arise from reading a stale cache after
    /// a commit that failed partway through. On a hit, also verifies the rep
    /// still exists by offset/length in `revision`'s revision file
    /// (spec.md §4.4 step 3); a mismatch is likewise hard corruption rather
    /// than a soft miss, since it means the cache and the revision file have
    /// diverged.
    pub fn lookup(&self, layout: &Layout, sha1_hex: &str, youngest: Rev) -> Result<Option<Rep>> {
        let row: Option<(u64, u64, u64, u64)> = self
            .conn
            .query_row(
                "SELECT revision, offset, size, expanded_size FROM rep_cache WHERE hash = ?1",
                params![sha1_hex],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()
            .map_err(sqlite_err)?;

        let Some((revision, offset, size, expanded_size)) = row else {
            return Ok(None);
        };

        if revision > youngest.0 {
            return Err(Error::corrupt(format!(
                "rep-cache entry for {sha1_hex} points at r{revision}, past youngest r{}",
                youngest.0
            )));
        }

        let rev_file = layout.rev_file(Rev(revision));
        let len = fs::metadata(&rev_file)
            .map_err(|e| Error::corrupt(format!("rep-cache entry for {sha1_hex} points at r{revision}, but its revision file is unreadable: {e}")))?
            .len();
        if offset.checked_add(size).map(|end| end > len).unwrap_or(true) {
            return Err(Error::corrupt(format!(
                "rep-cache entry for {sha1_hex} points at r{revision} offset {offset} size {size}, past the end of a {len}-byte revision file"
            )));
        }

        Ok(Some(Rep {
            revision: Rev(revision),
            offset,
            size,
            expanded_size,
            md5: [0; 16],
            sha1: None,
            origin: RepOrigin::Committed,
            uniquifier: None,
        }))
    }

    /// Inserts newly observed `(sha1 → rep)` rows under a single
    /// transaction, ignoring collisions (spec.md §4.7 step 16).
    pub fn insert_batch(&mut self, rows: &[(String, Rep)]) -> Result<()> {
        let tx = self.conn.transaction().map_err(sqlite_err)?;
        for (hash, rep) in rows {
            tx.execute(
                "INSERT OR IGNORE INTO rep_cache (hash, revision, offset, size, expanded_size)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![hash, rep.revision.0, rep.offset, rep.size, rep.expanded_size],
            )
            .map_err(sqlite_err)?;
        }
        tx.commit().map_err(sqlite_err)
    }
}

fn sqlite_err(e: rusqlite::Error) -> Error {
    Error::Io(std::io::Error::other(e))
}

/// The per-commit in-memory hash consulted before the sqlite query
/// (spec.md §4.4 step 2) — avoids a database round trip for reps shared
/// within the same commit.
#[derive(Debug, Default)]
pub struct InMemoryRepCache {
    entries: HashMap<String, Rep>,
}

impl InMemoryRepCache {
    pub fn new() -> Self {
        InMemoryRepCache::default()
    }

    pub fn get(&self, sha1_hex: &str) -> Option<&Rep> {
        self.entries.get(sha1_hex)
    }

    pub fn insert(&mut self, sha1_hex: String, rep: Rep) {
        self.entries.insert(sha1_hex, rep);
    }
}

/// Finds a match for `sha1_hex`, per the lookup order of spec.md §4.4:
/// per-commit memory, then sqlite (non-fatal errors become a warning and a
/// miss), then the intra-txn sidecar file.
pub fn find_shared_rep(
    layout: &Layout,
    cache: Option<&RepCache>,
    in_memory: Option<&InMemoryRepCache>,
    txn_id: &TxnId,
    sha1_hex: &str,
    youngest: Rev,
    rep_sharing_enabled: bool,
) -> Result<Option<Rep>> {
    if !rep_sharing_enabled {
        return Ok(None);
    }

    if let Some(mem) = in_memory {
        if let Some(rep) = mem.get(sha1_hex) {
            return Ok(Some(rep.clone()));
        }
    }

    if let Some(cache) = cache {
        match cache.lookup(layout, sha1_hex, youngest) {
            Ok(Some(rep)) => return Ok(Some(rep)),
            Ok(None) => {}
            Err(e @ Error::Corrupt(_)) => return Err(e),
            Err(e) => {
                warn!(error = %e, sha1 = sha1_hex, "rep-cache lookup failed, treating as a miss");
            }
        }
    }

    let sidecar_path = layout.txn_sha1_sidecar_file(txn_id, sha1_hex);
    match fs::read_to_string(&sidecar_path) {
        Ok(text) => Ok(Some(parse_sidecar(&text)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Writes the intra-txn sha1 sidecar file so later reps in the same
/// transaction can find this one before it reaches the rep-cache
/// (spec.md §4.4 step 4, §3).
pub fn write_sidecar(layout: &Layout, txn_id: &TxnId, sha1_hex: &str, rep: &Rep) -> Result<()> {
    let path = layout.txn_sha1_sidecar_file(txn_id, sha1_hex);
    let txn_marker = rep.txn_id().map(str::to_string).unwrap_or_default();
    let body = format!("{} {} {} {} {}\n", rep.revision.0, rep.offset, rep.size, rep.expanded_size, txn_marker);
    fs::write(path, body)?;
    Ok(())
}

fn parse_sidecar(text: &str) -> Result<Rep> {
    let mut parts = text.trim_end().split_ascii_whitespace();
    let revision = parts.next().and_then(|s| s.parse().ok()).ok_or_else(|| Error::corrupt("bad sidecar"))?;
    let offset = parts.next().and_then(|s| s.parse().ok()).ok_or_else(|| Error::corrupt("bad sidecar"))?;
    let size = parts.next().and_then(|s| s.parse().ok()).ok_or_else(|| Error::corrupt("bad sidecar"))?;
    let expanded_size = parts.next().and_then(|s| s.parse().ok()).ok_or_else(|| Error::corrupt("bad sidecar"))?;
    Ok(Rep {
        revision: Rev(revision),
        offset,
        size,
        expanded_size,
        md5: [0; 16],
        sha1: None,
        origin: RepOrigin::Committed,
        uniquifier: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsfs_storage::ProtoRevLayout;
    use tempfile::tempdir;

    fn rep(revision: u64, offset: u64) -> Rep {
        Rep {
            revision: Rev(revision),
            offset,
            size: 10,
            expanded_size: 20,
            md5: [0; 16],
            sha1: None,
            origin: RepOrigin::Committed,
            uniquifier: None,
        }
    }

    /// Creates `revs/<rev>` with `len` zero bytes so a lookup's bounds check
    /// against the real revision file has something to check against.
    fn write_rev_file(layout: &Layout, rev: u64, len: u64) {
        let path = layout.rev_file(Rev(rev));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, vec![0u8; len as usize]).unwrap();
    }

    #[test]
    fn insert_then_lookup_roundtrips() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path(), ProtoRevLayout::OutOfTree, None);
        write_rev_file(&layout, 1, 100);
        let mut cache = RepCache::open(&layout).unwrap();
        cache.insert_batch(&[("deadbeef".to_string(), rep(1, 50))]).unwrap();
        let found = cache.lookup(&layout, "deadbeef", Rev(5)).unwrap().unwrap();
        assert_eq!(found.revision, Rev(1));
        assert_eq!(found.offset, 50);
    }

    #[test]
    fn lookup_past_youngest_is_corruption() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path(), ProtoRevLayout::OutOfTree, None);
        let mut cache = RepCache::open(&layout).unwrap();
        cache.insert_batch(&[("deadbeef".to_string(), rep(9, 50))]).unwrap();
        assert!(matches!(cache.lookup(&layout, "deadbeef", Rev(5)), Err(Error::Corrupt(_))));
    }

    #[test]
    fn lookup_past_end_of_revision_file_is_corruption() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path(), ProtoRevLayout::OutOfTree, None);
        write_rev_file(&layout, 1, 40);
        let mut cache = RepCache::open(&layout).unwrap();
        cache.insert_batch(&[("deadbeef".to_string(), rep(1, 50))]).unwrap();
        assert!(matches!(cache.lookup(&layout, "deadbeef", Rev(5)), Err(Error::Corrupt(_))));
    }

    #[test]
    fn duplicate_insert_is_ignored_not_fatal() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path(), ProtoRevLayout::OutOfTree, None);
        write_rev_file(&layout, 1, 100);
        let mut cache = RepCache::open(&layout).unwrap();
        cache.insert_batch(&[("deadbeef".to_string(), rep(1, 50))]).unwrap();
        cache.insert_batch(&[("deadbeef".to_string(), rep(1, 999))]).unwrap();
        let found = cache.lookup(&layout, "deadbeef", Rev(5)).unwrap().unwrap();
        assert_eq!(found.offset, 50, "first insert wins, collision ignored");
    }
}
