//! Streaming representation writer (spec.md §4.2).
//!
//! Layers a digest tee and the [`svndiff`] encoder over the proto-rev file's
//! append point. A [`CleanupGuard`] truncates the proto-rev file back to its
//! pre-write offset on any early return, including a panic unwind, so a
//! failed write leaves the proto-rev byte-identical to before it started.

use crate::rep_cache::{find_shared_rep, write_sidecar, InMemoryRepCache, RepCache};
use crate::svndiff;
use fsfs_core::node::RepOrigin;
use fsfs_core::{Rep, Result, Rev, TxnId};
use fsfs_storage::{Layout, RepHeader, ENDREP_TRAILER};
use md5::{Digest as Md5Digest, Md5};
use sha1::{Digest as Sha1Digest, Sha1};
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use tracing::trace;

struct CleanupGuard<'a> {
    file: &'a mut File,
    provisional_offset: u64,
    armed: bool,
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.file.set_len(self.provisional_offset);
            let _ = self.file.seek(SeekFrom::Start(self.provisional_offset));
        }
    }
}

/// The chosen delta base, with its expanded content already reconstructed
/// (callers typically get both from [`crate::delta_base::choose_delta_base`]
/// plus [`crate::rep_reader::reconstruct`]).
pub struct DeltaBase {
    pub rep: Rep,
    pub expanded_content: Vec<u8>,
}

/// A rep-in-progress: bytes written so far, tee'd into running digests.
pub struct RepresentationWriter {
    proto_rev: File,
    txn_id: TxnId,
    provisional_offset: u64,
    delta_start: u64,
    base: Option<DeltaBase>,
    md5: Md5,
    sha1: Sha1,
    buffer: Vec<u8>,
    uniquifier: Option<String>,
}

/// The outcome of closing a representation writer.
pub struct RepWriteOutcome {
    pub rep: Rep,
    /// True if an existing rep was reused via rep-sharing and the
    /// newly-written bytes were truncated back off the proto-rev file.
    pub shared: bool,
    /// Handed back so the caller can begin another [`RepresentationWriter`]
    /// at the new end-of-file without reopening the proto-rev.
    pub proto_rev: File,
}

impl RepresentationWriter {
    /// Begins a rep at the proto-rev file's current end, writing the rep
    /// header immediately (spec.md §4.2 steps 1-4).
    pub fn begin(mut proto_rev: File, txn_id: TxnId, base: Option<DeltaBase>, uniquifier: Option<String>) -> Result<Self> {
        let provisional_offset = proto_rev.stream_position()?;
        let mut guard = CleanupGuard { file: &mut proto_rev, provisional_offset, armed: true };

        let header = match &base {
            Some(b) => RepHeader::Delta {
                base_rev: b.rep.revision,
                base_offset: b.rep.offset,
                base_len: b.rep.size,
            },
            None => RepHeader::SelfDelta,
        };
        header.write(guard.file)?;
        let delta_start = guard.file.stream_position()?;
        guard.armed = false;
        drop(guard);

        Ok(RepresentationWriter {
            proto_rev,
            txn_id,
            provisional_offset,
            delta_start,
            base,
            md5: Md5::new(),
            sha1: Sha1::new(),
            buffer: Vec::new(),
            uniquifier,
        })
    }

    /// Tees `buf` into the running MD5 and SHA1 digests and buffers it for
    /// the eventual diff encode (spec.md §4.2 step 5).
    pub fn write(&mut self, buf: &[u8]) {
        self.md5.update(buf);
        self.sha1.update(buf);
        self.buffer.extend_from_slice(buf);
    }

    /// Flushes the encoder, finalizes digests, and attempts rep-sharing
    /// (spec.md §4.2 steps 6-8). On success, returns the rep to attach to
    /// the owning `NodeRev`.
    #[allow(clippy::too_many_arguments)]
    pub fn close(
        mut self,
        layout: &Layout,
        cache: Option<&RepCache>,
        in_memory: Option<&mut InMemoryRepCache>,
        youngest: Rev,
        rep_sharing_enabled: bool,
    ) -> Result<RepWriteOutcome> {
        let mut guard = CleanupGuard {
            file: &mut self.proto_rev,
            provisional_offset: self.provisional_offset,
            armed: true,
        };

        let payload = match &self.base {
            Some(b) => svndiff::encode_delta(&b.expanded_content, &self.buffer),
            None => svndiff::encode_self_delta(&self.buffer),
        };
        svndiff::write_payload(guard.file, &payload)?;
        let end_offset = guard.file.stream_position()?;
        let size = end_offset - self.delta_start;
        let expanded_size = self.buffer.len() as u64;

        let md5_digest: [u8; 16] = self.md5.finalize().into();
        let sha1_digest: [u8; 20] = self.sha1.finalize().into();
        let sha1_hex = hex_encode(&sha1_digest);

        let shared = find_shared_rep(
            layout,
            cache,
            in_memory.as_deref(),
            &self.txn_id,
            &sha1_hex,
            youngest,
            rep_sharing_enabled,
        )?;

        let (rep, shared) = match shared {
            Some(mut rep) => {
                trace!(sha1 = sha1_hex, txn = %self.txn_id, "rep-sharing hit, truncating proto-rev");
                rep.md5 = md5_digest;
                rep.uniquifier = self.uniquifier.clone();
                guard.file.set_len(self.provisional_offset)?;
                guard.file.seek(SeekFrom::Start(self.provisional_offset))?;
                guard.armed = false;
                (rep, true)
            }
            None => {
                guard.file.write_all(ENDREP_TRAILER)?;
                let rep = Rep {
                    revision: Rev(0),
                    offset: self.provisional_offset,
                    size,
                    expanded_size,
                    md5: md5_digest,
                    sha1: Some(sha1_digest),
                    origin: RepOrigin::Mutable { txn_id: self.txn_id.as_str().to_string() },
                    uniquifier: self.uniquifier.clone(),
                };
                if rep_sharing_enabled {
                    write_sidecar(layout, &self.txn_id, &sha1_hex, &rep)?;
                }
                if let Some(mem) = in_memory {
                    mem.insert(sha1_hex, rep.clone());
                }
                guard.armed = false;
                (rep, false)
            }
        };
        drop(guard);
        Ok(RepWriteOutcome { rep, shared, proto_rev: self.proto_rev })
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsfs_concurrency::get_writable_proto_rev;
    use fsfs_concurrency::TxnRegistry;
    use fsfs_storage::ProtoRevLayout;
    use tempfile::tempdir;

    #[test]
    fn round_trip_through_proto_rev_file() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path(), ProtoRevLayout::OutOfTree, None);
        let registry = TxnRegistry::new();
        let txn_id = TxnId::new(Rev(0), 1);
        let (file, _cookie) = get_writable_proto_rev(&registry, &layout, &txn_id).unwrap();

        let mut writer = RepresentationWriter::begin(file, txn_id.clone(), None, None).unwrap();
        writer.write(b"hello\n");
        let cache = RepCache::open(&layout).unwrap();
        let outcome = writer.close(&layout, Some(&cache), None, Rev(0), true).unwrap();
        assert!(!outcome.shared);
        assert_eq!(outcome.rep.expanded_size, 6);

        let content = crate::rep_reader::reconstruct(&layout, &{
            let mut committed = outcome.rep.clone();
            committed.origin = RepOrigin::Mutable { txn_id: txn_id.as_str().to_string() };
            committed
        })
        .unwrap();
        assert_eq!(content, b"hello\n");
    }

    #[test]
    fn failed_lookup_does_not_corrupt_proto_rev_on_cleanup() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path(), ProtoRevLayout::OutOfTree, None);
        let registry = TxnRegistry::new();
        let txn_id = TxnId::new(Rev(0), 1);
        let (file, _cookie) = get_writable_proto_rev(&registry, &layout, &txn_id).unwrap();
        let start_len = file.metadata().unwrap().len();

        let mut writer = RepresentationWriter::begin(file, txn_id, None, None).unwrap();
        writer.write(b"some bytes");
        drop(writer);

        let final_len = std::fs::metadata(layout.proto_rev_file(&TxnId::new(Rev(0), 1))).unwrap().len();
        assert_eq!(final_len, start_len, "dropping a writer without close() must not grow the proto-rev file");
    }
}
