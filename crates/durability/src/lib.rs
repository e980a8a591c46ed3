//! Representation durability: the svndiff-style delta codec, delta-base
//! selection, the representation writer and reader, the sha1 rep-sharing
//! index, path-lock verification, and the mechanics of publishing a
//! transaction's proto-rev file as a committed revision (spec.md §4.2-§4.4,
//! §4.7, §4.8).

pub mod commit;
pub mod delta_base;
pub mod lock_check;
pub mod rep_cache;
pub mod rep_reader;
pub mod rep_writer;
pub mod svndiff;

pub use commit::{fsync_proto_rev, insert_rep_cache_batch, publish_revision, publish_revprops};
pub use delta_base::{choose_delta_base, PredecessorSource};
pub use lock_check::check_locks;
pub use rep_cache::{find_shared_rep, write_sidecar, InMemoryRepCache, RepCache};
pub use rep_reader::reconstruct;
pub use rep_writer::{DeltaBase, RepWriteOutcome, RepresentationWriter};
