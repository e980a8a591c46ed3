//! On-disk path layout and file formats for the FSFS commit core: the
//! canonical path computations (spec.md §6), the revision-file text framing,
//! the changed-paths journal and its fold operation, the `current` pointer,
//! and revision/transaction property hashes.

pub mod changes_journal;
pub mod current;
pub mod layout;
pub mod props;
pub mod revision_file;

pub use changes_journal::{fold, read_all, write_folded, ChangesJournalWriter};
pub use current::{bump_current, read_current, CurrentContents, CurrentFormat, LegacyCounters};
pub use layout::{maybe_create_shard, Layout, ProtoRevLayout};
pub use props::PropHash;
pub use revision_file::{RepHeader, RevisionTrailer, ENDREP_TRAILER};
