//! In-process transaction registry and the three cross-process advisory
//! locks that serialize access to shared repository state: the per-txn
//! proto-rev lock, the repository-wide commit write lock, and the
//! `txn-current` sequence-counter lock (spec.md §4.1, §4.6, §4.7, §5).

pub mod proto_rev_lock;
pub mod registry;
pub mod repo_lock;
pub mod txn_current;

pub use proto_rev_lock::{get_writable_proto_rev, unlock_proto_rev, ProtoRevLockCookie};
pub use registry::{TxnRegistry, WriteTicket};
pub use repo_lock::RepoWriteLock;
pub use txn_current::next_txn_seq;
