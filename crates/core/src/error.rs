//! Error taxonomy for the FSFS commit core.
//!
//! Every error surfaced across crate boundaries is a variant of [`Error`].
//! The boundary error codes named by the spec (`TxnOutOfDate`,
//! `RepBeingWritten`, `Corrupt`, `NoSuchTransaction`, `UniqueNamesExhausted`,
//! `BadDate`, `LockFailed`) map one-to-one onto variants here; everything else
//! is wrapped I/O or a validation failure.

use std::io;
use thiserror::Error;

/// Result alias used throughout the commit core.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the FSFS commit core.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying I/O failure (open/read/write/seek/lock/rename/fsync).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The transaction's base revision is no longer the youngest revision.
    #[error("transaction is based on r{base_rev} but youngest is r{youngest}")]
    TxnOutOfDate { base_rev: u64, youngest: u64 },

    /// The proto-rev is already being written, either in this process or
    /// another one sharing the repository.
    #[error("representation is already being written: {0}")]
    RepBeingWritten(#[from] RepBeingWrittenKind),

    /// On-disk state violates an invariant the commit core relies on.
    #[error("corrupt repository state: {0}")]
    Corrupt(String),

    /// No such transaction exists in the registry or on disk.
    #[error("no such transaction: {0}")]
    NoSuchTransaction(String),

    /// The base-36 transaction sequence counter has wrapped.
    #[error("unique transaction names exhausted for base revision {0}")]
    UniqueNamesExhausted(u64),

    /// A stored or supplied timestamp could not be parsed.
    #[error("invalid date: {0}")]
    BadDate(String),

    /// A cross-process or in-process advisory lock could not be acquired or
    /// released.
    #[error("lock failed: {0}")]
    LockFailed(String),

    /// A changed-paths journal entry violated the fold ordering rules of
    /// spec.md §4.5.
    #[error("invalid change ordering: {0}")]
    InvalidChangeOrdering(String),

    /// The caller does not own the locks required to touch the given paths.
    #[error("path is locked by another user: {0}")]
    PathLocked(String),

    /// A long-running operation observed its cancellation token set.
    #[error("operation cancelled")]
    Cancelled,
}

/// Distinguishes why a proto-rev write could not begin, per spec.md §4.1.
#[derive(Debug, Error)]
pub enum RepBeingWrittenKind {
    /// Another writer in this process already holds the `being_written` flag.
    #[error("already being written in this process")]
    InProcess,
    /// Another process holds the advisory file lock on `rev-lock`.
    #[error("already being written in another process")]
    InOtherProcess,
}

impl Error {
    /// True for errors a caller may retry (contention, not corruption).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RepBeingWritten(_))
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Error::Corrupt(msg.into())
    }
}
