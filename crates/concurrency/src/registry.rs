//! Per-process registry of active transactions (spec.md §4.1, §9).
//!
//! The original design pairs a process-wide mutex-guarded hash table with a
//! single-slot freelist to avoid allocator churn on the common
//! one-commit-after-another path. Per spec.md §9's design notes, this is
//! replaced here with a concurrent map whose `being_written` flag is an
//! atomic bool — the freelist bought nothing a modern allocator doesn't
//! already provide, so it is dropped rather than ported.

use dashmap::DashMap;
use fsfs_core::error::RepBeingWrittenKind;
use fsfs_core::{Error, Result, TxnId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct TxnRecord {
    being_written: AtomicBool,
}

/// Table of transactions this process currently knows about, keyed by
/// [`TxnId`]. Safe to share across threads via `Arc`.
#[derive(Debug, Default)]
pub struct TxnRegistry {
    table: DashMap<TxnId, Arc<TxnRecord>>,
}

/// Held while a caller owns the in-process right to write a transaction's
/// proto-rev. Dropping it clears `being_written` unconditionally, so a
/// panicking writer never wedges the registry.
pub struct WriteTicket {
    record: Arc<TxnRecord>,
}

impl Drop for WriteTicket {
    fn drop(&mut self) {
        self.record.being_written.store(false, Ordering::Release);
    }
}

impl TxnRegistry {
    pub fn new() -> Self {
        TxnRegistry::default()
    }

    /// Looks up or creates the record for `txn_id` and, if no other in-process
    /// caller is currently writing it, marks it written and returns a ticket.
    /// Fails fast with [`Error::RepBeingWritten`] on local contention, per
    /// spec.md §4.1 step 1.
    pub fn try_begin_write(&self, txn_id: &TxnId) -> Result<WriteTicket> {
        let record = self
            .table
            .entry(txn_id.clone())
            .or_insert_with(|| Arc::new(TxnRecord::default()))
            .clone();
        if record
            .being_written
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::RepBeingWritten(RepBeingWrittenKind::InProcess));
        }
        Ok(WriteTicket { record })
    }

    /// Removes the in-memory record for `txn_id`, if any (spec.md §4.6 Abort).
    pub fn purge(&self, txn_id: &TxnId) {
        self.table.remove(txn_id);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsfs_core::Rev;

    #[test]
    fn second_writer_fails_fast_until_first_releases() {
        let registry = TxnRegistry::new();
        let txn = TxnId::new(Rev(0), 1);
        let first = registry.try_begin_write(&txn).unwrap();
        assert!(matches!(registry.try_begin_write(&txn), Err(Error::RepBeingWritten(_))));
        drop(first);
        assert!(registry.try_begin_write(&txn).is_ok());
    }

    #[test]
    fn purge_forgets_the_transaction() {
        let registry = TxnRegistry::new();
        let txn = TxnId::new(Rev(0), 1);
        let _ticket = registry.try_begin_write(&txn).unwrap();
        assert_eq!(registry.len(), 1);
        drop(_ticket);
        registry.purge(&txn);
        assert!(registry.is_empty());
    }
}
